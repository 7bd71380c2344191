use serde::{Deserialize, Serialize};
use std::path::Path;

use super::config::{Config, RunRange};
use super::dns_file::DnsFile;
use super::error::SelectionError;
use super::file_processing::{file_number, filter_filenames, list_datafiles};

/// Wavelengths (Å) further apart than this are reported as inconsistent
const WAVELENGTH_TOLERANCE: f64 = 0.1;

/// The metadata of a datafile needed to build a reduction script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedFile {
    pub file_number: u64,
    pub det_rot: f64,
    pub sample_name: String,
    pub filename: String,
    pub wavelength: f64,
    pub channelwidth: f64,
    pub tofchannels: usize,
}

impl TryFrom<&DnsFile> for SelectedFile {
    type Error = SelectionError;

    fn try_from(file: &DnsFile) -> Result<Self, Self::Error> {
        let number = match file.filenumber.trim().parse::<u64>() {
            Ok(number) => number,
            Err(_) => file_number(&file.filename)
                .ok_or_else(|| SelectionError::BadFileNumber(file.filename.clone()))?,
        };
        Ok(Self {
            file_number: number,
            det_rot: file.det_rot,
            sample_name: file.sample.clone(),
            filename: file.filename.clone(),
            wavelength: file.wavelength,
            channelwidth: file.channelwidth,
            tofchannels: file.tofchannels,
        })
    }
}

/// The sample and standard files chosen for a reduction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileSelection {
    pub full_data: Vec<SelectedFile>,
    pub standard_data: Vec<SelectedFile>,
}

impl FileSelection {
    /// Select the sample run range from the data directory and the standard files from the
    /// standards directory
    pub fn from_config(config: &Config) -> Result<Self, SelectionError> {
        let full_data = select_files(&config.paths.data_dir, Some(&config.sample_runs))?;
        if full_data.is_empty() {
            return Err(SelectionError::NoMatchingFiles(
                config.sample_runs.first,
                config.sample_runs.last,
                config.paths.data_dir.clone(),
            ));
        }
        let standard_data = if config.options.corrections {
            select_files(&config.paths.standards_dir, config.standard_runs.as_ref())?
        } else {
            Vec::new()
        };
        log::info!(
            "Selected {} sample and {} standard files.",
            full_data.len(),
            standard_data.len()
        );
        Ok(Self {
            full_data,
            standard_data,
        })
    }

    /// Warnings about TOF settings differing between the selected sample files
    pub fn tof_consistency_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let mut channelwidths: Vec<f64> = self.full_data.iter().map(|f| f.channelwidth).collect();
        channelwidths.sort_by(|a, b| a.total_cmp(b));
        channelwidths.dedup();
        if channelwidths.len() > 1 {
            warnings.push(format!(
                "Warning different channelwidths {channelwidths:?} in selected datafiles."
            ));
        }
        let mut tofchannels: Vec<usize> = self.full_data.iter().map(|f| f.tofchannels).collect();
        tofchannels.sort();
        tofchannels.dedup();
        if tofchannels.len() > 1 {
            warnings.push(format!(
                "Warning different number of tof channels {tofchannels:?} in selected datafiles."
            ));
        }
        warnings
    }

    /// Mean wavelength (Å) of the selected sample files, None without sample files.
    ///
    /// Logs a warning if the wavelengths differ.
    pub fn determine_wavelength(&self) -> Option<f64> {
        if self.full_data.is_empty() {
            return None;
        }
        let wavelengths: Vec<f64> = self.full_data.iter().map(|f| f.wavelength).collect();
        let min = wavelengths.iter().copied().fold(f64::INFINITY, f64::min);
        let max = wavelengths.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if max - min > WAVELENGTH_TOLERANCE {
            log::warn!("Selected datafiles have different wavelengths ({min} to {max} Å).");
        }
        Some(wavelengths.iter().sum::<f64>() / wavelengths.len() as f64)
    }
}

/// Read every datafile of a directory inside the run range (all of them without a range).
///
/// Files which are not DNS datafiles are skipped with a warning.
fn select_files(dir: &Path, runs: Option<&RunRange>) -> Result<Vec<SelectedFile>, SelectionError> {
    let mut names = list_datafiles(dir)?;
    if let Some(runs) = runs {
        names = filter_filenames(&names, runs.first, runs.last);
    }
    let mut total_size: u64 = 0;
    let mut selected = Vec::new();
    for name in names {
        total_size += dir.join(&name).metadata()?.len();
        match DnsFile::read(dir, &name)? {
            Some(file) => selected.push(SelectedFile::try_from(&file)?),
            None => log::warn!("Skipping {name}, it is not a DNS datafile."),
        }
    }
    log::info!(
        "Read {} datafiles from {} with total size {}.",
        selected.len(),
        dir.display(),
        human_bytes::human_bytes(total_size as f64)
    );
    Ok(selected)
}
