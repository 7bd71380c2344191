use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::ConfigError;

/// Directories used by a reduction and the export switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathConfig {
    pub data_dir: PathBuf,
    pub standards_dir: PathBuf,
    pub export_dir: String,
    pub script_dir: PathBuf,
    pub ascii: bool,
    pub nexus: bool,
    pub export: bool,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("None"),
            standards_dir: PathBuf::from("None"),
            export_dir: String::from(""),
            script_dir: PathBuf::from("None"),
            ascii: false,
            nexus: false,
            export: false,
        }
    }
}

/// The options of a TOF powder reduction.
///
/// Names follow the keys of the generated script, including their historic spelling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReductionOptions {
    /// Incident wavelength in Å; 0 lets the toolkit take it from the datafiles
    pub wavelength: f64,
    /// Take the wavelength from the selected sample files
    pub get_wavelength: bool,
    /// Elastic peak channel; 0 lets the toolkit find it
    pub epp_channel: i64,
    pub delete_raw: bool,
    pub qmin: f64,
    pub qmax: f64,
    pub qstep: f64,
    #[serde(rename = "dEmin")]
    pub de_min: f64,
    #[serde(rename = "dEmax")]
    pub de_max: f64,
    /// Energy transfer step in meV; 0 (or a zero `qstep`) estimates the binning from the
    /// selected datafiles
    #[serde(rename = "dEstep")]
    pub de_step: f64,
    pub corrections: bool,
    pub det_efficency: bool,
    pub mask_bad_detectors: bool,
    pub substract_vana_back: bool,
    pub substract_sample_back: bool,
    pub vana_back_factor: f64,
    pub sample_back_factor: f64,
    pub vanadium_temperature: f64,
    pub norm_monitor: bool,
    pub correct_elastic_peak_position: bool,
}

impl Default for ReductionOptions {
    fn default() -> Self {
        Self {
            wavelength: 0.0,
            get_wavelength: true,
            epp_channel: 0,
            delete_raw: true,
            qmin: 0.0,
            qmax: 3.0,
            qstep: 0.025,
            de_min: -3.0,
            de_max: 3.0,
            de_step: 0.05,
            corrections: true,
            det_efficency: true,
            mask_bad_detectors: true,
            substract_vana_back: true,
            substract_sample_back: true,
            vana_back_factor: 1.0,
            sample_back_factor: 1.0,
            vanadium_temperature: 295.0,
            norm_monitor: true,
            correct_elastic_peak_position: false,
        }
    }
}

/// Inclusive range of file numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRange {
    pub first: u64,
    pub last: u64,
}

/// Structure representing the application configuration. Contains pathing, reduction
/// options and the selected runs.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub paths: PathConfig,
    pub options: ReductionOptions,
    pub sample_runs: RunRange,
    /// Standard files to use; None selects every file in the standards directory
    pub standard_runs: Option<RunRange>,
    pub script_name: String,
}

impl Default for Config {
    /// Generate a new Config object. Paths will be invalid
    fn default() -> Self {
        Self {
            paths: PathConfig::default(),
            options: ReductionOptions::default(),
            sample_runs: RunRange { first: 0, last: 0 },
            standard_runs: None,
            script_name: String::from(""),
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Write the configuration to a YAML file
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(config_path, yaml_str)?;
        Ok(())
    }

    pub fn is_run_range_valid(&self) -> bool {
        self.sample_runs.first <= self.sample_runs.last
            && self
                .standard_runs
                .map_or(true, |runs| runs.first <= runs.last)
    }

    /// Whether the generated script writes any output files
    pub fn exports_data(&self) -> bool {
        self.paths.export && !self.paths.export_dir.is_empty() && (self.paths.ascii || self.paths.nexus)
    }
}
