//! The composite helpers a reduction script calls, expanded into toolkit operations.

use std::path::PathBuf;

use super::constants::{DATAFILE_EXTENSION, SAMPLE_LOGS_SUM, SAMPLE_LOGS_TIME_SERIES};
use super::dataset::{Bank, DatatypeEntry};
use super::error::ToolkitError;
use super::script::{py_float, Binning, Parameters};
use super::toolkit::Toolkit;

/// Path of the datafile with a given number under a path prefix
pub fn datafile_path(path: &str, file_number: u64) -> PathBuf {
    PathBuf::from(format!("{path}_{file_number:06}{DATAFILE_EXTENSION}"))
}

/// Load and merge the files of one bank into `output`
pub fn pre_load_data(
    toolkit: &mut dyn Toolkit,
    bank: &Bank,
    path: &str,
    output: &str,
    params: &Parameters,
) -> Result<(), ToolkitError> {
    let wavelength = (params.wavelength > 0.0).then_some(params.wavelength);
    let mut raw = Vec::with_capacity(bank.files.len());
    for number in bank.files.numbers() {
        let name = format!("ws_{number:06}");
        toolkit.load_dns_legacy(&datafile_path(path, number), params.e_channel, wavelength, &name)?;
        raw.push(name);
    }
    toolkit.merge_runs(&raw, SAMPLE_LOGS_SUM, SAMPLE_LOGS_TIME_SERIES, output)?;
    if params.delete_raw {
        toolkit.delete_workspaces(&raw)?;
    }
    Ok(())
}

/// Load every bank of a datatype, in ascending detector rotation, into the group `prefix`
/// with members `<prefix>_1`, `<prefix>_2`, ...
pub fn load_data(
    toolkit: &mut dyn Toolkit,
    entry: &DatatypeEntry,
    prefix: &str,
    params: &Parameters,
) -> Result<(), ToolkitError> {
    let mut names = Vec::with_capacity(entry.banks.len());
    for (idx, bank) in entry.sorted_banks().into_iter().enumerate() {
        let name = format!("{prefix}_{}", idx + 1);
        log::info!("Loading bank at {:.2} deg into {name}", bank.det_rot);
        pre_load_data(toolkit, bank, &entry.path, &name, params)?;
        names.push(name);
    }
    toolkit.group_workspaces(&names, prefix)
}

/// Convert to energy transfer: `<ws>_dE` as a distribution, then `<ws>_dE_S` with the
/// ki/kf correction applied
pub fn convert_to_d_e(
    toolkit: &mut dyn Toolkit,
    workspace: &str,
    efixed: f64,
) -> Result<(), ToolkitError> {
    let delta_e = format!("{workspace}_dE");
    toolkit.convert_to_delta_e(workspace, efixed, &delta_e)?;
    toolkit.convert_to_distribution(&delta_e)?;
    toolkit.correct_ki_kf(&delta_e, &format!("{workspace}_dE_S"))
}

/// `name,min,max,bins` with bin centres on the grid from `min` to `max`.
///
/// The step must be positive and the range must not be inverted.
pub fn dimension(name: &str, min: f64, max: f64, step: f64) -> Result<String, ToolkitError> {
    let bins = (max - min) / step;
    if !(step > 0.0 && max >= min && bins.is_finite()) {
        return Err(ToolkitError::InvalidBinning(name.to_string(), min, max, step));
    }
    Ok(format!(
        "{name},{},{},{}",
        py_float(min - step / 2.0),
        py_float(max + step / 2.0),
        bins.round() as u64 + 1
    ))
}

/// Merge all banks into S(q,ω), written to `<output>_sqw`
pub fn get_sqw(
    toolkit: &mut dyn Toolkit,
    input: &str,
    output: &str,
    binning: &Binning,
) -> Result<(), ToolkitError> {
    let q_dimension = dimension("|Q|", binning.qmin, binning.qmax, binning.qstep)?;
    let de_dimension = dimension("DeltaE", binning.de_min, binning.de_max, binning.de_step)?;
    let mut md = format!("g{output}_mde");
    toolkit.convert_to_md(input, &md)?;
    if toolkit.number_of_entries(input)? > 1 {
        let merged = format!("{output}_mde");
        toolkit.merge_md(&md, &merged)?;
        md = merged;
    }
    toolkit.bin_md(
        &md,
        &q_dimension,
        &de_dimension,
        &format!("{output}_sqw"),
    )
}
