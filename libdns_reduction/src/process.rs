use std::path::PathBuf;
use std::sync::mpsc::Sender;

use super::binning_estimate::estimate_binning;
use super::config::Config;
use super::error::{ConfigError, ProcessorError};
use super::file_processing::{get_filename, save_script};
use super::file_selection::FileSelection;
use super::run_status::{ScriptStatus, Stage, StatusReporter};
use super::script::Script;
use super::script_generator::{TofPowderScriptGenerator, ValidationWarning};
use super::script_runner::{CancelToken, ScriptRunner};
use super::toolkit::{DryRunToolkit, Toolkit};

/// A generated script and where it was saved
#[derive(Debug, Clone)]
pub struct GeneratedScript {
    pub script: Script,
    pub path: PathBuf,
    /// Advisory problem found while generating, if any
    pub warning: Option<ValidationWarning>,
}

/// Select the files, generate the reduction script and save it to the script directory
pub fn generate_script(config: &Config) -> Result<GeneratedScript, ProcessorError> {
    if !config.is_run_range_valid() {
        let bad = [Some(config.sample_runs), config.standard_runs]
            .into_iter()
            .flatten()
            .find(|runs| runs.first > runs.last)
            .unwrap_or(config.sample_runs);
        return Err(ConfigError::BadRunRange(bad.first, bad.last).into());
    }
    let selection = FileSelection::from_config(config)?;
    for warning in selection.tof_consistency_warnings() {
        log::warn!("{warning}");
    }

    let mut options = config.options.clone();
    if options.get_wavelength {
        if let Some(wavelength) = selection.determine_wavelength() {
            log::info!("Wavelength taken from datafiles: {wavelength:.3} Å");
            options.wavelength = wavelength;
        }
    }
    if options.qstep == 0.0 || options.de_step == 0.0 {
        let wavelength = if options.wavelength > 0.0 {
            Some(options.wavelength)
        } else {
            selection.determine_wavelength()
        };
        match wavelength.and_then(|wavelength| estimate_binning(&selection.full_data, wavelength)) {
            Some(binning) => {
                options.qmin = binning.qmin;
                options.qmax = binning.qmax;
                options.qstep = binning.qstep;
                options.de_min = binning.de_min;
                options.de_max = binning.de_max;
                options.de_step = binning.de_step;
                log::info!(
                    "q-range and binning automatically estimated: q {:.3} to {:.3} step {:.3} Å⁻¹, dE {:.3} to {:.3} step {:.3} meV",
                    binning.qmin,
                    binning.qmax,
                    binning.qstep,
                    binning.de_min,
                    binning.de_max,
                    binning.de_step
                );
            }
            None => log::warn!("Could not estimate q-range and binning from the selected datafiles."),
        }
    }

    let generator = TofPowderScriptGenerator::new(&options, &config.paths, &selection);
    let warning = generator.validate().err();
    if let Some(warning) = warning {
        log::warn!("{warning}");
    }
    let script = generator.script();
    log::info!("Generated reduction script with {} lines.", script.len());

    let path = save_script(
        &script.to_text(),
        &get_filename(&config.script_name),
        &config.paths.script_dir,
    )?;
    log::info!("Saved reduction script to {}", path.display());
    Ok(GeneratedScript {
        script,
        path,
        warning,
    })
}

/// Execute a generated script, reporting progress over `tx`.
///
/// Returns the status message of the run, empty on success.
pub fn run_generated(
    generated: &GeneratedScript,
    toolkit: &mut dyn Toolkit,
    tx: &Sender<ScriptStatus>,
    cancel: CancelToken,
) -> Result<String, ProcessorError> {
    let total_steps = generated.script.len();
    tx.send(ScriptStatus::new(0, total_steps, Stage::Running))?;
    let mut runner = ScriptRunner::with_cancel_token(cancel);
    let mut reporter = StatusReporter::new(tx.clone(), total_steps);
    let status = runner.run_script(&generated.script, toolkit, &mut reporter);
    if status.is_empty() {
        log::info!("Script finished.");
    } else {
        log::warn!("{status}");
    }
    tx.send(ScriptStatus::new(total_steps, total_steps, Stage::Done))?;
    Ok(status)
}

/// The function to be called by a separate thread (typically the UI).
///
/// Generates and saves the script and, if `execute` is set, runs it against the dry-run
/// toolkit.
pub fn process(
    config: Config,
    execute: bool,
    tx: Sender<ScriptStatus>,
    cancel: CancelToken,
) -> Result<String, ProcessorError> {
    tx.send(ScriptStatus::default())?;
    let generated = generate_script(&config)?;
    if !execute {
        tx.send(ScriptStatus::new(0, 0, Stage::Done))?;
        return Ok(String::new());
    }
    let mut toolkit = DryRunToolkit::new();
    run_generated(&generated, &mut toolkit, &tx, cancel)
}
