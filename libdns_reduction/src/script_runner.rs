use fxhash::FxHashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::dataset::TofDataset;
use super::dnstof;
use super::error::{RunnerError, StepError};
use super::run_status::ProgressSink;
use super::script::{Binning, Parameters, Script, Step, BINS, PARAMS};
use super::toolkit::Toolkit;

/// Shared flag to stop a running script after its current step
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A script variable
#[derive(Debug, Clone, PartialEq)]
enum Value {
    Dataset(TofDataset),
    Parameters(Parameters),
    Binning(Binning),
    Workspace(String),
    Detectors(Vec<usize>),
    Number(f64),
}

/// Executes a [`Script`] step by step against a [`Toolkit`].
///
/// Variables assigned by the script live in a namespace which is cleared at the start of
/// every run.
#[derive(Debug, Default)]
pub struct ScriptRunner {
    cancel: CancelToken,
    namespace: FxHashMap<String, Value>,
}

impl ScriptRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel_token(cancel: CancelToken) -> Self {
        Self {
            cancel,
            namespace: FxHashMap::default(),
        }
    }

    /// A handle which can stop this runner from another thread
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel_progress(&self) {
        self.cancel.cancel();
    }

    /// Run every step, reporting each finished step to `progress`.
    ///
    /// Stops at the first failing step, or after the current step once cancelled. Steps
    /// already executed are not rolled back.
    pub fn run(
        &mut self,
        script: &Script,
        toolkit: &mut dyn Toolkit,
        progress: &mut dyn ProgressSink,
    ) -> Result<(), RunnerError> {
        self.cancel.reset();
        self.namespace.clear();
        for (idx, step) in script.steps.iter().enumerate() {
            self.execute(step, toolkit)?;
            progress.update(idx);
            if self.cancel.is_cancelled() {
                log::warn!("Script execution cancelled after step {idx}.");
                return Err(RunnerError::Cancelled);
            }
        }
        Ok(())
    }

    /// Run a script and return its status message, empty on success
    pub fn run_script(
        &mut self,
        script: &Script,
        toolkit: &mut dyn Toolkit,
        progress: &mut dyn ProgressSink,
    ) -> String {
        match self.run(script, toolkit, progress) {
            Ok(()) => String::new(),
            Err(e) => e.to_string(),
        }
    }

    fn lookup(&self, name: &str) -> Result<&Value, StepError> {
        self.namespace
            .get(name)
            .ok_or_else(|| StepError::UndefinedVariable(name.to_string()))
    }

    fn workspace(&self, name: &str) -> Result<String, StepError> {
        match self.lookup(name)? {
            Value::Workspace(workspace) => Ok(workspace.clone()),
            _ => Err(StepError::WrongKind(name.to_string(), "workspace")),
        }
    }

    fn dataset(&self, name: &str) -> Result<&TofDataset, StepError> {
        match self.lookup(name)? {
            Value::Dataset(dataset) => Ok(dataset),
            _ => Err(StepError::WrongKind(name.to_string(), "dataset")),
        }
    }

    fn parameters(&self) -> Result<&Parameters, StepError> {
        match self.lookup(PARAMS)? {
            Value::Parameters(parameters) => Ok(parameters),
            _ => Err(StepError::WrongKind(PARAMS.to_string(), "parameter set")),
        }
    }

    fn binning(&self) -> Result<Binning, StepError> {
        match self.lookup(BINS)? {
            Value::Binning(binning) => Ok(*binning),
            _ => Err(StepError::WrongKind(BINS.to_string(), "binning")),
        }
    }

    fn detectors(&self, name: &str) -> Result<Vec<usize>, StepError> {
        match self.lookup(name)? {
            Value::Detectors(detectors) => Ok(detectors.clone()),
            _ => Err(StepError::WrongKind(name.to_string(), "detector list")),
        }
    }

    fn number(&self, name: &str) -> Result<f64, StepError> {
        match self.lookup(name)? {
            Value::Number(number) => Ok(*number),
            _ => Err(StepError::WrongKind(name.to_string(), "number")),
        }
    }

    /// An optional entry of the parameter set
    fn parameter(
        &self,
        key: &str,
        value: impl Fn(&Parameters) -> Option<f64>,
    ) -> Result<f64, StepError> {
        value(self.parameters()?)
            .ok_or_else(|| StepError::UndefinedVariable(format!("{PARAMS}['{key}']")))
    }

    fn bind_workspace(&mut self, name: &str, workspace: &str) {
        self.namespace
            .insert(name.to_string(), Value::Workspace(workspace.to_string()));
    }

    fn execute(&mut self, step: &Step, toolkit: &mut dyn Toolkit) -> Result<(), StepError> {
        match step {
            Step::Import(_) | Step::Comment(_) | Step::Blank => (),
            Step::DeclareDataset { name, dataset } => {
                self.namespace
                    .insert(name.clone(), Value::Dataset(dataset.clone()));
            }
            Step::DeclareParameters(parameters) => {
                self.namespace
                    .insert(PARAMS.to_string(), Value::Parameters(parameters.clone()));
            }
            Step::DeclareBinning(binning) => {
                self.namespace
                    .insert(BINS.to_string(), Value::Binning(*binning));
            }
            Step::LoadData {
                dataset,
                datatype,
                output,
            } => {
                let entry = self
                    .dataset(dataset)?
                    .get(datatype)
                    .ok_or_else(|| StepError::MissingDatatype(datatype.clone()))?;
                dnstof::load_data(toolkit, entry, output, self.parameters()?)?;
            }
            Step::NormalizeMonitor { input, output } => {
                toolkit.monitor_efficiency_correction(input, output)?;
                self.bind_workspace(output, output);
            }
            Step::Alias { input, output } => {
                toolkit.clone_workspace(input, output)?;
                self.bind_workspace(output, output);
            }
            Step::SelectFirstBank(name) => {
                let member = toolkit.group_member(&self.workspace(name)?, 0)?;
                self.bind_workspace(name, &member);
            }
            Step::Subtract {
                target,
                background,
                factor,
            } => {
                let factor = match factor {
                    Some(factor) => self.parameter(factor.key(), |p| factor.value(p))?,
                    None => 1.0,
                };
                toolkit.minus(
                    &self.workspace(target)?,
                    &self.workspace(background)?,
                    factor,
                    target,
                )?;
                self.bind_workspace(target, target);
            }
            Step::FindEpp { input, output } => {
                toolkit.find_epp(&self.workspace(input)?, output)?;
                self.bind_workspace(output, output);
            }
            Step::ComputeVanadiumCoefficients {
                vanadium,
                epp_table,
                output,
            } => {
                let temperature = self.parameter("vana_temperature", |p| p.vana_temperature)?;
                toolkit.compute_calibration_coef_van(
                    &self.workspace(vanadium)?,
                    &self.workspace(epp_table)?,
                    temperature,
                    output,
                )?;
                self.bind_workspace(output, output);
            }
            Step::FindBadDetectors {
                coefficients,
                first_bank,
                output,
            } => {
                let mut source = self.workspace(coefficients)?;
                if *first_bank {
                    source = toolkit.group_member(&source, 0)?;
                }
                let detectors = toolkit.nonpositive_spectra(&source)?;
                self.namespace
                    .insert(output.clone(), Value::Detectors(detectors));
            }
            Step::ReportBadDetectors(name) => {
                log::info!("Following detectors will be masked: {:?}", self.detectors(name)?);
            }
            Step::MaskDetectors {
                workspace,
                detectors,
            } => {
                toolkit.mask_detectors(&self.workspace(workspace)?, &self.detectors(detectors)?)?;
            }
            Step::Divide { lhs, rhs, output } => {
                toolkit.divide(&self.workspace(lhs)?, &self.workspace(rhs)?, output)?;
                self.bind_workspace(output, output);
            }
            Step::CorrectTof {
                input,
                epp_table,
                output,
            } => {
                toolkit.correct_tof(&self.workspace(input)?, &self.workspace(epp_table)?, output)?;
                self.bind_workspace(output, output);
            }
            Step::IncidentEnergy { workspace, output } => {
                let first = toolkit.group_member(&self.workspace(workspace)?, 0)?;
                let energy = toolkit.sample_log(&first, "Ei")?;
                self.namespace.insert(output.clone(), Value::Number(energy));
            }
            Step::ReportIncidentEnergy(name) => {
                log::info!("Incident Energy is {} meV", self.number(name)?);
            }
            Step::ConvertToDeltaE { workspace, energy } => {
                dnstof::convert_to_d_e(toolkit, workspace, self.number(energy)?)?;
            }
            Step::ComputeSqw { input, output } => {
                dnstof::get_sqw(toolkit, input, output, &self.binning()?)?;
            }
            Step::SaveAscii { workspace, path } => {
                toolkit.save_ascii(workspace, Path::new(path))?;
            }
            Step::SaveNexus { workspace, path } => {
                toolkit.save_nexus(workspace, Path::new(path))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CANCEL_MESSAGE;
    use crate::error::ToolkitError;
    use crate::script::ScaleFactor;
    use crate::toolkit::{DryRunToolkit, TofData};

    fn add_group(toolkit: &mut DryRunToolkit, name: &str, counts: &[&[f64]]) {
        let mut members = Vec::new();
        for (idx, counts) in counts.iter().enumerate() {
            let member = format!("{name}_{}", idx + 1);
            toolkit.add_data(
                &member,
                TofData {
                    incident_energy: 3.64,
                    detector_counts: counts.to_vec(),
                },
            );
            members.push(member);
        }
        toolkit.group_workspaces(&members, name).unwrap();
    }

    fn parameters() -> Parameters {
        Parameters {
            e_channel: 0,
            wavelength: 0.0,
            delete_raw: true,
            vana_temperature: Some(295.0),
            ec_vana_factor: Some(1.0),
            ec_sample_factor: Some(0.5),
        }
    }

    fn workflow() -> Script {
        let name = |text: &str| text.to_string();
        Script {
            steps: vec![
                Step::DeclareParameters(parameters()),
                Step::DeclareBinning(Binning {
                    qmin: 0.0,
                    qmax: 2.0,
                    qstep: 0.5,
                    de_min: -2.0,
                    de_max: 2.0,
                    de_step: 0.5,
                }),
                Step::NormalizeMonitor {
                    input: name("raw_data1"),
                    output: name("data1"),
                },
                Step::NormalizeMonitor {
                    input: name("raw_ec"),
                    output: name("ec"),
                },
                Step::SelectFirstBank(name("ec")),
                Step::Subtract {
                    target: name("data1"),
                    background: name("ec"),
                    factor: Some(ScaleFactor::Sample),
                },
                Step::FindBadDetectors {
                    coefficients: name("data1"),
                    first_bank: true,
                    output: name("badDetectors"),
                },
                Step::ReportBadDetectors(name("badDetectors")),
                Step::MaskDetectors {
                    workspace: name("data1"),
                    detectors: name("badDetectors"),
                },
                Step::IncidentEnergy {
                    workspace: name("data1"),
                    output: name("Ei"),
                },
                Step::ConvertToDeltaE {
                    workspace: name("data1"),
                    energy: name("Ei"),
                },
                Step::ComputeSqw {
                    input: name("data1_dE_S"),
                    output: name("data1"),
                },
            ],
        }
    }

    fn toolkit() -> DryRunToolkit {
        let mut toolkit = DryRunToolkit::new();
        add_group(&mut toolkit, "raw_data1", &[&[4.0, 1.0], &[6.0, 8.0]]);
        add_group(&mut toolkit, "raw_ec", &[&[2.0, 2.0]]);
        toolkit
    }

    #[test]
    fn test_run_success() {
        let script = workflow();
        let mut toolkit = toolkit();
        let mut runner = ScriptRunner::new();
        let mut seen = Vec::new();
        let mut progress = |step: usize| seen.push(step);
        assert_eq!(runner.run_script(&script, &mut toolkit, &mut progress), "");
        assert_eq!(seen, (0..script.len()).collect::<Vec<usize>>());
        // [4, 1] - 0.5 * [2, 2] leaves detector 1 at zero which is then masked
        assert_eq!(toolkit.data("data1_1").unwrap().detector_counts, vec![3.0, 0.0]);
        assert_eq!(toolkit.data("data1_2").unwrap().detector_counts, vec![5.0, 0.0]);
        assert!(toolkit.has_workspace("data1_dE_S"));
        assert!(toolkit.has_workspace("data1_sqw"));
        assert_eq!(runner.number("Ei").unwrap(), 3.64);
        assert_eq!(runner.workspace("ec").unwrap(), "ec_1");
    }

    #[test]
    fn test_run_cancelled() {
        let script = workflow();
        let mut toolkit = toolkit();
        let mut runner = ScriptRunner::new();
        let token = runner.cancel_token();
        // a cancel request from before the run is cleared
        token.cancel();
        let mut seen = Vec::new();
        let mut progress = |step: usize| {
            seen.push(step);
            if step == 2 {
                token.cancel();
            }
        };
        assert_eq!(
            runner.run(&script, &mut toolkit, &mut progress),
            Err(RunnerError::Cancelled)
        );
        assert_eq!(seen, vec![0, 1, 2]);
        assert!(toolkit.has_workspace("data1"));
        assert!(!toolkit.has_workspace("ec"));

        let message = runner.run_script(&script, &mut toolkit, &mut |step: usize| {
            if step == 0 {
                token.cancel();
            }
        });
        assert_eq!(message, CANCEL_MESSAGE);
    }

    #[test]
    fn test_run_toolkit_error() {
        let script = workflow();
        let mut toolkit = DryRunToolkit::new();
        let mut runner = ScriptRunner::new();
        let mut seen = Vec::new();
        let mut progress = |step: usize| seen.push(step);
        let message = runner.run_script(&script, &mut toolkit, &mut progress);
        assert_eq!(
            message,
            ToolkitError::MissingWorkspace(String::from("raw_data1")).to_string()
        );
        assert_eq!(seen, vec![0, 1]);
    }

    #[test]
    fn test_undefined_variable() {
        let script = Script {
            steps: vec![Step::LoadData {
                dataset: String::from("sample_data"),
                datatype: String::from("knso"),
                output: String::from("raw_data1"),
            }],
        };
        let mut runner = ScriptRunner::new();
        let result = runner.run(&script, &mut DryRunToolkit::new(), &mut |_: usize| ());
        assert_eq!(
            result,
            Err(RunnerError::Execution(StepError::UndefinedVariable(
                String::from("sample_data")
            )))
        );

        let script = Script {
            steps: vec![
                Step::DeclareDataset {
                    name: String::from("sample_data"),
                    dataset: TofDataset::default(),
                },
                Step::DeclareParameters(parameters()),
                script.steps[0].clone(),
            ],
        };
        let message = runner.run_script(&script, &mut DryRunToolkit::new(), &mut |_: usize| ());
        assert_eq!(message, "Dataset has no entry knso");
    }
}
