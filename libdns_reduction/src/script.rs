//! The reduction script as a list of typed steps.
//!
//! A [`Script`] is what the generator produces and what the runner executes. Each [`Step`]
//! corresponds to exactly one line of the printable script; multi-line literals such as
//! the datasets are a single step whose rendering contains line breaks.

use std::fmt;

use super::dataset::TofDataset;

/// Name of the parameter dictionary in the script
pub const PARAMS: &str = "params";
/// Name of the binning dictionary in the script
pub const BINS: &str = "bins";

/// Render a float like the toolkit's scripting language does: integral values keep a
/// trailing `.0`
pub fn py_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

pub fn py_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

/// Parameters handed to the data loading helpers
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    pub e_channel: i64,
    /// Å; values <= 0 are not passed to the loader
    pub wavelength: f64,
    pub delete_raw: bool,
    pub vana_temperature: Option<f64>,
    pub ec_vana_factor: Option<f64>,
    pub ec_sample_factor: Option<f64>,
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ 'e_channel'        : {}, \n          'wavelength'       : {},\n          'delete_raw'       : {},",
            self.e_channel,
            py_float(self.wavelength),
            py_bool(self.delete_raw)
        )?;
        if let Some(temperature) = self.vana_temperature {
            write!(f, "\n          'vana_temperature' : {},", py_float(temperature))?;
        }
        if let Some(factor) = self.ec_vana_factor {
            write!(f, "\n          'ecVanaFactor'     : {},", py_float(factor))?;
        }
        if let Some(factor) = self.ec_sample_factor {
            write!(f, "\n          'ecSampleFactor'   : {},", py_float(factor))?;
        }
        write!(f, " }}")
    }
}

/// S(q,ω) binning in Å⁻¹ and meV
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Binning {
    pub qmin: f64,
    pub qmax: f64,
    pub qstep: f64,
    pub de_min: f64,
    pub de_max: f64,
    pub de_step: f64,
}

impl Binning {
    /// A zero step or an empty range cannot be binned
    pub fn is_valid(&self) -> bool {
        self.qstep != 0.0 && self.de_step != 0.0 && self.qmax > self.qmin && self.de_max > self.de_min
    }
}

impl fmt::Display for Binning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{'qmin' : {:7.3}, 'qmax' : {:7.3}, 'qstep' : {:7.3},\n        'dEmin': {:7.3}, 'dEmax': {:7.3}, 'dEstep': {:7.3}}}",
            self.qmin, self.qmax, self.qstep, self.de_min, self.de_max, self.de_step
        )
    }
}

/// Scale factor of a background subtraction, looked up in the parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleFactor {
    Sample,
    Vanadium,
}

impl ScaleFactor {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Sample => "ecSampleFactor",
            Self::Vanadium => "ecVanaFactor",
        }
    }

    pub fn value(&self, parameters: &Parameters) -> Option<f64> {
        match self {
            Self::Sample => parameters.ec_sample_factor,
            Self::Vanadium => parameters.ec_vana_factor,
        }
    }
}

/// One line of a reduction script.
///
/// Fields holding workspace or variable names refer to script variables; every
/// assignment creates a workspace named after its variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Import(String),
    Comment(String),
    Blank,
    DeclareDataset {
        name: String,
        dataset: TofDataset,
    },
    DeclareParameters(Parameters),
    DeclareBinning(Binning),
    /// Load every bank of one datatype into a group workspace
    LoadData {
        dataset: String,
        datatype: String,
        output: String,
    },
    NormalizeMonitor {
        input: String,
        output: String,
    },
    /// Bind a copy of a workspace to a new name
    Alias {
        input: String,
        output: String,
    },
    SelectFirstBank(String),
    Subtract {
        target: String,
        background: String,
        factor: Option<ScaleFactor>,
    },
    FindEpp {
        input: String,
        output: String,
    },
    ComputeVanadiumCoefficients {
        vanadium: String,
        epp_table: String,
        output: String,
    },
    /// Detectors whose coefficient is not positive, from the first bank if
    /// `first_bank` is set
    FindBadDetectors {
        coefficients: String,
        first_bank: bool,
        output: String,
    },
    ReportBadDetectors(String),
    MaskDetectors {
        workspace: String,
        detectors: String,
    },
    Divide {
        lhs: String,
        rhs: String,
        output: String,
    },
    CorrectTof {
        input: String,
        epp_table: String,
        output: String,
    },
    IncidentEnergy {
        workspace: String,
        output: String,
    },
    ReportIncidentEnergy(String),
    ConvertToDeltaE {
        workspace: String,
        energy: String,
    },
    ComputeSqw {
        input: String,
        output: String,
    },
    SaveAscii {
        workspace: String,
        path: String,
    },
    SaveNexus {
        workspace: String,
        path: String,
    },
}

impl Step {
    pub fn comment(text: &str) -> Self {
        Self::Comment(text.to_string())
    }

    pub fn render(&self) -> String {
        match self {
            Self::Import(line) => line.clone(),
            Self::Comment(text) => format!("# {text}"),
            Self::Blank => String::new(),
            Self::DeclareDataset { name, dataset } => {
                format!("{name} = {}", dataset.format_dataset())
            }
            Self::DeclareParameters(parameters) => format!("{PARAMS} = {parameters}"),
            Self::DeclareBinning(binning) => format!("{BINS} = {binning}"),
            Self::LoadData {
                dataset,
                datatype,
                output,
            } => format!("load_data({dataset}[\"{datatype}\"], \"{output}\", {PARAMS})"),
            Self::NormalizeMonitor { input, output } => {
                format!("{output} = MonitorEfficiencyCorUser(\"{input}\")")
            }
            Self::Alias { input, output } => format!("{output} = CloneWorkspace(\"{input}\")"),
            Self::SelectFirstBank(name) => format!("{name} = {name}[0]"),
            Self::Subtract {
                target,
                background,
                factor: None,
            } => format!("{target} = {target} - {background}"),
            Self::Subtract {
                target,
                background,
                factor: Some(factor),
            } => format!(
                "{target} = {target} - {background} * {PARAMS}['{}']",
                factor.key()
            ),
            Self::FindEpp { input, output } => format!("{output} = FindEPP({input})"),
            Self::ComputeVanadiumCoefficients {
                vanadium,
                epp_table,
                output,
            } => format!(
                "{output} = ComputeCalibrationCoefVan({vanadium}, {epp_table}, Temperature={PARAMS}['vana_temperature'])"
            ),
            Self::FindBadDetectors {
                coefficients,
                first_bank,
                output,
            } => {
                let source = if *first_bank {
                    format!("{coefficients}[0]")
                } else {
                    coefficients.clone()
                };
                format!("{output} = np.where(np.array({source}.extractY()).flatten() <= 0)[0]")
            }
            Self::ReportBadDetectors(name) => {
                format!("print(\"Following detectors will be masked: \",{name})")
            }
            Self::MaskDetectors {
                workspace,
                detectors,
            } => format!("MaskDetectors({workspace}, DetectorList={detectors})"),
            Self::Divide { lhs, rhs, output } => format!("{output} = Divide({lhs}, {rhs})"),
            Self::CorrectTof {
                input,
                epp_table,
                output,
            } => format!("{output} = CorrectTOF({input}, {epp_table})"),
            Self::IncidentEnergy { workspace, output } => {
                format!("{output} = {workspace}[0].getRun().getLogData('Ei').value")
            }
            Self::ReportIncidentEnergy(name) => {
                format!("print ('Incident Energy is {{}} meV'.format({name}))")
            }
            Self::ConvertToDeltaE { workspace, energy } => {
                format!("convert_to_d_e('{workspace}', {energy})")
            }
            Self::ComputeSqw { input, output } => {
                format!("get_sqw('{input}', '{output}', {BINS})")
            }
            Self::SaveAscii { workspace, path } => {
                format!("SaveAscii('{workspace}', '{path}', WriteSpectrumID=False)")
            }
            Self::SaveNexus { workspace, path } => format!("SaveNexus('{workspace}', '{path}')"),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// An ordered reduction script
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    pub steps: Vec<Step>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn extend(&mut self, steps: impl IntoIterator<Item = Step>) {
        self.steps.extend(steps);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn lines(&self) -> Vec<String> {
        self.steps.iter().map(Step::render).collect()
    }

    /// The printable script, one step per line
    pub fn to_text(&self) -> String {
        self.lines().join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parameters() -> Parameters {
        Parameters {
            e_channel: 0,
            wavelength: 4.74,
            delete_raw: true,
            vana_temperature: None,
            ec_vana_factor: None,
            ec_sample_factor: None,
        }
    }

    #[test]
    fn test_py_float() {
        assert_eq!(py_float(4.0), "4.0");
        assert_eq!(py_float(-3.0), "-3.0");
        assert_eq!(py_float(4.74), "4.74");
        assert_eq!(py_float(0.1849336923669811), "0.1849336923669811");
        assert_eq!(py_bool(true), "True");
        assert_eq!(py_bool(false), "False");
    }

    #[test]
    fn test_render_parameters() {
        let mut params = parameters();
        assert_eq!(
            Step::DeclareParameters(params.clone()).render(),
            "params = { 'e_channel'        : 0, \n          'wavelength'       : 4.74,\n          'delete_raw'       : True, }"
        );
        params.vana_temperature = Some(295.0);
        params.ec_vana_factor = Some(1.0);
        params.ec_sample_factor = Some(0.9);
        let text = Step::DeclareParameters(params).render();
        assert!(text.ends_with(
            "\n          'vana_temperature' : 295.0,\n          'ecVanaFactor'     : 1.0,\n          'ecSampleFactor'   : 0.9, }"
        ));
    }

    #[test]
    fn test_render_binning() {
        let binning = Binning {
            qmin: 0.0,
            qmax: 3.0,
            qstep: 0.025,
            de_min: -3.0,
            de_max: 3.0,
            de_step: 0.05,
        };
        assert!(binning.is_valid());
        assert_eq!(
            Step::DeclareBinning(binning).render(),
            "bins = {'qmin' :   0.000, 'qmax' :   3.000, 'qstep' :   0.025,\n        'dEmin':  -3.000, 'dEmax':   3.000, 'dEstep':   0.050}"
        );
        assert!(!Binning { qstep: 0.0, ..binning }.is_valid());
        assert!(!Binning { de_max: -3.0, ..binning }.is_valid());
    }

    #[test]
    fn test_render_steps() {
        let subtract = Step::Subtract {
            target: String::from("data1"),
            background: String::from("ec"),
            factor: Some(ScaleFactor::Sample),
        };
        assert_eq!(subtract.render(), "data1 = data1 - ec * params['ecSampleFactor']");
        let load = Step::LoadData {
            dataset: String::from("sample_data"),
            datatype: String::from("4p1K_map"),
            output: String::from("raw_data1"),
        };
        assert_eq!(load.render(), "load_data(sample_data[\"4p1K_map\"], \"raw_data1\", params)");
        assert_eq!(Step::SelectFirstBank(String::from("ec")).render(), "ec = ec[0]");
        assert_eq!(
            Step::ReportIncidentEnergy(String::from("Ei")).render(),
            "print ('Incident Energy is {} meV'.format(Ei))"
        );
        assert_eq!(Step::comment("get Ei").render(), "# get Ei");
    }

    #[test]
    fn test_script_text() {
        let mut script = Script::new();
        script.push(Step::Import(String::from("import numpy as np")));
        script.push(Step::Blank);
        script.push(Step::ConvertToDeltaE {
            workspace: String::from("data1"),
            energy: String::from("Ei"),
        });
        assert_eq!(script.len(), 3);
        assert_eq!(script.to_text(), "import numpy as np\n\nconvert_to_d_e('data1', Ei)");
    }
}
