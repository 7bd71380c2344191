use std::fmt;

use super::config::{PathConfig, ReductionOptions};
use super::dataset::TofDataset;
use super::file_selection::FileSelection;
use super::script::{Binning, Parameters, ScaleFactor, Script, Step};

const HEADER: [&str; 5] = [
    "import numpy as np",
    "from mantid.simpleapi import MonitorEfficiencyCorUser, FindEPP, CloneWorkspace",
    "from mantid.simpleapi import ComputeCalibrationCoefVan, Divide, CorrectTOF",
    "from mantid.simpleapi import SaveAscii, SaveNexus, MaskDetectors",
    "from mantidqtinterfaces.DNSReduction.scripts.dnstof import convert_to_d_e, get_sqw, load_data",
];

const SAMPLE_DATA: &str = "sample_data";
const STANDARD_DATA: &str = "standard_data";
const OUTPUT: &str = "data1_dE_S";

/// Advisory problems of a reduction setup. A script is generated regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationWarning {
    BadBinning,
    MissingVanadium,
    MissingBackground,
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadBinning => write!(f, "Bin sizes make no sense."),
            Self::MissingVanadium => write!(
                f,
                "No vanadium files selected, but vanadium correction option chosen."
            ),
            Self::MissingBackground => write!(
                f,
                "No background files selected, but background subtraction option chosen."
            ),
        }
    }
}

/// Builds the TOF powder reduction script from options, paths and the selected files.
///
/// Construction groups the files into datasets and derives which corrections apply;
/// [`validate`](Self::validate) and [`script`](Self::script) then work on that state.
#[derive(Debug, Clone)]
pub struct TofPowderScriptGenerator {
    options: ReductionOptions,
    paths: PathConfig,
    sample_data: TofDataset,
    standard_data: TofDataset,
    nb_banks: usize,
    nb_vana_banks: usize,
    nb_empty_banks: usize,
    vana_cor: bool,
    bg_cor: bool,
}

impl TofPowderScriptGenerator {
    pub fn new(options: &ReductionOptions, paths: &PathConfig, selection: &FileSelection) -> Self {
        let sample_data = TofDataset::new(
            &selection.full_data,
            &paths.data_dir.to_string_lossy(),
            true,
        );
        let standard_data = if options.corrections {
            TofDataset::new(
                &selection.standard_data,
                &paths.standards_dir.to_string_lossy(),
                false,
            )
        } else {
            TofDataset::default()
        };
        let nb_banks = sample_data.sample_bank_count();
        let nb_vana_banks = standard_data.vana_bank_count();
        let nb_empty_banks = standard_data.empty_bank_count();
        let vana_cor = options.corrections && options.det_efficency && nb_vana_banks > 0;
        let bg_cor = options.corrections && nb_empty_banks > 0;
        log::debug!(
            "{nb_banks} sample banks, {nb_vana_banks} vanadium banks, {nb_empty_banks} empty banks"
        );
        Self {
            options: options.clone(),
            paths: paths.clone(),
            sample_data,
            standard_data,
            nb_banks,
            nb_vana_banks,
            nb_empty_banks,
            vana_cor,
            bg_cor,
        }
    }

    pub fn vana_cor(&self) -> bool {
        self.vana_cor
    }

    pub fn bg_cor(&self) -> bool {
        self.bg_cor
    }

    pub fn sample_data(&self) -> &TofDataset {
        &self.sample_data
    }

    pub fn standard_data(&self) -> &TofDataset {
        &self.standard_data
    }

    fn binning(&self) -> Binning {
        Binning {
            qmin: self.options.qmin,
            qmax: self.options.qmax,
            qstep: self.options.qstep,
            de_min: self.options.de_min,
            de_max: self.options.de_max,
            de_step: self.options.de_step,
        }
    }

    fn parameters(&self) -> Parameters {
        Parameters {
            e_channel: self.options.epp_channel,
            wavelength: self.options.wavelength,
            delete_raw: self.options.delete_raw,
            vana_temperature: self.vana_cor.then_some(self.options.vanadium_temperature),
            ec_vana_factor: self.bg_cor.then_some(self.options.vana_back_factor),
            ec_sample_factor: self.bg_cor.then_some(self.options.sample_back_factor),
        }
    }

    /// Check binning and the presence of the standards the options ask for
    pub fn validate(&self) -> Result<(), ValidationWarning> {
        let opt = &self.options;
        if !self.binning().is_valid() {
            return Err(ValidationWarning::BadBinning);
        }
        if self.nb_vana_banks == 0 && opt.corrections && opt.det_efficency {
            return Err(ValidationWarning::MissingVanadium);
        }
        if self.nb_empty_banks == 0
            && opt.corrections
            && (opt.substract_vana_back || opt.substract_sample_back)
        {
            return Err(ValidationWarning::MissingBackground);
        }
        Ok(())
    }

    /// Emit the script blocks in order
    pub fn script(&self) -> Script {
        let mut script = Script::new();
        script.extend(self.header_steps());
        script.extend(self.dataset_steps());
        script.extend(self.parameter_steps());
        script.extend(self.load_steps());
        script.extend(self.normalization_steps());
        script.extend(self.background_steps());
        script.extend(self.vanadium_steps());
        script.extend(self.energy_steps());
        script.extend(self.sqw_steps());
        script.extend(self.save_steps());
        script
    }

    fn header_steps(&self) -> Vec<Step> {
        let mut steps: Vec<Step> = HEADER.iter().map(|line| Step::Import(line.to_string())).collect();
        steps.push(Step::Blank);
        steps
    }

    fn dataset_steps(&self) -> Vec<Step> {
        let mut steps = vec![Step::DeclareDataset {
            name: String::from(SAMPLE_DATA),
            dataset: self.sample_data.clone(),
        }];
        if self.options.corrections {
            steps.push(Step::DeclareDataset {
                name: String::from(STANDARD_DATA),
                dataset: self.standard_data.clone(),
            });
        } else {
            steps.push(Step::Blank);
        }
        steps
    }

    fn parameter_steps(&self) -> Vec<Step> {
        vec![
            Step::DeclareParameters(self.parameters()),
            Step::Blank,
            Step::DeclareBinning(self.binning()),
            Step::Blank,
        ]
    }

    fn load_steps(&self) -> Vec<Step> {
        let mut steps = vec![Step::LoadData {
            dataset: String::from(SAMPLE_DATA),
            datatype: self.sample_data.sample_filename(),
            output: String::from("raw_data1"),
        }];
        if self.bg_cor {
            steps.push(Step::LoadData {
                dataset: String::from(STANDARD_DATA),
                datatype: self.standard_data.empty_filename(),
                output: String::from("raw_ec"),
            });
        }
        if self.vana_cor {
            steps.push(Step::LoadData {
                dataset: String::from(STANDARD_DATA),
                datatype: self.standard_data.vana_filename(),
                output: String::from("raw_vanadium"),
            });
        }
        steps.push(Step::Blank);
        steps
    }

    fn normalization_steps(&self) -> Vec<Step> {
        if self.options.norm_monitor {
            vec![
                Step::comment("normalize"),
                Step::NormalizeMonitor {
                    input: String::from("raw_data1"),
                    output: String::from("data1"),
                },
            ]
        } else {
            vec![Step::Alias {
                input: String::from("raw_data1"),
                output: String::from("data1"),
            }]
        }
    }

    fn background_steps(&self) -> Vec<Step> {
        if !self.bg_cor {
            return Vec::new();
        }
        let mut steps = vec![
            Step::Blank,
            Step::NormalizeMonitor {
                input: String::from("raw_ec"),
                output: String::from("ec"),
            },
        ];
        if self.nb_empty_banks != self.nb_banks {
            steps.push(Step::comment("only one empty can bank"));
            steps.push(Step::SelectFirstBank(String::from("ec")));
        }
        if self.options.substract_sample_back {
            steps.push(Step::comment("subtract empty can"));
            steps.push(Step::Subtract {
                target: String::from("data1"),
                background: String::from("ec"),
                factor: Some(ScaleFactor::Sample),
            });
            steps.push(Step::Blank);
        }
        steps
    }

    fn vanadium_steps(&self) -> Vec<Step> {
        if !self.vana_cor {
            return vec![Step::Blank];
        }
        let mut steps = vec![Step::NormalizeMonitor {
            input: String::from("raw_vanadium"),
            output: String::from("vanadium"),
        }];
        if self.options.substract_vana_back && self.bg_cor {
            let factor = (self.options.vana_back_factor != 1.0).then_some(ScaleFactor::Vanadium);
            steps.push(Step::Subtract {
                target: String::from("vanadium"),
                background: String::from("ec"),
                factor,
            });
        } else {
            steps.push(Step::Blank);
        }
        if self.nb_vana_banks != self.nb_banks {
            steps.push(Step::comment("only one vanadium bank position"));
            steps.push(Step::SelectFirstBank(String::from("vanadium")));
            steps.push(Step::Blank);
        }
        steps.push(Step::comment("detector efficiency correction: compute coefficients"));
        steps.push(Step::FindEpp {
            input: String::from("vanadium"),
            output: String::from("epptable"),
        });
        steps.push(Step::ComputeVanadiumCoefficients {
            vanadium: String::from("vanadium"),
            epp_table: String::from("epptable"),
            output: String::from("coefs"),
        });
        if self.options.mask_bad_detectors {
            steps.push(Step::comment("get list of bad detectors"));
            steps.push(Step::FindBadDetectors {
                coefficients: String::from("coefs"),
                first_bank: self.nb_vana_banks > 1 || self.nb_vana_banks == self.nb_banks,
                output: String::from("badDetectors"),
            });
            steps.push(Step::ReportBadDetectors(String::from("badDetectors")));
            steps.push(Step::MaskDetectors {
                workspace: String::from("data1"),
                detectors: String::from("badDetectors"),
            });
        }
        steps.push(Step::Blank);
        steps.push(Step::comment("apply detector efficiency correction"));
        steps.push(Step::Divide {
            lhs: String::from("data1"),
            rhs: String::from("coefs"),
            output: String::from("data1"),
        });
        if self.options.correct_elastic_peak_position {
            steps.extend([
                Step::Blank,
                Step::comment("correct TOF to get EPP at 0 meV"),
                Step::CorrectTof {
                    input: String::from("data1"),
                    epp_table: String::from("epptable"),
                    output: String::from("data1"),
                },
                Step::Blank,
            ]);
        }
        steps
    }

    fn energy_steps(&self) -> Vec<Step> {
        vec![
            Step::comment("get Ei"),
            Step::IncidentEnergy {
                workspace: String::from("data1"),
                output: String::from("Ei"),
            },
            Step::ReportIncidentEnergy(String::from("Ei")),
            Step::Blank,
        ]
    }

    fn sqw_steps(&self) -> Vec<Step> {
        vec![
            Step::comment("get S(q,w)"),
            Step::ConvertToDeltaE {
                workspace: String::from("data1"),
                energy: String::from("Ei"),
            },
            Step::Blank,
            Step::comment("merge all detector positions together"),
            Step::ComputeSqw {
                input: String::from(OUTPUT),
                output: String::from("data1"),
            },
        ]
    }

    fn save_steps(&self) -> Vec<Step> {
        let paths = &self.paths;
        let mut steps = Vec::new();
        if !paths.export || paths.export_dir.is_empty() {
            return steps;
        }
        if paths.ascii {
            steps.push(Step::SaveAscii {
                workspace: String::from(OUTPUT),
                path: format!("{}/{OUTPUT}.csv", paths.export_dir),
            });
        }
        if paths.nexus {
            steps.push(Step::SaveNexus {
                workspace: String::from(OUTPUT),
                path: format!("{}/{OUTPUT}.nxs", paths.export_dir),
            });
        }
        steps
    }
}

/// Generate a reduction script in one call, logging an advisory warning if the setup is
/// not valid
pub fn script_maker(
    options: &ReductionOptions,
    paths: &PathConfig,
    selection: &FileSelection,
) -> Script {
    let generator = TofPowderScriptGenerator::new(options, paths, selection);
    if let Err(warning) = generator.validate() {
        log::warn!("{warning}");
    }
    generator.script()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_selection::SelectedFile;
    use std::path::PathBuf;

    fn entry(sample_name: &str, det_rot: f64, file_number: u64, prefix: &str) -> SelectedFile {
        SelectedFile {
            file_number,
            det_rot,
            sample_name: sample_name.to_string(),
            filename: format!("{prefix}_{file_number}.d_dat"),
            wavelength: 4.74,
            channelwidth: 1.6,
            tofchannels: 1000,
        }
    }

    fn paths() -> PathConfig {
        PathConfig {
            data_dir: PathBuf::from("C:/data"),
            standards_dir: PathBuf::from("C:/standards"),
            export_dir: String::from("C:/export"),
            script_dir: PathBuf::from("C:/scripts"),
            ascii: true,
            nexus: true,
            export: true,
        }
    }

    /// Two sample banks, vanadium at both, empty can at one
    fn selection() -> FileSelection {
        FileSelection {
            full_data: vec![
                entry("4p1K_map", -9.0, 788058, "service"),
                entry("4p1K_map", -5.0, 788059, "service"),
            ],
            standard_data: vec![
                entry("vanadium", -9.0, 774714, "vana"),
                entry("vanadium", -5.0, 774715, "vana"),
                entry("empty", -9.0, 774716, "leer"),
            ],
        }
    }

    fn script_lines(options: &ReductionOptions, selection: &FileSelection) -> Vec<String> {
        TofPowderScriptGenerator::new(options, &paths(), selection)
            .script()
            .lines()
    }

    #[test]
    fn test_correction_flags() {
        let options = ReductionOptions::default();
        let generator = TofPowderScriptGenerator::new(&options, &paths(), &selection());
        assert!(generator.vana_cor());
        assert!(generator.bg_cor());

        let mut no_standards = selection();
        no_standards.standard_data.clear();
        let generator = TofPowderScriptGenerator::new(&options, &paths(), &no_standards);
        assert!(!generator.vana_cor());
        assert!(!generator.bg_cor());

        let mut vana_only = selection();
        vana_only.standard_data.pop();
        let generator = TofPowderScriptGenerator::new(&options, &paths(), &vana_only);
        assert!(generator.vana_cor());
        assert!(!generator.bg_cor());

        let options = ReductionOptions {
            det_efficency: false,
            ..ReductionOptions::default()
        };
        let generator = TofPowderScriptGenerator::new(&options, &paths(), &selection());
        assert!(!generator.vana_cor());
        assert!(generator.bg_cor());
    }

    #[test]
    fn test_validate() {
        let options = ReductionOptions::default();
        let generator = TofPowderScriptGenerator::new(&options, &paths(), &selection());
        assert_eq!(generator.validate(), Ok(()));

        let bad_bins = ReductionOptions {
            qstep: 0.0,
            ..ReductionOptions::default()
        };
        let generator = TofPowderScriptGenerator::new(&bad_bins, &paths(), &selection());
        assert_eq!(generator.validate(), Err(ValidationWarning::BadBinning));
        assert_eq!(
            ValidationWarning::BadBinning.to_string(),
            "Bin sizes make no sense."
        );

        let mut no_standards = selection();
        no_standards.standard_data.clear();
        let generator = TofPowderScriptGenerator::new(&options, &paths(), &no_standards);
        assert_eq!(generator.validate(), Err(ValidationWarning::MissingVanadium));
        // validation is advisory
        assert!(!generator.script().is_empty());

        let mut vana_only = selection();
        vana_only.standard_data.pop();
        let generator = TofPowderScriptGenerator::new(&options, &paths(), &vana_only);
        assert_eq!(generator.validate(), Err(ValidationWarning::MissingBackground));
    }

    #[test]
    fn test_full_script() {
        let lines = script_lines(&ReductionOptions::default(), &selection());
        let expected_tail: Vec<&str> = vec![
            "load_data(sample_data[\"4p1K_map\"], \"raw_data1\", params)",
            "load_data(standard_data[\"empty_empty\"], \"raw_ec\", params)",
            "load_data(standard_data[\"vanadium_vana\"], \"raw_vanadium\", params)",
            "",
            "# normalize",
            "data1 = MonitorEfficiencyCorUser(\"raw_data1\")",
            "",
            "ec = MonitorEfficiencyCorUser(\"raw_ec\")",
            "# only one empty can bank",
            "ec = ec[0]",
            "# subtract empty can",
            "data1 = data1 - ec * params['ecSampleFactor']",
            "",
            "vanadium = MonitorEfficiencyCorUser(\"raw_vanadium\")",
            "vanadium = vanadium - ec",
            "# detector efficiency correction: compute coefficients",
            "epptable = FindEPP(vanadium)",
            "coefs = ComputeCalibrationCoefVan(vanadium, epptable, Temperature=params['vana_temperature'])",
            "# get list of bad detectors",
            "badDetectors = np.where(np.array(coefs[0].extractY()).flatten() <= 0)[0]",
            "print(\"Following detectors will be masked: \",badDetectors)",
            "MaskDetectors(data1, DetectorList=badDetectors)",
            "",
            "# apply detector efficiency correction",
            "data1 = Divide(data1, coefs)",
            "# get Ei",
        ];
        let start = lines
            .iter()
            .position(|line| line.starts_with("load_data("))
            .unwrap();
        assert_eq!(lines[start..start + expected_tail.len()].to_vec(), expected_tail);

        assert_eq!(lines[0], "import numpy as np");
        assert_eq!(lines[5], "");
        assert!(lines[6].starts_with("sample_data = {\n     '4p1K_map': {'path': 'C:/data/service',"));
        assert!(lines[7].starts_with("standard_data = {"));
        assert!(lines[8].starts_with("params = { 'e_channel'"));
        assert!(lines.iter().any(|line| line.contains("'ecSampleFactor'   : 1.0,")));
        assert!(lines.iter().any(|line| line.contains("'vana_temperature' : 295.0,")));
        assert!(lines.contains(&String::from(
            "SaveAscii('data1_dE_S', 'C:/export/data1_dE_S.csv', WriteSpectrumID=False)"
        )));
        assert_eq!(
            lines.last().unwrap(),
            "SaveNexus('data1_dE_S', 'C:/export/data1_dE_S.nxs')"
        );
    }

    #[test]
    fn test_energy_and_sqw_blocks() {
        let lines = script_lines(&ReductionOptions::default(), &selection());
        let start = lines.iter().position(|line| line == "# get Ei").unwrap();
        assert_eq!(
            lines[start..start + 9].to_vec(),
            vec![
                "# get Ei",
                "Ei = data1[0].getRun().getLogData('Ei').value",
                "print ('Incident Energy is {} meV'.format(Ei))",
                "",
                "# get S(q,w)",
                "convert_to_d_e('data1', Ei)",
                "",
                "# merge all detector positions together",
                "get_sqw('data1_dE_S', 'data1', bins)",
            ]
        );
    }

    #[test]
    fn test_no_corrections() {
        let options = ReductionOptions {
            corrections: false,
            norm_monitor: false,
            ..ReductionOptions::default()
        };
        let lines = script_lines(&options, &selection());
        assert!(!lines.iter().any(|line| line.starts_with("standard_data")));
        assert!(!lines.iter().any(|line| line.contains("vanadium")));
        assert!(!lines
            .iter()
            .any(|line| line.contains("raw_ec") || line.starts_with("ec ")));
        assert!(!lines.iter().any(|line| line.contains("'vana_temperature'")));
        assert!(lines.contains(&String::from("data1 = CloneWorkspace(\"raw_data1\")")));
        // the missing standard declaration leaves a blank line
        assert_eq!(lines[7], "");
        assert!(lines[8].starts_with("params = { 'e_channel'"));
    }

    #[test]
    fn test_vanadium_variants() {
        let options = ReductionOptions {
            vana_back_factor: 0.8,
            mask_bad_detectors: false,
            correct_elastic_peak_position: true,
            ..ReductionOptions::default()
        };
        let mut single_vana = selection();
        single_vana.standard_data.remove(1);
        let lines = script_lines(&options, &single_vana);
        assert!(lines.contains(&String::from(
            "vanadium = vanadium - ec * params['ecVanaFactor']"
        )));
        assert!(lines.contains(&String::from("# only one vanadium bank position")));
        assert!(lines.contains(&String::from("vanadium = vanadium[0]")));
        assert!(!lines.iter().any(|line| line.contains("badDetectors")));
        assert!(lines.contains(&String::from("data1 = CorrectTOF(data1, epptable)")));

        let options = ReductionOptions {
            substract_vana_back: false,
            ..ReductionOptions::default()
        };
        let lines = script_lines(&options, &single_vana);
        let position = lines
            .iter()
            .position(|line| line == "vanadium = MonitorEfficiencyCorUser(\"raw_vanadium\")")
            .unwrap();
        assert_eq!(lines[position + 1], "");
        assert!(lines.contains(&String::from(
            "badDetectors = np.where(np.array(coefs.extractY()).flatten() <= 0)[0]"
        )));
    }

    #[test]
    fn test_save_gating() {
        let mut selection = selection();
        selection.standard_data.clear();
        let options = ReductionOptions::default();
        let mut paths = paths();
        paths.export_dir = String::new();
        let script = TofPowderScriptGenerator::new(&options, &paths, &selection).script();
        assert!(!script.to_text().contains("SaveAscii('"));
        assert!(!script.to_text().contains("SaveNexus('"));
        paths.export_dir = String::from("C:/export");
        paths.nexus = false;
        let script = TofPowderScriptGenerator::new(&options, &paths, &selection).script();
        assert!(script.to_text().contains("SaveAscii("));
        assert!(!script.to_text().contains("SaveNexus("));
    }
}
