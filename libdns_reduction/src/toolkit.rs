use fxhash::FxHashMap;
use ndarray::Axis;
use std::path::Path;

use super::constants::ENERGY_WAVELENGTH_FACTOR;
use super::dns_file::DnsFile;
use super::error::ToolkitError;

/// The operations of the external numeric toolkit used by a reduction.
///
/// Workspaces are addressed by name. Operations applied to a group act on each member and
/// produce a group of the same size.
pub trait Toolkit {
    fn load_dns_legacy(
        &mut self,
        filename: &Path,
        elastic_channel: i64,
        wavelength: Option<f64>,
        output: &str,
    ) -> Result<(), ToolkitError>;
    /// Sum runs, adding the `sum_logs` and concatenating the `time_series_logs`
    fn merge_runs(
        &mut self,
        inputs: &[String],
        sum_logs: &str,
        time_series_logs: &str,
        output: &str,
    ) -> Result<(), ToolkitError>;
    fn delete_workspaces(&mut self, names: &[String]) -> Result<(), ToolkitError>;
    fn group_workspaces(&mut self, inputs: &[String], output: &str) -> Result<(), ToolkitError>;
    /// Name of the member at `index` of a group
    fn group_member(&self, group: &str, index: usize) -> Result<String, ToolkitError>;
    /// Members of a group, 1 for any other workspace
    fn number_of_entries(&self, workspace: &str) -> Result<usize, ToolkitError>;
    fn clone_workspace(&mut self, input: &str, output: &str) -> Result<(), ToolkitError>;
    fn monitor_efficiency_correction(&mut self, input: &str, output: &str)
        -> Result<(), ToolkitError>;
    /// `output = lhs - factor * rhs`
    fn minus(&mut self, lhs: &str, rhs: &str, factor: f64, output: &str)
        -> Result<(), ToolkitError>;
    /// Fit the elastic peak position of every spectrum into a table
    fn find_epp(&mut self, input: &str, output: &str) -> Result<(), ToolkitError>;
    fn compute_calibration_coef_van(
        &mut self,
        vanadium: &str,
        epp_table: &str,
        temperature: f64,
        output: &str,
    ) -> Result<(), ToolkitError>;
    /// Indices of the spectra whose values are all <= 0
    fn nonpositive_spectra(&self, workspace: &str) -> Result<Vec<usize>, ToolkitError>;
    fn mask_detectors(&mut self, workspace: &str, detectors: &[usize]) -> Result<(), ToolkitError>;
    fn divide(&mut self, lhs: &str, rhs: &str, output: &str) -> Result<(), ToolkitError>;
    fn correct_tof(&mut self, input: &str, epp_table: &str, output: &str)
        -> Result<(), ToolkitError>;
    fn sample_log(&self, workspace: &str, name: &str) -> Result<f64, ToolkitError>;
    /// Convert TOF to energy transfer in direct geometry
    fn convert_to_delta_e(&mut self, input: &str, efixed: f64, output: &str)
        -> Result<(), ToolkitError>;
    fn convert_to_distribution(&mut self, workspace: &str) -> Result<(), ToolkitError>;
    fn correct_ki_kf(&mut self, input: &str, output: &str) -> Result<(), ToolkitError>;
    /// Convert to an |Q|, ΔE event workspace
    fn convert_to_md(&mut self, input: &str, output: &str) -> Result<(), ToolkitError>;
    fn merge_md(&mut self, input: &str, output: &str) -> Result<(), ToolkitError>;
    /// Bin an event workspace; dimensions are given as `name,min,max,bins`
    fn bin_md(&mut self, input: &str, dim0: &str, dim1: &str, output: &str)
        -> Result<(), ToolkitError>;
    fn save_ascii(&mut self, workspace: &str, path: &Path) -> Result<(), ToolkitError>;
    fn save_nexus(&mut self, workspace: &str, path: &Path) -> Result<(), ToolkitError>;
}

/// Counts per detector and the incident energy of one bank
#[derive(Debug, Clone, PartialEq)]
pub struct TofData {
    pub incident_energy: f64,
    pub detector_counts: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
enum Workspace {
    Data(TofData),
    Group(Vec<String>),
    Table,
    Md,
}

/// A toolkit which does no physics.
///
/// It keeps track of the workspaces a script creates, checks that every input exists,
/// reads loaded datafiles and records the name of each call. Data workspaces carry the
/// summed counts per detector so that bad detector masking can be followed.
#[derive(Debug, Default)]
pub struct DryRunToolkit {
    workspaces: FxHashMap<String, Workspace>,
    calls: Vec<String>,
}

impl DryRunToolkit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the toolkit operations called so far, in order
    pub fn calls(&self) -> &[String] {
        &self.calls
    }

    pub fn has_workspace(&self, name: &str) -> bool {
        self.workspaces.contains_key(name)
    }

    pub fn workspace_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workspaces.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn data(&self, name: &str) -> Option<&TofData> {
        match self.workspaces.get(name) {
            Some(Workspace::Data(data)) => Some(data),
            _ => None,
        }
    }

    /// Insert a data workspace directly
    pub fn add_data(&mut self, name: &str, data: TofData) {
        self.workspaces.insert(name.to_string(), Workspace::Data(data));
    }

    fn record(&mut self, call: &str) {
        log::debug!("{call}");
        self.calls.push(call.to_string());
    }

    fn get(&self, name: &str) -> Result<&Workspace, ToolkitError> {
        self.workspaces
            .get(name)
            .ok_or_else(|| ToolkitError::MissingWorkspace(name.to_string()))
    }

    fn get_data(&self, name: &str) -> Result<&TofData, ToolkitError> {
        match self.get(name)? {
            Workspace::Data(data) => Ok(data),
            _ => Err(ToolkitError::NotMatrixWorkspace(name.to_string())),
        }
    }

    fn members(&self, name: &str) -> Result<Option<Vec<String>>, ToolkitError> {
        match self.get(name)? {
            Workspace::Group(members) => Ok(Some(members.clone())),
            _ => Ok(None),
        }
    }

    /// Apply `op` to a workspace or to every member of a group
    fn map_unary(
        &mut self,
        input: &str,
        output: &str,
        op: &dyn Fn(&Workspace) -> Result<Workspace, ToolkitError>,
    ) -> Result<(), ToolkitError> {
        match self.members(input)? {
            Some(members) => {
                let mut names = Vec::with_capacity(members.len());
                for (idx, member) in members.iter().enumerate() {
                    let name = format!("{output}_{}", idx + 1);
                    self.map_unary(member, &name, op)?;
                    names.push(name);
                }
                self.workspaces
                    .insert(output.to_string(), Workspace::Group(names));
            }
            None => {
                let result = op(self.get(input)?)?;
                self.workspaces.insert(output.to_string(), result);
            }
        }
        Ok(())
    }

    /// Apply `op` member by member; a single right hand side is used for every member
    fn map_binary(
        &mut self,
        lhs: &str,
        rhs: &str,
        output: &str,
        op: &dyn Fn(&Workspace, &Workspace) -> Result<Workspace, ToolkitError>,
    ) -> Result<(), ToolkitError> {
        match (self.members(lhs)?, self.members(rhs)?) {
            (Some(left), right) => {
                if let Some(right) = &right {
                    if right.len() != left.len() {
                        return Err(ToolkitError::GroupSizeMismatch(
                            lhs.to_string(),
                            rhs.to_string(),
                        ));
                    }
                }
                let mut names = Vec::with_capacity(left.len());
                for (idx, member) in left.iter().enumerate() {
                    let other = match &right {
                        Some(right) => right[idx].clone(),
                        None => rhs.to_string(),
                    };
                    let name = format!("{output}_{}", idx + 1);
                    self.map_binary(member, &other, &name, op)?;
                    names.push(name);
                }
                self.workspaces
                    .insert(output.to_string(), Workspace::Group(names));
            }
            (None, Some(_)) => {
                return Err(ToolkitError::GroupSizeMismatch(
                    lhs.to_string(),
                    rhs.to_string(),
                ))
            }
            (None, None) => {
                let result = op(self.get(lhs)?, self.get(rhs)?)?;
                self.workspaces.insert(output.to_string(), result);
            }
        }
        Ok(())
    }

    fn check_save(&self, workspace: &str, path: &Path) -> Result<(), ToolkitError> {
        self.get(workspace)?;
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => Err(
                ToolkitError::SaveFailed(path.to_path_buf(), String::from("no such directory")),
            ),
            _ => Ok(()),
        }
    }
}

fn as_data<'a>(workspace: &'a Workspace) -> Result<&'a TofData, ToolkitError> {
    match workspace {
        Workspace::Data(data) => Ok(data),
        _ => Err(ToolkitError::NotMatrixWorkspace(String::from("input"))),
    }
}

fn combine(
    lhs: &Workspace,
    rhs: &Workspace,
    op: impl Fn(f64, f64) -> f64,
) -> Result<Workspace, ToolkitError> {
    let (lhs, rhs) = (as_data(lhs)?, as_data(rhs)?);
    let detector_counts = lhs
        .detector_counts
        .iter()
        .zip(rhs.detector_counts.iter())
        .map(|(l, r)| op(*l, *r))
        .collect();
    Ok(Workspace::Data(TofData {
        incident_energy: lhs.incident_energy,
        detector_counts,
    }))
}

fn same_data(workspace: &Workspace) -> Result<Workspace, ToolkitError> {
    Ok(Workspace::Data(as_data(workspace)?.clone()))
}

impl Toolkit for DryRunToolkit {
    fn load_dns_legacy(
        &mut self,
        filename: &Path,
        _elastic_channel: i64,
        wavelength: Option<f64>,
        output: &str,
    ) -> Result<(), ToolkitError> {
        self.record("LoadDNSLegacy");
        if !filename.is_file() {
            return Err(ToolkitError::MissingFile(filename.to_path_buf()));
        }
        let dir = filename.parent().unwrap_or(Path::new(""));
        let name = filename
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let file = DnsFile::read(dir, &name)
            .map_err(|e| ToolkitError::UnreadableFile(filename.to_path_buf(), e.to_string()))?
            .ok_or_else(|| ToolkitError::NotDnsFile(filename.to_path_buf()))?;
        let incident_energy = match wavelength {
            Some(wavelength) => ENERGY_WAVELENGTH_FACTOR / (wavelength * wavelength),
            None => file.energy,
        };
        let detector_counts = file
            .counts
            .sum_axis(Axis(1))
            .iter()
            .map(|count| *count as f64)
            .collect();
        self.add_data(
            output,
            TofData {
                incident_energy,
                detector_counts,
            },
        );
        Ok(())
    }

    fn merge_runs(
        &mut self,
        inputs: &[String],
        sum_logs: &str,
        time_series_logs: &str,
        output: &str,
    ) -> Result<(), ToolkitError> {
        self.record("MergeRuns");
        log::debug!("Merging {inputs:?}, summing {sum_logs}, time series {time_series_logs}");
        let mut merged: Option<TofData> = None;
        for input in inputs {
            let data = self.get_data(input)?;
            merged = Some(match merged {
                None => data.clone(),
                Some(mut sum) => {
                    for (total, count) in sum.detector_counts.iter_mut().zip(&data.detector_counts) {
                        *total += count;
                    }
                    sum
                }
            });
        }
        let merged = merged.ok_or_else(|| ToolkitError::MissingWorkspace(output.to_string()))?;
        self.add_data(output, merged);
        Ok(())
    }

    fn delete_workspaces(&mut self, names: &[String]) -> Result<(), ToolkitError> {
        self.record("DeleteWorkspaces");
        for name in names {
            self.workspaces
                .remove(name)
                .ok_or_else(|| ToolkitError::MissingWorkspace(name.clone()))?;
        }
        Ok(())
    }

    fn group_workspaces(&mut self, inputs: &[String], output: &str) -> Result<(), ToolkitError> {
        self.record("GroupWorkspaces");
        for input in inputs {
            self.get(input)?;
        }
        self.workspaces
            .insert(output.to_string(), Workspace::Group(inputs.to_vec()));
        Ok(())
    }

    fn group_member(&self, group: &str, index: usize) -> Result<String, ToolkitError> {
        self.members(group)?
            .and_then(|members| members.get(index).cloned())
            .ok_or_else(|| ToolkitError::MissingEntry(group.to_string(), index))
    }

    fn number_of_entries(&self, workspace: &str) -> Result<usize, ToolkitError> {
        Ok(self.members(workspace)?.map_or(1, |members| members.len()))
    }

    fn clone_workspace(&mut self, input: &str, output: &str) -> Result<(), ToolkitError> {
        self.record("CloneWorkspace");
        self.map_unary(input, output, &|ws| Ok(ws.clone()))
    }

    fn monitor_efficiency_correction(
        &mut self,
        input: &str,
        output: &str,
    ) -> Result<(), ToolkitError> {
        self.record("MonitorEfficiencyCorUser");
        self.map_unary(input, output, &same_data)
    }

    fn minus(&mut self, lhs: &str, rhs: &str, factor: f64, output: &str)
        -> Result<(), ToolkitError> {
        self.record("Minus");
        self.map_binary(lhs, rhs, output, &|l, r| combine(l, r, |l, r| l - factor * r))
    }

    fn find_epp(&mut self, input: &str, output: &str) -> Result<(), ToolkitError> {
        self.record("FindEPP");
        self.map_unary(input, output, &|ws| as_data(ws).map(|_| Workspace::Table))
    }

    fn compute_calibration_coef_van(
        &mut self,
        vanadium: &str,
        epp_table: &str,
        _temperature: f64,
        output: &str,
    ) -> Result<(), ToolkitError> {
        self.record("ComputeCalibrationCoefVan");
        self.map_binary(vanadium, epp_table, output, &|van, table| {
            if *table != Workspace::Table {
                return Err(ToolkitError::NotTableWorkspace(String::from("epp table")));
            }
            let data = as_data(van)?;
            let positive: Vec<f64> = data
                .detector_counts
                .iter()
                .copied()
                .filter(|count| *count > 0.0)
                .collect();
            let mean = positive.iter().sum::<f64>() / positive.len().max(1) as f64;
            let detector_counts = data
                .detector_counts
                .iter()
                .map(|count| if *count > 0.0 { count / mean } else { 0.0 })
                .collect();
            Ok(Workspace::Data(TofData {
                incident_energy: data.incident_energy,
                detector_counts,
            }))
        })
    }

    fn nonpositive_spectra(&self, workspace: &str) -> Result<Vec<usize>, ToolkitError> {
        let data = self.get_data(workspace)?;
        Ok(data
            .detector_counts
            .iter()
            .enumerate()
            .filter(|(_, count)| **count <= 0.0)
            .map(|(idx, _)| idx)
            .collect())
    }

    fn mask_detectors(&mut self, workspace: &str, detectors: &[usize]) -> Result<(), ToolkitError> {
        self.record("MaskDetectors");
        let detectors = detectors.to_vec();
        let name = workspace.to_string();
        self.map_unary(workspace, &name, &|ws| {
            let mut data = as_data(ws)?.clone();
            for idx in detectors.iter() {
                if let Some(count) = data.detector_counts.get_mut(*idx) {
                    *count = 0.0;
                }
            }
            Ok(Workspace::Data(data))
        })
    }

    fn divide(&mut self, lhs: &str, rhs: &str, output: &str) -> Result<(), ToolkitError> {
        self.record("Divide");
        self.map_binary(lhs, rhs, output, &|l, r| {
            combine(l, r, |l, r| if r == 0.0 { 0.0 } else { l / r })
        })
    }

    fn correct_tof(&mut self, input: &str, epp_table: &str, output: &str)
        -> Result<(), ToolkitError> {
        self.record("CorrectTOF");
        self.map_binary(input, epp_table, output, &|ws, table| {
            if *table != Workspace::Table {
                return Err(ToolkitError::NotTableWorkspace(String::from("epp table")));
            }
            same_data(ws)
        })
    }

    fn sample_log(&self, workspace: &str, name: &str) -> Result<f64, ToolkitError> {
        match (self.get_data(workspace)?, name) {
            (data, "Ei") => Ok(data.incident_energy),
            _ => Err(ToolkitError::MissingLog(
                workspace.to_string(),
                name.to_string(),
            )),
        }
    }

    fn convert_to_delta_e(&mut self, input: &str, efixed: f64, output: &str)
        -> Result<(), ToolkitError> {
        self.record("ConvertUnits");
        self.map_unary(input, output, &|ws| {
            let mut data = as_data(ws)?.clone();
            data.incident_energy = efixed;
            Ok(Workspace::Data(data))
        })
    }

    fn convert_to_distribution(&mut self, workspace: &str) -> Result<(), ToolkitError> {
        self.record("ConvertToDistribution");
        self.get(workspace)?;
        Ok(())
    }

    fn correct_ki_kf(&mut self, input: &str, output: &str) -> Result<(), ToolkitError> {
        self.record("CorrectKiKf");
        self.map_unary(input, output, &same_data)
    }

    fn convert_to_md(&mut self, input: &str, output: &str) -> Result<(), ToolkitError> {
        self.record("ConvertToMD");
        self.map_unary(input, output, &|ws| as_data(ws).map(|_| Workspace::Md))
    }

    fn merge_md(&mut self, input: &str, output: &str) -> Result<(), ToolkitError> {
        self.record("MergeMD");
        let members = self
            .members(input)?
            .ok_or_else(|| ToolkitError::MissingEntry(input.to_string(), 0))?;
        for member in members.iter() {
            if *self.get(member)? != Workspace::Md {
                return Err(ToolkitError::NotMdWorkspace(member.clone()));
            }
        }
        self.workspaces.insert(output.to_string(), Workspace::Md);
        Ok(())
    }

    fn bin_md(&mut self, input: &str, dim0: &str, dim1: &str, output: &str)
        -> Result<(), ToolkitError> {
        self.record("BinMD");
        log::debug!("Binning {input} along {dim0} and {dim1}");
        let source = match self.members(input)? {
            Some(members) if members.len() == 1 => members[0].clone(),
            _ => input.to_string(),
        };
        if *self.get(&source)? != Workspace::Md {
            return Err(ToolkitError::NotMdWorkspace(source));
        }
        self.workspaces.insert(output.to_string(), Workspace::Md);
        Ok(())
    }

    fn save_ascii(&mut self, workspace: &str, path: &Path) -> Result<(), ToolkitError> {
        self.record("SaveAscii");
        self.check_save(workspace, path)
    }

    fn save_nexus(&mut self, workspace: &str, path: &Path) -> Result<(), ToolkitError> {
        self.record("SaveNexus");
        self.check_save(workspace, path)
    }
}
