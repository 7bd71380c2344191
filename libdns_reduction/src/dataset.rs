use std::fmt;

use super::constants::{BANK_TOLERANCE, DATAFILE_EXTENSION, DATASET_INDENT, DATASET_KEY_PADDING};
use super::file_selection::SelectedFile;

/// Kind of measurement a file belongs to, derived from its sample name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datatype {
    Vanadium,
    Calibration,
    Empty,
    Sample(String),
}

impl Datatype {
    /// Suffix used for standard datasets, None for ordinary samples
    pub fn suffix(&self) -> Option<&'static str> {
        match self {
            Self::Vanadium => Some("vana"),
            Self::Calibration => Some("nicr"),
            Self::Empty => Some("empty"),
            Self::Sample(_) => None,
        }
    }
}

/// Classify a sample name. Case-insensitive, first match wins.
pub fn classify(sample_name: &str) -> Datatype {
    let name = sample_name.to_lowercase();
    if name.contains("vana") {
        Datatype::Vanadium
    } else if name.contains("nicr") {
        Datatype::Calibration
    } else if name.contains("empty") || name.contains("leer") {
        Datatype::Empty
    } else {
        Datatype::Sample(sample_name.to_string())
    }
}

/// File numbers of a single bank, either literal or as a compact range
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileNumbers {
    List(Vec<u64>),
    /// `start..stop` (exclusive) with a positive `step`
    Range { start: u64, stop: u64, step: u64 },
}

impl FileNumbers {
    /// Expand to the individual file numbers
    pub fn numbers(&self) -> Vec<u64> {
        match self {
            Self::List(list) => list.clone(),
            Self::Range { start, stop, step } => (*start..*stop).step_by(*step as usize).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::List(list) => list.len(),
            Self::Range { start, stop, step } => ((stop - start) + step - 1) as usize / *step as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a file number, expanding a range back into a list
    pub fn push(&mut self, number: u64) {
        match self {
            Self::List(list) => list.push(number),
            Self::Range { .. } => {
                let mut list = self.numbers();
                list.push(number);
                *self = Self::List(list);
            }
        }
    }

    /// Replace an increasing arithmetic sequence of at least two numbers by a range.
    ///
    /// Single numbers and irregular lists stay literal; a range is returned as is.
    pub fn collapse(&self) -> Self {
        let list = match self {
            Self::List(list) => list,
            Self::Range { .. } => return self.clone(),
        };
        if list.len() < 2 || list[1] <= list[0] {
            return self.clone();
        }
        let step = list[1] - list[0];
        if list.windows(2).all(|pair| pair[1] > pair[0] && pair[1] - pair[0] == step) {
            Self::Range {
                start: list[0],
                stop: list[list.len() - 1] + step,
                step,
            }
        } else {
            self.clone()
        }
    }
}

impl fmt::Display for FileNumbers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List(list) => {
                let items: Vec<String> = list.iter().map(|number| number.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Self::Range { start, stop, step } => write!(f, "range({start}, {stop}, {step})"),
        }
    }
}

/// Files measured at one detector rotation
#[derive(Debug, Clone, PartialEq)]
pub struct Bank {
    pub det_rot: f64,
    pub files: FileNumbers,
}

/// All banks of one datatype together with the path prefix of its files
#[derive(Debug, Clone, PartialEq)]
pub struct DatatypeEntry {
    pub path: String,
    pub banks: Vec<Bank>,
}

impl DatatypeEntry {
    /// Banks ordered by ascending detector rotation
    pub fn sorted_banks(&self) -> Vec<&Bank> {
        let mut banks: Vec<&Bank> = self.banks.iter().collect();
        banks.sort_by(|a, b| a.det_rot.total_cmp(&b.det_rot));
        banks
    }
}

/// Return the angle of the existing bank closest to `det_rot` if it lies within the bank
/// tolerance, otherwise `det_rot` itself.
pub fn closest_bank_key(angles: impl IntoIterator<Item = f64>, det_rot: f64) -> f64 {
    angles
        .into_iter()
        .map(|angle| (angle, (angle - det_rot).abs()))
        .filter(|(_, diff)| *diff < BANK_TOLERANCE)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(angle, _)| angle)
        .unwrap_or(det_rot)
}

/// Path prefix of a datafile: `<root>/<file name up to its last underscore>`
pub fn datapath(entry: &SelectedFile, root: &str) -> String {
    let stem = entry
        .filename
        .strip_suffix(DATAFILE_EXTENSION)
        .unwrap_or(&entry.filename);
    let prefix = stem
        .rsplit_once('_')
        .map(|(prefix, _)| prefix)
        .unwrap_or("");
    if root.is_empty() {
        prefix.to_string()
    } else {
        format!("{}/{}", root.trim_end_matches('/'), prefix)
    }
}

/// Key of the datatype an entry is filed under.
///
/// Sample files are keyed by their sample name; standard files get the standard kind
/// appended so that vanadium and empty can measurements can be told apart.
pub fn datatype_key(entry: &SelectedFile, is_sample: bool) -> String {
    if is_sample {
        return entry.sample_name.clone();
    }
    match classify(&entry.sample_name).suffix() {
        Some(suffix) => format!("{}_{}", entry.sample_name, suffix),
        None => entry.sample_name.clone(),
    }
}

/// Selected files grouped by datatype and detector bank.
///
/// This is the data the reduction script iterates over: for each datatype the path
/// prefix of its files and, per detector rotation, the numbers of the files to merge.
/// Datatypes and banks keep their insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TofDataset {
    pub is_sample: bool,
    entries: Vec<(String, DatatypeEntry)>,
}

impl TofDataset {
    /// Group the files and collapse the file number lists
    pub fn new(data: &[SelectedFile], path: &str, is_sample: bool) -> Self {
        let mut dataset = Self::create_dataset(data, path, is_sample);
        dataset.collapse_ranges();
        dataset
    }

    /// Group the files without collapsing
    pub fn create_dataset(data: &[SelectedFile], path: &str, is_sample: bool) -> Self {
        let mut dataset = Self {
            is_sample,
            entries: Vec::new(),
        };
        for entry in data {
            let datatype = datatype_key(entry, is_sample);
            dataset.add(
                &datatype,
                entry.det_rot,
                entry.file_number,
                &datapath(entry, path),
            );
        }
        dataset
    }

    /// Add a file number to the bank closest to `det_rot`.
    ///
    /// `path` is only used when the datatype is new.
    pub fn add(&mut self, datatype: &str, det_rot: f64, file_number: u64, path: &str) {
        let position = match self.entries.iter().position(|(key, _)| key == datatype) {
            Some(position) => position,
            None => {
                self.entries.push((
                    datatype.to_string(),
                    DatatypeEntry {
                        path: path.to_string(),
                        banks: Vec::new(),
                    },
                ));
                self.entries.len() - 1
            }
        };
        let banks = &mut self.entries[position].1.banks;
        let key = closest_bank_key(banks.iter().map(|bank| bank.det_rot), det_rot);
        match banks.iter_mut().find(|bank| bank.det_rot == key) {
            Some(bank) => bank.files.push(file_number),
            None => banks.push(Bank {
                det_rot: key,
                files: FileNumbers::List(vec![file_number]),
            }),
        }
    }

    pub fn collapse_ranges(&mut self) {
        for (_, entry) in self.entries.iter_mut() {
            for bank in entry.banks.iter_mut() {
                bank.files = bank.files.collapse();
            }
        }
    }

    pub fn get(&self, datatype: &str) -> Option<&DatatypeEntry> {
        self.entries
            .iter()
            .find(|(key, _)| key == datatype)
            .map(|(_, entry)| entry)
    }

    pub fn datatypes(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of banks of a datatype, 0 if it is absent
    pub fn bank_count(&self, datatype: &str) -> usize {
        self.get(datatype).map(|entry| entry.banks.len()).unwrap_or(0)
    }

    pub fn sample_bank_count(&self) -> usize {
        self.bank_count(&self.sample_filename())
    }

    pub fn vana_bank_count(&self) -> usize {
        self.bank_count(&self.vana_filename())
    }

    pub fn empty_bank_count(&self) -> usize {
        self.bank_count(&self.empty_filename())
    }

    /// Sorted, de-duplicated detector rotations over all datatypes
    pub fn banks(&self) -> Vec<f64> {
        let mut banks: Vec<f64> = self
            .entries
            .iter()
            .flat_map(|(_, entry)| entry.banks.iter().map(|bank| bank.det_rot))
            .collect();
        banks.sort_by(|a, b| a.total_cmp(b));
        banks.dedup();
        banks
    }

    /// The first datatype, empty if there is none
    pub fn sample_filename(&self) -> String {
        self.entries
            .first()
            .map(|(key, _)| key.clone())
            .unwrap_or_default()
    }

    /// The only key carrying the vanadium suffix
    pub fn vana_filename(&self) -> String {
        self.unique_key(&Datatype::Vanadium)
    }

    /// The only key carrying the empty can suffix
    pub fn empty_filename(&self) -> String {
        self.unique_key(&Datatype::Empty)
    }

    /// The only key ending in `_<suffix>` of a standard, or an empty string if none or
    /// several do
    fn unique_key(&self, standard: &Datatype) -> String {
        let Some(suffix) = standard.suffix() else {
            return String::new();
        };
        let ending = format!("_{suffix}");
        let found: Vec<&String> = self
            .entries
            .iter()
            .map(|(key, _)| key)
            .filter(|key| key.ends_with(&ending))
            .collect();
        match found.as_slice() {
            [key] => (*key).clone(),
            _ => String::new(),
        }
    }

    fn max_key_length(&self) -> usize {
        self.entries
            .iter()
            .map(|(key, _)| key.chars().count())
            .max()
            .unwrap_or(0)
            + DATASET_KEY_PADDING
    }

    /// Render the dataset as the indented literal embedded in the reduction script
    pub fn format_dataset(&self) -> String {
        let indent = " ".repeat(self.max_key_length() + 1);
        let mut text = String::from("{");
        for (key, entry) in self.entries.iter() {
            let fields: Vec<String> = entry
                .banks
                .iter()
                .map(|bank| format!("{indent}{:.2}: {}", bank.det_rot, bank.files))
                .collect();
            text += &format!(
                "\n{}'{key}': {{'path': '{}',\n{}}},",
                " ".repeat(DATASET_INDENT),
                entry.path,
                fields.join(",\n")
            );
        }
        text += "\n}";
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn sample_data() -> Vec<SelectedFile> {
        vec![entry("4p1K_map", -9.0, 788058, "service")]
    }

    fn standard_data() -> Vec<SelectedFile> {
        vec![
            entry("vanadium", -9.0, 774714, "vana"),
            entry("vanadium", -9.02, 774715, "vana"),
            entry("empty", -9.0, 774716, "leer"),
            entry("empty", -5.0, 774717, "leer"),
        ]
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("Vanadium"), Datatype::Vanadium);
        assert_eq!(classify("vana_rod"), Datatype::Vanadium);
        assert_eq!(classify("NiCr"), Datatype::Calibration);
        assert_eq!(classify("Empty can"), Datatype::Empty);
        assert_eq!(classify("leer"), Datatype::Empty);
        assert_eq!(classify("4p1K_map"), Datatype::Sample(String::from("4p1K_map")));
        // first rule wins
        assert_eq!(classify("empty_vana"), Datatype::Vanadium);
    }

    #[test]
    fn test_create_dataset() {
        let dataset = TofDataset::new(&sample_data(), "a", true);
        let expected = DatatypeEntry {
            path: String::from("a/service"),
            banks: vec![Bank {
                det_rot: -9.0,
                files: FileNumbers::List(vec![788058]),
            }],
        };
        assert_eq!(dataset.get("4p1K_map"), Some(&expected));
        assert_eq!(dataset.banks(), vec![-9.0]);
        assert_eq!(dataset.get("4p1K_map").unwrap().banks[0].files.to_string(), "[788058]");
    }

    #[test]
    fn test_format_dataset() {
        let dataset = TofDataset::new(&sample_data(), "C:/123", true);
        assert_eq!(
            dataset.format_dataset(),
            "{\n     '4p1K_map': {'path': 'C:/123/service',\n                   -9.00: [788058]},\n}"
        );
    }

    #[test]
    fn test_max_key_length() {
        let dataset = TofDataset::new(&sample_data(), "C:/123", true);
        assert_eq!(dataset.max_key_length(), 18);
    }

    #[test]
    fn test_bank_tolerance() {
        let mut dataset = TofDataset::default();
        dataset.add("knso", -6.0, 1, "p");
        dataset.add("knso", -6.05, 2, "p");
        dataset.add("knso", -4.5, 3, "p");
        dataset.add("knso", -5.1, 4, "p");
        let banks = &dataset.get("knso").unwrap().banks;
        assert_eq!(banks.len(), 2);
        assert_eq!(banks[0].files, FileNumbers::List(vec![1, 2]));
        assert_eq!(banks[1].det_rot, -4.5);
        assert_eq!(banks[1].files, FileNumbers::List(vec![3, 4]));
    }

    #[test]
    fn test_closest_bank_key() {
        assert_eq!(closest_bank_key([0.0, 2.0], 2.01), 2.0);
        assert_eq!(closest_bank_key([0.0, 2.0], 0.1), 0.0);
        assert_eq!(closest_bank_key([0.0, 2.0], 3.5), 3.5);
        assert_eq!(closest_bank_key([0.0, 1.5], 0.9), 1.5);
        assert_eq!(closest_bank_key(Vec::new(), -9.0), -9.0);
    }

    #[test]
    fn test_add_or_create_filelist() {
        let mut dataset = TofDataset::default();
        dataset.add("knso", -5.0, 2, "C:/data");
        dataset.add("knso", -5.0, 3, "C:/data");
        dataset.add("knso", -5.0, 4, "C:/data");
        dataset.add("knso", 0.0, 788058, "ignored");
        dataset.add("knso", -5.005, 788058, "ignored");
        let entry = dataset.get("knso").unwrap();
        assert_eq!(entry.path, "C:/data");
        assert_eq!(entry.banks[0].files, FileNumbers::List(vec![2, 3, 4, 788058]));
        assert_eq!(entry.banks[1].det_rot, 0.0);
        assert_eq!(entry.banks[1].files, FileNumbers::List(vec![788058]));
        dataset.collapse_ranges();
        assert_eq!(
            dataset.get("knso").unwrap().banks[0].files.to_string(),
            "[2, 3, 4, 788058]"
        );
    }

    #[test]
    fn test_collapse() {
        let files = FileNumbers::List((0..9).collect());
        let collapsed = files.collapse();
        assert_eq!(collapsed.to_string(), "range(0, 9, 1)");
        assert_eq!(collapsed.collapse(), collapsed);
        assert_eq!(collapsed.numbers(), (0..9).collect::<Vec<u64>>());
        assert_eq!(collapsed.len(), 9);

        let stepped = FileNumbers::List(vec![10, 13, 16]).collapse();
        assert_eq!(stepped.to_string(), "range(10, 19, 3)");
        assert_eq!(stepped.len(), 3);

        for literal in [vec![788058], vec![1, 2, 4], vec![5, 4, 3], vec![7, 7]] {
            let files = FileNumbers::List(literal);
            assert_eq!(files.collapse(), files);
        }
    }

    #[test]
    fn test_push_expands_range() {
        let mut files = FileNumbers::List(vec![2, 3, 4]).collapse();
        files.push(788058);
        assert_eq!(files, FileNumbers::List(vec![2, 3, 4, 788058]));
        assert_eq!(files.collapse(), files);
    }

    #[test]
    fn test_standard_filenames() {
        let dataset = TofDataset::new(&standard_data(), "C:/123", false);
        assert_eq!(dataset.vana_filename(), "vanadium_vana");
        assert_eq!(dataset.empty_filename(), "empty_empty");
        assert_eq!(dataset.vana_bank_count(), 1);
        assert_eq!(dataset.empty_bank_count(), 2);
        assert_eq!(dataset.get("vanadium_vana").unwrap().path, "C:/123/vana");
        assert_eq!(dataset.banks(), vec![-9.0, -5.0]);

        let mut ambiguous = TofDataset::default();
        ambiguous.add("a_vana", 0.0, 1, "p");
        ambiguous.add("b_vana", 0.0, 2, "p");
        ambiguous.add("x_empty", 0.0, 3, "p");
        ambiguous.add("y_empty", 0.0, 4, "p");
        assert_eq!(ambiguous.vana_filename(), "");
        assert_eq!(ambiguous.empty_filename(), "");
        assert_eq!(ambiguous.vana_bank_count(), 0);
    }

    #[test]
    fn test_standard_filenames_match_suffix() {
        let standards = vec![
            entry("vana_empty_can", -9.0, 1, "vana"),
            entry("leer", -9.0, 2, "leer"),
        ];
        let dataset = TofDataset::new(&standards, "C:/123", false);
        assert_eq!(dataset.vana_filename(), "vana_empty_can_vana");
        assert_eq!(dataset.empty_filename(), "leer_empty");
        assert_eq!(dataset.empty_bank_count(), 1);

        let mut unsuffixed = TofDataset::default();
        unsuffixed.add("vana_run", 0.0, 1, "p");
        unsuffixed.add("_leer", 0.0, 2, "p");
        assert_eq!(unsuffixed.vana_filename(), "");
        assert_eq!(unsuffixed.empty_filename(), "");
    }

    #[test]
    fn test_datapath() {
        let file = entry("4p1K_map", -9.0, 788058, "service");
        assert_eq!(datapath(&file, "/root"), "/root/service");
        assert_eq!(datapath(&file, "/root/"), "/root/service");
        assert_eq!(datapath(&file, ""), "service");
        let nested = entry("knso", -9.0, 100, "knso_powder");
        assert_eq!(datapath(&nested, "data"), "data/knso_powder");
    }

    #[test]
    fn test_sample_filename() {
        let dataset = TofDataset::new(&sample_data(), "C:/123", true);
        assert_eq!(dataset.sample_filename(), "4p1K_map");
        assert_eq!(dataset.vana_filename(), "");
        assert_eq!(dataset.empty_filename(), "");
        assert_eq!(dataset.bank_count("4p1K_map"), 1);
        assert_eq!(dataset.bank_count("missing"), 0);
        assert_eq!(TofDataset::default().sample_filename(), "");
    }
}
