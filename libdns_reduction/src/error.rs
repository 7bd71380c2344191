use std::path::PathBuf;
use thiserror::Error;

use super::constants::CANCEL_MESSAGE;
use super::run_status::ScriptStatus;

#[derive(Debug, Error)]
pub enum DnsFileError {
    #[error("DnsFile failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("DnsFile {file} has a malformed header line")]
    BadHeader { file: String },
    #[error("DnsFile {file} could not parse field {field} from {value:?}")]
    BadField {
        file: String,
        field: &'static str,
        value: String,
    },
    #[error("DnsFile {file} has a malformed counts row for detector {row}; expected {expected} TOF channels")]
    BadCountsRow {
        file: String,
        row: usize,
        expected: usize,
    },
    #[error("DnsFile counts table has shape {0:?}; expected {1} rows")]
    BadCountsShape((usize, usize), usize),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Config has an invalid run range: first run {0} is after last run {1}")]
    BadRunRange(u64, u64),
}

#[derive(Debug, Error)]
pub enum FileProcessingError {
    #[error("File processing failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("File processing failed to read a datafile: {0}")]
    FileError(#[from] DnsFileError),
}

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("FileSelection failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("FileSelection failed to read a datafile: {0}")]
    FileError(#[from] DnsFileError),
    #[error("FileSelection failed to list datafiles: {0}")]
    ListingError(#[from] FileProcessingError),
    #[error("FileSelection could not parse a file number from {0}")]
    BadFileNumber(String),
    #[error("FileSelection found no datafiles for runs {0} to {1} in {2:?}")]
    NoMatchingFiles(u64, u64, PathBuf),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolkitError {
    #[error("Datafile {0:?} does not exist")]
    MissingFile(PathBuf),
    #[error("Datafile {0:?} is not a DNS datafile")]
    NotDnsFile(PathBuf),
    #[error("Could not read datafile {0:?}: {1}")]
    UnreadableFile(PathBuf, String),
    #[error("Workspace {0} does not exist")]
    MissingWorkspace(String),
    #[error("Workspace {0} has no entry {1}")]
    MissingEntry(String, usize),
    #[error("Workspace {0} has no sample log {1}")]
    MissingLog(String, String),
    #[error("Workspace {0} is not a matrix workspace")]
    NotMatrixWorkspace(String),
    #[error("Workspace {0} is not a table workspace")]
    NotTableWorkspace(String),
    #[error("Workspace {0} is not an MD workspace")]
    NotMdWorkspace(String),
    #[error("Workspace groups {0} and {1} differ in size")]
    GroupSizeMismatch(String, String),
    #[error("Could not write {0:?}: {1}")]
    SaveFailed(PathBuf, String),
    #[error("Invalid binning for {0}: range {1} to {2} with step {3}")]
    InvalidBinning(String, f64, f64, f64),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepError {
    #[error("{0}")]
    Toolkit(#[from] ToolkitError),
    #[error("Variable {0} is not defined")]
    UndefinedVariable(String),
    #[error("Variable {0} does not hold a {1}")]
    WrongKind(String, &'static str),
    #[error("Dataset has no entry {0}")]
    MissingDatatype(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RunnerError {
    #[error("{0}")]
    Execution(#[from] StepError),
    #[error("{msg}", msg=CANCEL_MESSAGE)]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to FileSelection error: {0}")]
    SelectionError(#[from] SelectionError),
    #[error("Processor failed due to file processing error: {0}")]
    FileProcessingError(#[from] FileProcessingError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<ScriptStatus>),
    #[error("Processor failed due to IO error: {0}")]
    IoError(#[from] std::io::Error),
}
