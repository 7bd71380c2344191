use std::path::{Path, PathBuf};

use super::constants::{DATAFILE_EXTENSION, DEFAULT_SCRIPT_NAME, SCRIPT_EXTENSION};
use super::dns_file::DnsFile;
use super::error::FileProcessingError;

/// Parse the file number of a `<prefix>_<number>.d_dat` file name
pub fn file_number(filename: &str) -> Option<u64> {
    let stem = filename.strip_suffix(DATAFILE_EXTENSION)?;
    let (_, number) = stem.rsplit_once('_')?;
    number.parse::<u64>().ok()
}

/// Names of all datafiles in a directory, sorted by file number.
///
/// Only names of the form `<prefix>_<number>.d_dat` are returned. A missing directory
/// gives an empty list.
pub fn list_datafiles(dir: &Path) -> Result<Vec<String>, FileProcessingError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names: Vec<(u64, String)> = Vec::new();
    for item in dir.read_dir()? {
        let item = item?;
        if !item.file_type()?.is_file() {
            continue;
        }
        let name = item.file_name().to_string_lossy().to_string();
        if let Some(number) = file_number(&name) {
            names.push((number, name));
        }
    }
    names.sort();
    Ok(names.into_iter().map(|(_, name)| name).collect())
}

/// Keep the file names whose number lies in `first..=last`
pub fn filter_filenames(filenames: &[String], first: u64, last: u64) -> Vec<String> {
    filenames
        .iter()
        .filter(|name| file_number(name).is_some_and(|number| number >= first && number <= last))
        .cloned()
        .collect()
}

/// Script file name with the `.py` extension, `script.py` if none was given
pub fn get_filename(filename: &str) -> String {
    if filename.is_empty() {
        String::from(DEFAULT_SCRIPT_NAME)
    } else if filename.ends_with(SCRIPT_EXTENSION) {
        filename.to_string()
    } else {
        format!("{filename}{SCRIPT_EXTENSION}")
    }
}

/// Write a script into `script_dir`, creating the directory if needed.
///
/// Returns the path of the written file.
pub fn save_script(
    script: &str,
    filename: &str,
    script_dir: &Path,
) -> Result<PathBuf, FileProcessingError> {
    std::fs::create_dir_all(script_dir)?;
    let path = script_dir.join(filename);
    std::fs::write(&path, script)?;
    Ok(path)
}

/// Users and proposal number of the first datafile in a directory.
///
/// Empty strings if the directory holds no readable datafile.
pub fn user_and_proposal(dir: &Path) -> Result<(String, String), FileProcessingError> {
    let names = list_datafiles(dir)?;
    match names.first() {
        Some(name) => Ok(DnsFile::read(dir, name)?
            .map(|file| (file.users, file.proposal))
            .unwrap_or_default()),
        None => Ok((String::new(), String::new())),
    }
}
