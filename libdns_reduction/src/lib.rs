//! # dns_reduction
//!
//! dns_reduction generates and runs data reduction scripts for time-of-flight (TOF)
//! powder measurements at the DNS spectrometer, written in Rust. It reads the ASCII
//! `.d_dat` files written by the DNS data acquisition, groups the selected sample and
//! standard measurements by datatype and detector bank, and writes a reduction script
//! which turns them into S(q,ω).
//!
//! ## Installation
//!
//! Currently the only method of install is from source.
//!
//! ### Rust
//!
//! If you have not used Rust before, you will most likely need to install the Rust tool
//! chain. See the [Rust docs](https://www.rust-lang.org/tools/install) for installation
//! instructions.
//!
//! ### Building & Install
//!
//! To build and install the CLI use `cargo install --path ./dns_reduction_cli` from the
//! top level repository. The binary will be installed to your cargo install location
//! (typically something like `~/.cargo/bin/`).
//!
//! ## Configuration
//!
//! A reduction is described by a YAML configuration file. A template can be made with
//! `dns_reduction_cli new -p config.yml`. The format is as follows:
//!
//! ```yml
//! paths:
//!   data_dir: None
//!   standards_dir: None
//!   export_dir: ''
//!   script_dir: None
//!   ascii: false
//!   nexus: false
//!   export: false
//! options:
//!   wavelength: 0.0
//!   get_wavelength: true
//!   epp_channel: 0
//!   delete_raw: true
//!   qmin: 0.0
//!   qmax: 3.0
//!   qstep: 0.025
//!   dEmin: -3.0
//!   dEmax: 3.0
//!   dEstep: 0.05
//!   corrections: true
//!   det_efficency: true
//!   mask_bad_detectors: true
//!   substract_vana_back: true
//!   substract_sample_back: true
//!   vana_back_factor: 1.0
//!   sample_back_factor: 1.0
//!   vanadium_temperature: 295.0
//!   norm_monitor: true
//!   correct_elastic_peak_position: false
//! sample_runs:
//!   first: 0
//!   last: 0
//! standard_runs: null
//! script_name: ''
//! ```
//!
//! - `data_dir`: directory with the sample datafiles, named `<prefix>_<number>.d_dat`
//! - `standards_dir`: directory with the vanadium, empty can and NiCr measurements. They
//! are only read when `corrections` is set. Set `standard_runs` to restrict the standard
//! files to a run range; `null` takes every file.
//! - `export_dir`: where the reduced S(q,ω) is written when `export` is set, as ASCII
//! (`ascii`) and/or NeXus (`nexus`)
//! - `script_dir` and `script_name`: where the generated script is saved (`.py` is
//! appended, an empty name gives `script.py`)
//! - `sample_runs`: first and last sample run number (inclusive)
//! - `qstep` / `dEstep`: a step of 0 estimates the whole q and energy binning from the
//! detector angles, wavelength and TOF settings of the selected sample files
//!
//! Standard measurements are recognized by their sample name: names containing `vana` are
//! vanadium, `nicr` is NiCr and `empty` or `leer` is the empty can. Their datatype keys end
//! in `_vana`, `_nicr` and `_empty`.
//!
//! ## Output
//!
//! The generated script is plain text and is always saved, even if the options fail
//! validation (a warning is logged instead). It can be run through the [`script_runner`]
//! against any [`toolkit::Toolkit`]; the bundled [`toolkit::DryRunToolkit`] checks that
//! every datafile exists and every workspace is defined, without doing the physics.
//! Front ends embedding the library can stop a run between steps with a
//! [`script_runner::CancelToken`]; the CLI always runs a script to completion.
pub mod binning_estimate;
pub mod config;
pub mod constants;
pub mod dataset;
pub mod dns_file;
pub mod dnstof;
pub mod error;
pub mod file_processing;
pub mod file_selection;
pub mod process;
pub mod record_layout;
pub mod run_status;
pub mod script;
pub mod script_generator;
pub mod script_runner;
pub mod toolkit;
