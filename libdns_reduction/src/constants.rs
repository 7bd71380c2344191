// DNS datafile format
pub const HEADER_TAG: &str = "# DNS Data";
pub const MIN_FILE_LINES: usize = 138;
pub const SEPARATOR_WIDTH: usize = 74;
/// Detectors populated by the TOF powder configuration
pub const NUMBER_OF_DETECTORS: usize = 24;
/// Physical detector channels written to a datafile
pub const NUMBER_OF_CHANNELS: usize = 64;
pub const DATAFILE_EXTENSION: &str = ".d_dat";

// Fixed instrument values written into every datafile header
pub const MONOCHROMATOR_NAME: &str = "PG-002";
pub const MONOCHROMATOR_D_SPACING: f64 = 0.3350;

// Instrument geometry
/// E = h²/(2 m λ²) in meV for λ in Å
pub const ENERGY_WAVELENGTH_FACTOR: f64 = 81.80420235;
/// v = h/(m λ) in m/s for λ in Å
pub const SPEED_WAVELENGTH_FACTOR: f64 = 3956.034;
/// Sample to detector flight path in m
pub const FLIGHT_PATH: f64 = 0.8;
/// Scattering angle between neighbouring detectors in degrees
pub const DETECTOR_SPACING: f64 = 5.0;

// Bank aggregation
/// Angles closer than this (degrees) share a bank
pub const BANK_TOLERANCE: f64 = 1.0;
/// Indentation of the datatype keys inside a rendered dataset
pub const DATASET_INDENT: usize = 5;
/// Characters surrounding a datatype key on its rendered line: indent, quotes and `: {`
pub const DATASET_KEY_PADDING: usize = 10;

// Script execution
pub const CANCEL_MESSAGE: &str = "Warning script execution stopped, no valid data.";
pub const DEFAULT_SCRIPT_NAME: &str = "script.py";
pub const SCRIPT_EXTENSION: &str = ".py";
pub const SAMPLE_LOGS_SUM: &str = "mon_sum,duration";
pub const SAMPLE_LOGS_TIME_SERIES: &str = "deterota,T1,T2,Tsp";
