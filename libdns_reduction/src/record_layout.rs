//! The positional layout of a DNS datafile.
//!
//! Every metadata field of a datafile lives at a fixed line and column. The values below
//! are the single source of those offsets; a change of the instrument software format
//! should only touch this file.

/// Location of a field within a datafile.
///
/// `line` is the 0-based line index, `start` the first character column and `strip` the
/// number of trailing characters (unit suffix and line terminator) dropped from the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSlice {
    pub name: &'static str,
    pub line: usize,
    pub start: usize,
    pub strip: usize,
}

impl ColumnSlice {
    const fn new(name: &'static str, line: usize, start: usize, strip: usize) -> Self {
        Self {
            name,
            line,
            start,
            strip,
        }
    }

    /// Cut the field out of a line which still carries its terminator.
    ///
    /// Columns count characters, not bytes. A slice reaching past either end of the line
    /// yields an empty string.
    pub fn extract<'a>(&self, line: &'a str) -> &'a str {
        let n_chars = line.chars().count();
        let end = n_chars.saturating_sub(self.strip);
        if self.start >= end {
            return "";
        }
        &line[byte_offset(line, self.start)..byte_offset(line, end)]
    }
}

fn byte_offset(line: &str, char_index: usize) -> usize {
    line.char_indices()
        .nth(char_index)
        .map(|(idx, _)| idx)
        .unwrap_or(line.len())
}

/// `# DNS Data userid=...,exp=...,file=...,sample=...`
pub const HEADER_LINE: usize = 0;
/// Monochromator summary; whitespace separated rather than column sliced
pub const MONOCHROMATOR_LINE: usize = 7;
pub const MONOCHROMATOR_WAVELENGTH_TOKEN: usize = 4;
pub const MONOCHROMATOR_ENERGY_TOKEN: usize = 5;
pub const MONOCHROMATOR_SPEED_TOKEN: usize = 6;
/// First line of the counts table
pub const DATA_START_LINE: usize = 74;

// Motors
pub const MON_ROT: ColumnSlice = ColumnSlice::new("mon_rot", 12, 25, 5);
pub const DET_ROT: ColumnSlice = ColumnSlice::new("det_rot", 13, 25, 5);
pub const SAMPLE_ROT: ColumnSlice = ColumnSlice::new("sample_rot", 15, 25, 5);
pub const CRADLE_LO: ColumnSlice = ColumnSlice::new("cradle_lo", 16, 25, 5);
pub const CRADLE_UP: ColumnSlice = ColumnSlice::new("cradle_up", 17, 25, 5);
pub const AP_SAM_Y_UPPER: ColumnSlice = ColumnSlice::new("ap_sam_y_upper", 19, 25, 4);
pub const AP_SAM_Y_LOWER: ColumnSlice = ColumnSlice::new("ap_sam_y_lower", 20, 25, 4);
pub const AP_SAM_X_LEFT: ColumnSlice = ColumnSlice::new("ap_sam_x_left", 21, 25, 4);
pub const AP_SAM_X_RIGHT: ColumnSlice = ColumnSlice::new("ap_sam_x_right", 22, 25, 4);
pub const POL_ROT: ColumnSlice = ColumnSlice::new("pol_rot", 30, 25, 4);

// Coil currents
pub const FLIPPER_PRECESSION: ColumnSlice = ColumnSlice::new("Co", 35, 25, 16);
pub const FLIPPER_Z_COMPENSATION: ColumnSlice = ColumnSlice::new("Fi", 36, 27, 16);
pub const C_A: ColumnSlice = ColumnSlice::new("A", 37, 25, 16);
pub const C_B: ColumnSlice = ColumnSlice::new("B", 38, 25, 16);
pub const C_C: ColumnSlice = ColumnSlice::new("C", 39, 25, 16);
pub const C_Z: ColumnSlice = ColumnSlice::new("ZT", 40, 25, 16);

// Temperatures
pub const TEMP_TUBE: ColumnSlice = ColumnSlice::new("temp_tube", 43, 25, 3);
pub const TEMP_SAMP: ColumnSlice = ColumnSlice::new("temp_samp", 44, 25, 3);
pub const TEMP_SET: ColumnSlice = ColumnSlice::new("temp_set", 45, 25, 3);

// TOF parameters
pub const TOF_CHANNELS: ColumnSlice = ColumnSlice::new("tofchannels", 48, 25, 1);
pub const CHANNEL_WIDTH: ColumnSlice = ColumnSlice::new("channelwidth", 49, 25, 11);
pub const TOF_DELAY: ColumnSlice = ColumnSlice::new("tofdelay", 50, 25, 11);

// Counting
pub const TIMER: ColumnSlice = ColumnSlice::new("timer", 56, 15, 5);
pub const MONITOR: ColumnSlice = ColumnSlice::new("monitor", 57, 15, 1);
pub const START_TIME: ColumnSlice = ColumnSlice::new("starttime", 59, 21, 1);
pub const END_TIME: ColumnSlice = ColumnSlice::new("endtime", 60, 21, 1);

// Extended data
pub const SCAN_NUMBER: ColumnSlice = ColumnSlice::new("scannumber", 63, 15, 1);
pub const SCAN_COMMAND: ColumnSlice = ColumnSlice::new("scancommand", 64, 28, 1);
pub const SCAN_POSITION: ColumnSlice = ColumnSlice::new("scanposition", 65, 15, 1);
pub const POL_TRANS_X: ColumnSlice = ColumnSlice::new("pol_trans_x", 66, 15, 4);
pub const POL_TRANS_Y: ColumnSlice = ColumnSlice::new("pol_trans_y", 67, 15, 4);
pub const FIELD: ColumnSlice = ColumnSlice::new("field", 68, 10, 1);
pub const SELECTOR_LIFT: ColumnSlice = ColumnSlice::new("selector_lift", 69, 17, 4);
pub const SELECTOR_SPEED: ColumnSlice = ColumnSlice::new("selector_speed", 70, 17, 4);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_strips_unit_suffix() {
        let line = "# DeteRota                    -7.01 deg\n";
        assert_eq!(DET_ROT.extract(line).trim(), "-7.01");
    }

    #[test]
    fn test_extract_out_of_range() {
        assert_eq!(DET_ROT.extract("# short\n"), "");
        assert_eq!(FIELD.extract(""), "");
    }

    #[test]
    fn test_extract_counts_characters() {
        let line = "#  field                       x7_ßf\n";
        assert_eq!(FIELD.extract(line).trim(), "x7_ßf");
    }
}
