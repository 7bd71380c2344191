use ndarray::Array2;
use std::path::Path;
use std::str::FromStr;

use super::constants::*;
use super::error::DnsFileError;
use super::record_layout::{self as layout, ColumnSlice};

/// Coil currents in A, as listed in the B-fields block of a datafile
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Currents {
    pub flipper_precession: f64,
    pub flipper_z_compensation: f64,
    pub c_a: f64,
    pub c_b: f64,
    pub c_c: f64,
    pub c_z: f64,
}

/// A single DNS datafile.
///
/// The file is a fixed-layout text record: a metadata block where every value sits at a
/// known line and column (see [`record_layout`](super::record_layout)), followed by the
/// counts of every detector per TOF channel. Only the first 24 detectors are populated by
/// the TOF powder setup, so `counts` always has 24 rows.
#[derive(Debug, Clone, PartialEq)]
pub struct DnsFile {
    pub filename: String,
    pub users: String,
    pub proposal: String,
    pub filenumber: String,
    pub sample: String,
    pub mon_rot: f64,
    /// Incident wavelength in Angstrom (stored in nm on disk)
    pub wavelength: f64,
    pub energy: f64,
    pub speed: f64,
    pub det_rot: f64,
    pub sample_rot: f64,
    pub cradle_lo: f64,
    pub cradle_up: f64,
    pub ap_sam_y_upper: f64,
    pub ap_sam_y_lower: f64,
    pub ap_sam_x_left: f64,
    pub ap_sam_x_right: f64,
    pub pol_trans_x: f64,
    pub pol_trans_y: f64,
    pub pol_rot: f64,
    pub currents: Currents,
    pub temp_tube: f64,
    pub temp_samp: f64,
    pub temp_set: f64,
    pub tofchannels: usize,
    pub channelwidth: f64,
    pub tofdelay: f64,
    pub timer: f64,
    pub monitor: u64,
    pub starttime: String,
    pub endtime: String,
    pub scannumber: Option<u64>,
    pub scancommand: String,
    pub scanposition: String,
    /// Text after the `/` of the scan position, empty if there is none
    pub scanpoints: String,
    pub field: String,
    pub selector_lift: f64,
    pub selector_speed: f64,
    pub counts: Array2<u64>,
}

impl Default for DnsFile {
    fn default() -> Self {
        Self {
            filename: String::new(),
            users: String::new(),
            proposal: String::new(),
            filenumber: String::new(),
            sample: String::new(),
            mon_rot: 0.0,
            wavelength: 0.0,
            energy: 0.0,
            speed: 0.0,
            det_rot: 0.0,
            sample_rot: 0.0,
            cradle_lo: 0.0,
            cradle_up: 0.0,
            ap_sam_y_upper: 0.0,
            ap_sam_y_lower: 0.0,
            ap_sam_x_left: 0.0,
            ap_sam_x_right: 0.0,
            pol_trans_x: 0.0,
            pol_trans_y: 0.0,
            pol_rot: 0.0,
            currents: Currents::default(),
            temp_tube: 0.0,
            temp_samp: 0.0,
            temp_set: 0.0,
            tofchannels: 0,
            channelwidth: 0.0,
            tofdelay: 0.0,
            timer: 0.0,
            monitor: 0,
            starttime: String::new(),
            endtime: String::new(),
            scannumber: None,
            scancommand: String::new(),
            scanposition: String::new(),
            scanpoints: String::new(),
            field: String::new(),
            selector_lift: 0.0,
            selector_speed: 0.0,
            counts: Array2::zeros((NUMBER_OF_DETECTORS, 0)),
        }
    }
}

/// Field access on the lines of a datafile. Lines keep their terminator so that the
/// column offsets of the layout table apply unchanged.
struct FieldReader<'a> {
    lines: &'a [&'a str],
    file: &'a str,
}

impl<'a> FieldReader<'a> {
    fn text(&self, slice: ColumnSlice) -> &'a str {
        slice.extract(self.lines[slice.line])
    }

    fn parse<T: FromStr>(&self, slice: ColumnSlice) -> Result<T, DnsFileError> {
        let raw = self.text(slice);
        raw.trim().parse::<T>().map_err(|_| DnsFileError::BadField {
            file: self.file.to_string(),
            field: slice.name,
            value: raw.to_string(),
        })
    }

    fn token(&self, line: usize, index: usize, field: &'static str) -> Result<f64, DnsFileError> {
        let raw = self.lines[line].split_whitespace().nth(index).unwrap_or("");
        raw.parse::<f64>().map_err(|_| DnsFileError::BadField {
            file: self.file.to_string(),
            field,
            value: raw.to_string(),
        })
    }
}

/// Split `# DNS Data userid=<users>,exp=<proposal>,file=<number>,sample=<sample>`
fn parse_header(line: &str, file: &str) -> Result<[String; 4], DnsFileError> {
    let bad_header = || DnsFileError::BadHeader {
        file: file.to_string(),
    };
    let (_, rest) = line.split_once("userid=").ok_or_else(bad_header)?;
    let (users, rest) = rest.split_once(",exp=").ok_or_else(bad_header)?;
    let (proposal, rest) = rest.split_once(",file=").ok_or_else(bad_header)?;
    let (filenumber, rest) = rest.split_once(",sample=").ok_or_else(bad_header)?;
    let sample = rest.strip_suffix('\n').unwrap_or(rest);
    Ok([
        users.to_string(),
        proposal.to_string(),
        filenumber.to_string(),
        sample.to_string(),
    ])
}

impl DnsFile {
    /// Read the datafile `filename` in `datapath`.
    ///
    /// Returns `Ok(None)` if the file is not a DNS datafile (too short or missing the
    /// `# DNS Data` header). Errors are reserved for IO failures and for fields which
    /// cannot be parsed in a file that otherwise looks valid.
    pub fn read(datapath: &Path, filename: &str) -> Result<Option<Self>, DnsFileError> {
        let contents = std::fs::read_to_string(datapath.join(filename))?;
        Self::parse(&contents, filename)
    }

    /// Parse the text of a datafile, see [`DnsFile::read`]
    pub fn parse(contents: &str, filename: &str) -> Result<Option<Self>, DnsFileError> {
        let contents = contents.replace("\r\n", "\n");
        let lines: Vec<&str> = contents.split_inclusive('\n').collect();
        if lines.len() < MIN_FILE_LINES || !lines[layout::HEADER_LINE].starts_with(HEADER_TAG) {
            return Ok(None);
        }

        let reader = FieldReader {
            lines: &lines,
            file: filename,
        };
        let [users, proposal, filenumber, sample] =
            parse_header(lines[layout::HEADER_LINE], filename)?;

        let scanposition = reader.text(layout::SCAN_POSITION).trim().to_string();
        let scanpoints = scanposition.split('/').nth(1).unwrap_or("").to_string();
        let scannumber = match reader.text(layout::SCAN_NUMBER).trim() {
            "" => None,
            _ => Some(reader.parse(layout::SCAN_NUMBER)?),
        };
        let tofchannels: usize = reader.parse(layout::TOF_CHANNELS)?;

        // The header value is only trusted once every row has been checked against it
        let mut flat: Vec<u64> = Vec::new();
        for row in 0..NUMBER_OF_DETECTORS {
            let bad_row = || DnsFileError::BadCountsRow {
                file: filename.to_string(),
                row,
                expected: tofchannels,
            };
            let values = lines[layout::DATA_START_LINE + row]
                .split_whitespace()
                .skip(1) // detector index
                .map(|value| value.parse::<u64>())
                .collect::<Result<Vec<u64>, _>>()
                .map_err(|_| bad_row())?;
            if values.len() != tofchannels {
                return Err(bad_row());
            }
            flat.extend(values);
        }
        let shape = (NUMBER_OF_DETECTORS, tofchannels);
        let counts = Array2::from_shape_vec(shape, flat)
            .map_err(|_| DnsFileError::BadCountsShape(shape, NUMBER_OF_DETECTORS))?;

        Ok(Some(Self {
            filename: filename.to_string(),
            users,
            proposal,
            filenumber,
            sample,
            mon_rot: reader.parse(layout::MON_ROT)?,
            wavelength: reader.token(
                layout::MONOCHROMATOR_LINE,
                layout::MONOCHROMATOR_WAVELENGTH_TOKEN,
                "wavelength",
            )? * 10.0,
            energy: reader.token(
                layout::MONOCHROMATOR_LINE,
                layout::MONOCHROMATOR_ENERGY_TOKEN,
                "energy",
            )?,
            speed: reader.token(
                layout::MONOCHROMATOR_LINE,
                layout::MONOCHROMATOR_SPEED_TOKEN,
                "speed",
            )?,
            det_rot: reader.parse(layout::DET_ROT)?,
            sample_rot: reader.parse(layout::SAMPLE_ROT)?,
            cradle_lo: reader.parse(layout::CRADLE_LO)?,
            cradle_up: reader.parse(layout::CRADLE_UP)?,
            ap_sam_y_upper: reader.parse(layout::AP_SAM_Y_UPPER)?,
            ap_sam_y_lower: reader.parse(layout::AP_SAM_Y_LOWER)?,
            ap_sam_x_left: reader.parse(layout::AP_SAM_X_LEFT)?,
            ap_sam_x_right: reader.parse(layout::AP_SAM_X_RIGHT)?,
            pol_trans_x: reader.parse(layout::POL_TRANS_X)?,
            pol_trans_y: reader.parse(layout::POL_TRANS_Y)?,
            pol_rot: reader.parse(layout::POL_ROT)?,
            currents: Currents {
                flipper_precession: reader.parse(layout::FLIPPER_PRECESSION)?,
                flipper_z_compensation: reader.parse(layout::FLIPPER_Z_COMPENSATION)?,
                c_a: reader.parse(layout::C_A)?,
                c_b: reader.parse(layout::C_B)?,
                c_c: reader.parse(layout::C_C)?,
                c_z: reader.parse(layout::C_Z)?,
            },
            temp_tube: reader.parse(layout::TEMP_TUBE)?,
            temp_samp: reader.parse(layout::TEMP_SAMP)?,
            temp_set: reader.parse(layout::TEMP_SET)?,
            tofchannels,
            channelwidth: reader.parse(layout::CHANNEL_WIDTH)?,
            tofdelay: reader.parse(layout::TOF_DELAY)?,
            timer: reader.parse(layout::TIMER)?,
            monitor: reader.parse(layout::MONITOR)?,
            starttime: reader.text(layout::START_TIME).to_string(),
            endtime: reader.text(layout::END_TIME).to_string(),
            scannumber,
            scancommand: reader.text(layout::SCAN_COMMAND).to_string(),
            scanposition,
            scanpoints,
            field: reader.text(layout::FIELD).trim().to_string(),
            selector_lift: reader.parse(layout::SELECTOR_LIFT)?,
            selector_speed: reader.parse(layout::SELECTOR_SPEED)?,
            counts,
        }))
    }

    /// Write the record to `filename` in `datapath`. The directory must already exist.
    pub fn write(&self, datapath: &Path, filename: &str) -> Result<(), DnsFileError> {
        let txt = self.to_text()?;
        std::fs::write(datapath.join(filename), txt)?;
        Ok(())
    }

    /// Render the record in the layout of the instrument software.
    ///
    /// Values are written with the fixed precision of the format, so reading the text back
    /// yields the values rounded to that precision.
    pub fn to_text(&self) -> Result<String, DnsFileError> {
        let expected = (NUMBER_OF_DETECTORS, self.tofchannels);
        if self.counts.dim() != expected {
            return Err(DnsFileError::BadCountsShape(
                self.counts.dim(),
                NUMBER_OF_DETECTORS,
            ));
        }

        let separator = format!("#{}\n", "-".repeat(SEPARATOR_WIDTH));
        let wavelength = self.wavelength / 10.0; // nm on disk
        let mut txt = String::new();
        txt += &format!(
            "{HEADER_TAG} userid={},exp={},file={},sample={}\n",
            self.users, self.proposal, self.filenumber, self.sample
        );
        txt += &separator;

        txt += "# 2\n";
        txt += &format!("# User: {}\n", self.users);
        txt += &format!("# Sample: {}\n", self.sample);
        txt += &separator;

        txt += "# DNS   Mono  d-spacing[nm]  Theta[deg]   Lambda[nm]   Energy[meV]   Speed[m/sec]\n";
        txt += &format!(
            "#      {}   {:6.4}         {:6.2}         {:6.3}{:6.3}      {:7.2}\n",
            MONOCHROMATOR_NAME,
            MONOCHROMATOR_D_SPACING,
            self.mon_rot,
            wavelength,
            self.energy,
            self.speed
        );
        txt += "# Distances [cm] Sample_Chopper    Sample_Detector    Sample_Monochromator\n";
        txt += "#                  36.00            80.00            220.00\n";
        txt += &separator;

        txt += "# Motors                      Position\n";
        txt += &format!("# Monochromator              {:6.2} deg\n", self.mon_rot);
        txt += &format!("# DeteRota                   {:6.2} deg\n", self.det_rot);
        txt += "#\n";
        txt += &format!("# Huber                      {:6.2} deg\n", self.sample_rot);
        txt += &format!("# Cradle_lower               {:6.2} deg\n", self.cradle_lo);
        txt += &format!("# Cradle_upper               {:6.2} deg\n", self.cradle_up);
        txt += "#\n";
        txt += &format!("# Slit_i_vertical upper      {:6.1} mm\n", self.ap_sam_y_upper);
        txt += &format!("#                 lower      {:6.1} mm\n", self.ap_sam_y_lower);
        txt += &format!("# Slit_i_horizontal left     {:6.1} mm\n", self.ap_sam_x_left);
        txt += &format!("#                   right    {:6.1} mm\n", self.ap_sam_x_right);
        txt += "#\n";
        // Slits and detector height are not recorded by the TOF setup
        txt += &format!("# Slit_f_upper                {:4} mm\n", 0);
        txt += &format!("# Slit_f_lower                {:4} mm\n", 0);
        txt += &format!("# Detector_Position_vertical  {:4} mm\n", 0);
        txt += "#\n";
        txt += "# Polariser\n";
        txt += &format!(
            "#    Translation              {:4} mm\n",
            self.pol_trans_x.round_ties_even() as i64
        );
        txt += &format!("#    Rotation              {:6.2} deg\n", self.pol_rot);
        txt += "#\n";
        txt += "# Analysers                 undefined\n";
        txt += &separator;

        txt += "# B-fields                   current[A]  field[G]\n";
        let currents = [
            ("Flipper_precession    ", self.currents.flipper_precession),
            ("Flipper_z_compensation", self.currents.flipper_z_compensation),
            ("C_a                   ", self.currents.c_a),
            ("C_b                   ", self.currents.c_b),
            ("C_c                   ", self.currents.c_c),
            ("C_z                   ", self.currents.c_z),
        ];
        for (coil, current) in currents {
            txt += &format!("#   {coil}    {current:6.3} A     {:6.2} G\n", 0.0);
        }
        txt += &separator;

        txt += "# Temperatures/Lakeshore      T\n";
        txt += &format!("#  T1                         {:6.3} K\n", self.temp_tube);
        txt += &format!("#  T2                         {:6.3} K\n", self.temp_samp);
        txt += &format!("#  sample_setpoint            {:6.3} K\n", self.temp_set);
        txt += &separator;

        txt += "# TOF parameters\n";
        txt += &format!("#  TOF channels                {:4}\n", self.tofchannels);
        txt += &format!(
            "#  Time per channel            {:6.1} microsecs\n",
            self.channelwidth
        );
        txt += &format!(
            "#  Delay time                  {:6.1} microsecs\n",
            self.tofdelay
        );
        txt += "#  Chopper slits\n";
        txt += "#  Elastic time channel\n";
        txt += "#  Chopper frequency\n";
        txt += &separator;

        txt += "# Active_Stop_Unit           TIMER\n";
        txt += &format!("#  Timer                    {:6.1} sec\n", self.timer);
        txt += &format!("#  Monitor           {:16}\n", self.monitor);
        txt += "#\n";
        txt += &format!("#    start   at      {}\n", self.starttime);
        txt += &format!("#    stopped at      {}\n", self.endtime);
        txt += &separator;

        txt += "# Extended data\n";
        match self.scannumber {
            Some(number) => txt += &format!("#  Scannumber               {number:8}\n"),
            None => txt += "#  Scannumber                       \n",
        }
        txt += &format!("#  Scancommand              {}\n", self.scancommand);
        txt += &format!("#  Scanposition             {:>8}\n", self.scanposition);
        txt += &format!("#  pol_trans_x              {:8.1} mm\n", self.pol_trans_x);
        txt += &format!("#  pol_trans_y              {:8.1} mm\n", self.pol_trans_y);
        txt += &format!("#  field                    {:>8}\n", self.field);
        txt += &format!("#  selector_lift            {:8.1} mm\n", self.selector_lift);
        txt += &format!("#  selector_speed           {:8.1} rpm\n", self.selector_speed);
        txt += &separator;

        txt += "# DATA (number of detectors, number of TOF channels)\n";
        txt += &format!("# {NUMBER_OF_CHANNELS} {:4}\n", self.tofchannels);
        for channel in 0..NUMBER_OF_CHANNELS {
            txt += &format!("{channel:2} ");
            for tof in 0..self.tofchannels {
                let count = if channel < NUMBER_OF_DETECTORS {
                    self.counts[[channel, tof]]
                } else {
                    0
                };
                txt += &format!(" {count:8}");
            }
            txt += "\n";
        }
        Ok(txt)
    }
}
