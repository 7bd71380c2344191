use std::f64::consts::PI;

use super::constants::{
    DETECTOR_SPACING, ENERGY_WAVELENGTH_FACTOR, FLIGHT_PATH, NUMBER_OF_DETECTORS,
    SPEED_WAVELENGTH_FACTOR,
};
use super::file_selection::SelectedFile;
use super::script::Binning;

/// q step of an estimated binning in Å⁻¹
const ESTIMATED_QSTEP: f64 = 0.025;
/// Smallest estimated energy step in meV
const MIN_ESTIMATED_DE_STEP: f64 = 0.001;

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Momentum transfer in Å⁻¹ of elastic scattering at `two_theta` degrees
fn elastic_q(two_theta: f64, wavelength: f64) -> f64 {
    4.0 * PI / wavelength * (two_theta.to_radians() / 2.0).sin()
}

/// Estimate the S(q,ω) binning covered by the sample files at `wavelength` (Å).
///
/// The q range runs from the first detector at the smallest bank angle to the last detector
/// at the largest one. The energy step is the width of one TOF channel at the elastic line
/// and the energy range is the TOF window centred on the elastic time, limited to neutrons
/// gaining at most three times the incident energy. The TOF settings are taken from the first
/// file.
///
/// Returns `None` without files, or when the wavelength or the TOF window is empty.
pub fn estimate_binning(files: &[SelectedFile], wavelength: f64) -> Option<Binning> {
    let first = files.first()?;
    if !(wavelength > 0.0 && first.channelwidth > 0.0 && first.tofchannels > 0) {
        return None;
    }

    let (smallest, largest) = files
        .iter()
        .map(|file| file.det_rot.abs())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), angle| {
            (lo.min(angle), hi.max(angle))
        });
    let last_detector = (NUMBER_OF_DETECTORS - 1) as f64 * DETECTOR_SPACING;
    let two_theta_max = (largest + last_detector).min(180.0);
    let qmin = (elastic_q(smallest, wavelength) / ESTIMATED_QSTEP).floor() * ESTIMATED_QSTEP;
    let qmax = (elastic_q(two_theta_max, wavelength) / ESTIMATED_QSTEP).ceil() * ESTIMATED_QSTEP;

    let incident_energy = ENERGY_WAVELENGTH_FACTOR / wavelength.powi(2);
    // In microseconds, like the channel width
    let elastic_time = FLIGHT_PATH / (SPEED_WAVELENGTH_FACTOR / wavelength) * 1.0e6;
    let de_step = round_to(
        2.0 * incident_energy * first.channelwidth / elastic_time,
        3,
    )
    .max(MIN_ESTIMATED_DE_STEP);

    let final_energy = |time: f64| incident_energy * (elastic_time / time).powi(2);
    let half_window = first.tofchannels as f64 * first.channelwidth / 2.0;
    let fastest = (elastic_time - half_window).max(elastic_time / 2.0);
    let slowest = elastic_time + half_window;
    let de_min = ((incident_energy - final_energy(fastest)) / de_step).floor() * de_step;
    let de_max = ((incident_energy - final_energy(slowest)) / de_step).ceil() * de_step;

    Some(Binning {
        qmin: round_to(qmin, 3),
        qmax: round_to(qmax, 3),
        qstep: ESTIMATED_QSTEP,
        de_min: round_to(de_min, 3),
        de_max: round_to(de_max, 3),
        de_step,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selected(det_rot: f64, channelwidth: f64, tofchannels: usize) -> SelectedFile {
        SelectedFile {
            file_number: 1,
            det_rot,
            sample_name: String::from("knso"),
            filename: String::from("knso_000001.d_dat"),
            wavelength: 4.74,
            channelwidth,
            tofchannels,
        }
    }

    fn assert_close(value: f64, expected: f64) {
        assert!((value - expected).abs() < 1e-9, "{value} != {expected}");
    }

    #[test]
    fn test_estimate_binning() {
        let files = [
            selected(-9.0, 1.6, 100),
            selected(-5.0, 1.6, 100),
            selected(-4.98, 1.6, 100),
        ];
        let binning = estimate_binning(&files, 4.74).unwrap();
        assert!(binning.is_valid());
        assert_close(binning.qmin, 0.1);
        assert_close(binning.qmax, 2.35);
        assert_close(binning.qstep, 0.025);
        assert_close(binning.de_min, -0.696);
        assert_close(binning.de_max, 0.54);
        assert_close(binning.de_step, 0.012);
    }

    #[test]
    fn test_estimate_wide_window() {
        // The window reaches past half the elastic time, so energy gain is capped
        let binning = estimate_binning(&[selected(-20.0, 10.0, 1000)], 2.0).unwrap();
        let incident_energy = ENERGY_WAVELENGTH_FACTOR / 4.0;
        assert_close(binning.qmin, 1.075);
        assert_close(binning.qmax, 5.825);
        assert_close(binning.de_step, 1.011);
        assert_close(binning.de_min, -61.671);
        assert_close(binning.de_max, 21.231);
        assert!(binning.de_min > -3.0 * incident_energy - binning.de_step);
    }

    #[test]
    fn test_estimate_needs_tof_data() {
        assert_eq!(estimate_binning(&[], 4.74), None);
        assert_eq!(estimate_binning(&[selected(-9.0, 1.6, 100)], 0.0), None);
        assert_eq!(estimate_binning(&[selected(-9.0, 0.0, 100)], 4.74), None);
        assert_eq!(estimate_binning(&[selected(-9.0, 1.6, 0)], 4.74), None);
    }
}
