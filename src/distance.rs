/// Distance estimation from BLE signal strength
///
/// Uses the ratio model popularised by iBeacon ranging:
/// ratio = rssi / calibration_power
/// distance = ratio ^ n                 (ratio < 1)
/// distance = 0.89976 * ratio ^ n       (ratio >= 1)
///
/// Where:
/// - rssi: Measured signal strength (dBm, negative)
/// - calibration_power: Expected signal strength at 1 meter (dBm)
/// - n: Path loss exponent, fixed at 2.0 (indoor default)

/// Returned whenever a reading cannot be turned into a distance.
pub const NO_READING: f64 = -1.0;

/// Calibration power used when a device never advertised one (or advertised 0)
pub const FALLBACK_CALIBRATION_DBM: i32 = -59;

/// Path loss exponent used by the estimator
pub const PATH_LOSS_EXPONENT: f64 = 2.0;

/// Scale factor applied once the measured signal is at or below the calibration power
const FAR_COEFFICIENT: f64 = 0.89976;

/// Estimate distance in meters
///
/// # Arguments
/// * `signal_strength` - Received signal strength in dBm (0 is not a reading)
/// * `calibration_power` - Reference signal at 1 meter; 0 is replaced by the fallback
///
/// # Returns
/// Estimated distance in meters, or [`NO_READING`] if either input is missing
/// or the signal strength is 0
pub fn estimate(signal_strength: Option<i32>, calibration_power: Option<i32>) -> f64 {
    let (Some(rssi), Some(calibration)) = (signal_strength, calibration_power) else {
        return NO_READING;
    };
    if rssi == 0 {
        return NO_READING;
    }

    let calibration = if calibration == 0 {
        FALLBACK_CALIBRATION_DBM
    } else {
        calibration
    };

    let ratio = rssi as f64 / calibration as f64;
    if ratio < 1.0 {
        ratio.powf(PATH_LOSS_EXPONENT)
    } else {
        FAR_COEFFICIENT * ratio.powf(PATH_LOSS_EXPONENT)
    }
}

/// Like [`estimate`], but maps the sentinel to `None`
pub fn try_estimate(signal_strength: Option<i32>, calibration_power: Option<i32>) -> Option<f64> {
    let distance = estimate(signal_strength, calibration_power);
    is_reading(distance).then_some(distance)
}

/// Whether an estimate carries data (anything but the sentinel)
pub fn is_reading(distance_m: f64) -> bool {
    distance_m >= 0.0 && distance_m.is_finite()
}

/// Within this range the locate view shows the "in reach" rings
pub const IN_REACH_M: f64 = 0.3;

/// Within this range the trend indicator always reads "closer"
pub const ARRIVED_M: f64 = 0.35;

/// Get a human-readable proximity category
pub fn distance_category(distance_m: f64) -> &'static str {
    match distance_m {
        d if !is_reading(d) => "no signal",
        d if d <= IN_REACH_M => "in reach",
        d if d < 1.0 => "very close (<1m)",
        d if d < 2.0 => "close (1-2m)",
        d if d < 4.0 => "nearby (2-4m)",
        _ => "far (>4m)",
    }
}

/// Format distance for display
pub fn format_distance(distance_m: f64) -> String {
    if is_reading(distance_m) {
        format!("{:.3} m", distance_m)
    } else {
        "—".to_string()
    }
}
