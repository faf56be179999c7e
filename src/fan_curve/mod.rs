pub mod calibration_curve;
pub mod store;

pub use calibration_curve::CalibrationCurve;

// Conversion from a measured fan speed to the percentage
// domain used by the BMC fan commands
pub trait FanCurve {
    // Return the number of calibration points in the curve
    fn points_num(&self) -> usize;

    // Return the fan speed percentage for the given RPM reading
    fn rpm_to_percent(&self, rpm: u32) -> f64;
}
