use crate::{errors::CurveError, fan_curve::FanCurve};

// Line through two adjacent calibration points in
// the (rpm, percentage) plane
#[derive(Debug, Clone, Copy, PartialEq)]
struct Segment {
    slope: f64,
    intercept: f64,
}

// Piecewise linear RPM to percentage mapping measured on the
// fans of one machine. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationCurve {
    percentages: Vec<u8>,
    rpms: Vec<u32>,

    // segments[i] joins point i and point i + 1
    segments: Vec<Segment>,
}

impl CalibrationCurve {
    // Build a curve from the commanded percentages and the RPM
    // observed for each of them. Both sequences must have the
    // same length, at least 2 points and be strictly increasing
    pub fn build(percentages: &[u8], rpms: &[u32]) -> Result<Self, CurveError> {
        if percentages.is_empty() || rpms.is_empty() {
            return Err(CurveError::Empty);
        }

        if percentages.len() != rpms.len() {
            return Err(CurveError::LengthMismatch {
                percentages: percentages.len(),
                rpms: rpms.len(),
            });
        }

        if percentages.len() < 2 {
            return Err(CurveError::TooFewPoints(percentages.len()));
        }

        // A flat or decreasing RPM step would give an infinite slope
        for i in 1..rpms.len() {
            if rpms[i] <= rpms[i - 1] || percentages[i] <= percentages[i - 1] {
                return Err(CurveError::NotIncreasing(i));
            }
        }

        let segments = percentages
            .windows(2)
            .zip(rpms.windows(2))
            .map(|(pct, rpm)| {
                let (x1, x2) = (rpm[0] as f64, rpm[1] as f64);
                let (y1, y2) = (pct[0] as f64, pct[1] as f64);

                let slope = (y2 - y1) / (x2 - x1);
                let intercept = y1 - slope * x1;

                Segment { slope, intercept }
            })
            .collect();

        Ok(Self {
            percentages: percentages.to_vec(),
            rpms: rpms.to_vec(),
            segments,
        })
    }

    pub fn percentages(&self) -> &[u8] {
        &self.percentages
    }

    pub fn rpms(&self) -> &[u32] {
        &self.rpms
    }
}

impl FanCurve for CalibrationCurve {
    fn points_num(&self) -> usize {
        self.rpms.len()
    }

    fn rpm_to_percent(&self, rpm: u32) -> f64 {
        let last = self.rpms.len() - 1;

        // Clamp outside the calibrated range instead of extrapolating
        if rpm <= self.rpms[0] {
            return self.percentages[0] as f64;
        }
        if rpm >= self.rpms[last] {
            return self.percentages[last] as f64;
        }

        // On a calibration point return its percentage untouched,
        // otherwise i is the first point above the reading
        match self.rpms.binary_search(&rpm) {
            Ok(i) => self.percentages[i] as f64,
            Err(i) => {
                let segment = self.segments[i - 1];
                segment.slope * rpm as f64 + segment.intercept
            }
        }
    }
}
