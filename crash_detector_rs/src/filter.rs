use nalgebra::Vector3;

/// Single-pole low-pass filter applied independently per axis.
///
/// `filtered' = filtered * alpha + raw * (1 - alpha)`. The held state
/// starts at zero, so the first few outputs ramp up toward the input.
#[derive(Debug, Clone)]
pub struct LowPassFilter {
    alpha: f64,
    state: Vector3<f64>,
}

impl LowPassFilter {
    pub fn new(alpha: f64) -> Self {
        LowPassFilter {
            alpha,
            state: Vector3::zeros(),
        }
    }

    /// Fold a raw triple into the filter and return the new filtered triple
    pub fn apply(&mut self, raw: Vector3<f64>) -> Vector3<f64> {
        self.state = self.state * self.alpha + raw * (1.0 - self.alpha);
        self.state
    }

    pub fn value(&self) -> Vector3<f64> {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = Vector3::zeros();
    }
}

/// Nonphysical readings (driver glitches) exceed any real crash magnitude.
/// NaN counts as a spike.
pub fn is_spike(magnitude: f64, threshold: f64) -> bool {
    !(magnitude <= threshold)
}
