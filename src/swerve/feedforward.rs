// Static + velocity + acceleration motor model

/// Feed-forward voltage `ks * sign(v) + kv * v + ka * a`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimpleMotorFeedforward {
    pub ks: f64,
    pub kv: f64,
    pub ka: f64,
}

impl SimpleMotorFeedforward {
    pub fn new(ks: f64, kv: f64, ka: f64) -> Self {
        Self { ks, kv, ka }
    }

    /// Steady-state output for `velocity` (zero acceleration)
    pub fn calculate(&self, velocity: f64) -> f64 {
        self.calculate_with_acceleration(velocity, 0.0)
    }

    pub fn calculate_with_acceleration(&self, velocity: f64, acceleration: f64) -> f64 {
        // f64::signum(0.0) is 1.0; a stopped wheel needs no static term
        let direction = if velocity == 0.0 { 0.0 } else { velocity.signum() };
        self.ks * direction + self.kv * velocity + self.ka * acceleration
    }
}
