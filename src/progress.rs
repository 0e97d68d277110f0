//! Geometry of the circular progress indicator on the dashboards

use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressRing {
    pub size: f64,
    pub stroke_width: f64,
}

impl Default for ProgressRing {
    fn default() -> Self {
        Self {
            size: 120.0,
            stroke_width: 12.0,
        }
    }
}

impl ProgressRing {
    pub fn new(size: f64, stroke_width: f64) -> Self {
        Self { size, stroke_width }
    }

    pub fn radius(&self) -> f64 {
        (self.size - self.stroke_width) / 2.0
    }

    pub fn circumference(&self) -> f64 {
        2.0 * PI * self.radius()
    }

    /// Dash offset for `percent`, clamped to 0..=100
    pub fn dash_offset(&self, percent: f64) -> f64 {
        let p = if percent.is_nan() {
            0.0
        } else {
            percent.clamp(0.0, 100.0)
        };
        let c = self.circumference();
        c - (p / 100.0) * c
    }
}

/// `part` as a percentage of `whole`; 0 when `whole` is 0
pub fn percent_of(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}
