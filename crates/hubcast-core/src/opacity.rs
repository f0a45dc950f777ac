//! Count-to-opacity scale for map rendering.
//!
//! `fill_opacity(count) = min_alpha + (max_alpha - min_alpha) * log10(count) / log10(max_value)`,
//! clamped to `[min_alpha, max_alpha]`.

use serde::{Deserialize, Serialize};

/// Log-scaled mapping from a count to a fill opacity.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpacityScale {
    /// Count that maps to `max_alpha`.
    pub max_value: u64,
    /// Opacity for counts of 0 and 1.
    pub min_alpha: f64,
    /// Opacity ceiling.
    pub max_alpha: f64,
}

impl Default for OpacityScale {
    fn default() -> Self {
        Self {
            max_value: 10_000,
            min_alpha: 0.1,
            max_alpha: 0.9,
        }
    }
}

impl OpacityScale {
    /// Check the bounds. Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_value <= 1 {
            return Err(format!("max_value must be > 1, got {}", self.max_value));
        }
        for (name, alpha) in [("min_alpha", self.min_alpha), ("max_alpha", self.max_alpha)] {
            if !(0.0..=1.0).contains(&alpha) {
                return Err(format!("{name} must be within [0, 1], got {alpha}"));
            }
        }
        if self.min_alpha > self.max_alpha {
            return Err(format!(
                "min_alpha ({}) must not exceed max_alpha ({})",
                self.min_alpha, self.max_alpha
            ));
        }
        Ok(())
    }

    /// Fill opacity for a count.
    pub fn fill_opacity(&self, count: u64) -> f64 {
        if count == 0 {
            return self.min_alpha;
        }
        let span = self.max_alpha - self.min_alpha;
        let scale = (self.max_value as f64).log10();
        if scale <= 0.0 {
            return self.max_alpha;
        }
        let alpha = self.min_alpha + span * (count as f64).log10() / scale;
        alpha.max(self.min_alpha).min(self.max_alpha)
    }
}
