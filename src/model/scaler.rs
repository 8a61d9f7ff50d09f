//! Z-score standardization of a single score column.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
}

impl StandardScaler {
    pub fn fit(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Self {
            mean,
            std: var.sqrt(),
        }
    }

    /// Zero-variance input maps every value to 0.
    pub fn transform(&self, value: f64) -> f64 {
        if self.std == 0.0 || !self.std.is_finite() {
            0.0
        } else {
            (value - self.mean) / self.std
        }
    }

    pub fn fit_transform(values: &[f64]) -> Vec<f64> {
        let s = Self::fit(values);
        values.iter().map(|v| s.transform(*v)).collect()
    }
}
