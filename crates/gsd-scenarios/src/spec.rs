use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Kind of synthetic corruption to inject into a measurement set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    /// One randomly chosen measurement gets a gross multiplicative error.
    SingleGrossError,
    /// Several distinct measurements get independent gross errors.
    MultipleIndependentErrors,
    /// Every voltage measurement is shifted by the same fraction.
    SystematicBias,
    /// Systematic voltage bias plus independent gross errors on flows.
    Mixed,
}

/// Tunable parameters shared by all scenario kinds.
///
/// Serde defaults let a manifest or config file specify only the fields it
/// cares about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioParams {
    /// Inclusive range the gross-error multiplier is drawn from.
    #[serde(default = "default_gross_error_range")]
    pub gross_error_range: (f64, f64),
    /// Number of measurements corrupted by the multi-error kinds.
    #[serde(default = "default_error_count")]
    pub error_count: usize,
    /// Relative shift applied by systematic bias, e.g. 0.05 for +5%.
    #[serde(default = "default_bias_fraction")]
    pub bias_fraction: f64,
}

fn default_gross_error_range() -> (f64, f64) {
    (2.0, 3.0)
}

fn default_error_count() -> usize {
    3
}

fn default_bias_fraction() -> f64 {
    0.05
}

impl Default for ScenarioParams {
    fn default() -> Self {
        Self {
            gross_error_range: default_gross_error_range(),
            error_count: default_error_count(),
            bias_fraction: default_bias_fraction(),
        }
    }
}

impl ScenarioParams {
    pub fn validate(&self) -> Result<()> {
        let (lo, hi) = self.gross_error_range;
        if !lo.is_finite() || !hi.is_finite() || lo <= 0.0 || lo > hi {
            bail!("gross_error_range ({lo}, {hi}) must be a positive ordered range");
        }
        if self.error_count == 0 {
            bail!("error_count must be at least 1");
        }
        if !self.bias_fraction.is_finite() || self.bias_fraction == 0.0 {
            bail!("bias_fraction must be finite and non-zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        ScenarioParams::default().validate().unwrap();
    }

    #[test]
    fn serde_fills_missing_fields_with_defaults() {
        let params: ScenarioParams = serde_json::from_str(r#"{"error_count": 7}"#).unwrap();
        assert_eq!(params.error_count, 7);
        assert_eq!(params.gross_error_range, (2.0, 3.0));
        assert!((params.bias_fraction - 0.05).abs() < 1e-12);
    }

    #[test]
    fn degenerate_ranges_rejected() {
        let mut params = ScenarioParams::default();
        params.gross_error_range = (3.0, 2.0);
        assert!(params.validate().is_err());

        params.gross_error_range = (-1.0, 2.0);
        assert!(params.validate().is_err());

        params = ScenarioParams::default();
        params.error_count = 0;
        assert!(params.validate().is_err());

        params = ScenarioParams::default();
        params.bias_fraction = 0.0;
        assert!(params.validate().is_err());
    }
}
