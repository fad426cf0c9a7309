//! Quantity plausibility checks applied before a completion is accepted.
//!
//! Bands are fractions of the expected dose and apply to grease (g) and oil
//! (ml) alike. A hard failure blocks the completion; a soft failure needs the
//! operator to confirm the deviation.

use serde::{Deserialize, Serialize};

use crate::config::QualityConfig;
use crate::error::{Error, Result};
use crate::models::{Quantity, Unit};

/// Outcome of validating one reported quantity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub valid: bool,
    pub error: Option<String>,
    pub warning: Option<String>,
}

impl QualityVerdict {
    fn ok() -> Self {
        Self {
            valid: true,
            error: None,
            warning: None,
        }
    }

    fn invalid(error: String) -> Self {
        Self {
            valid: false,
            error: Some(error),
            warning: None,
        }
    }

    fn warn(warning: String) -> Self {
        Self {
            valid: true,
            error: None,
            warning: Some(warning),
        }
    }

    /// Convert into the ledger's accept/refuse decision
    pub fn enforce(self, deviation_confirmed: bool) -> Result<()> {
        if !self.valid {
            return Err(Error::ValidationBlocked(self.error.unwrap_or_default()));
        }
        match self.warning {
            Some(warning) if !deviation_confirmed => Err(Error::ConfirmationRequired(warning)),
            _ => Ok(()),
        }
    }
}

/// Validates reported lubricant amounts against the expected dose
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityGate {
    config: QualityConfig,
}

impl QualityGate {
    pub const fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Check `quantity_used` against `expected_quantity`, both in `unit`
    pub fn validate(
        &self,
        quantity_used: f64,
        expected_quantity: Option<f64>,
        unit: Unit,
    ) -> QualityVerdict {
        if !quantity_used.is_finite() || quantity_used <= 0.0 {
            return QualityVerdict::invalid(format!(
                "quantity must be greater than 0 {unit}, got {quantity_used}"
            ));
        }

        let Some(expected) = expected_quantity.filter(|expected| *expected > 0.0) else {
            return QualityVerdict::ok();
        };

        let ceiling = expected * self.config.hard_ceiling_multiplier;
        if quantity_used > ceiling {
            return QualityVerdict::invalid(format!(
                "{quantity_used}{unit} exceeds the maximum of {ceiling}{unit} ({}x expected {expected}{unit})",
                self.config.hard_ceiling_multiplier
            ));
        }

        let deviation = (quantity_used - expected).abs() / expected;
        if deviation > self.config.soft_tolerance {
            return QualityVerdict::warn(format!(
                "{quantity_used}{unit} deviates {:.0}% from expected {expected}{unit} (tolerance {:.0}%)",
                deviation * 100.0,
                self.config.soft_tolerance * 100.0
            ));
        }

        QualityVerdict::ok()
    }

    /// Check a unit-tagged report against the point's expected dose
    pub fn check(&self, reported: &Quantity, expected: Option<&Quantity>) -> QualityVerdict {
        match expected {
            Some(expected) if expected.unit != reported.unit => QualityVerdict::invalid(format!(
                "reported unit {} does not match the point unit {}",
                reported.unit, expected.unit
            )),
            _ => self.validate(
                reported.amount,
                expected.map(|quantity| quantity.amount),
                reported.unit,
            ),
        }
    }
}
