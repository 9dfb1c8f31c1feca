//! Feet <-> ledger fixed-point conversion
//!
//! Ledgers store gauge heights as integers scaled by `10^decimals`. The
//! default of 11 decimals matches the deployed insurance contract and canister.

use crate::error::ConversionError;

/// Default number of fixed-point decimals used by the ledgers.
pub const DEFAULT_SCALE_DECIMALS: u32 = 11;

/// Largest supported decimals. Keeps the factor exactly representable in `f64`.
pub const MAX_SCALE_DECIMALS: u32 = 18;

/// Fixed-point scale shared by every conversion for one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scale {
    decimals: u32,
    factor: i128,
}

impl Scale {
    pub fn new(decimals: u32) -> Result<Self, ConversionError> {
        if decimals > MAX_SCALE_DECIMALS {
            return Err(ConversionError::InvalidMeasurement(format!(
                "scale decimals {decimals} exceeds {MAX_SCALE_DECIMALS}"
            )));
        }

        Ok(Self {
            decimals,
            factor: 10i128.pow(decimals),
        })
    }

    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    pub fn factor(&self) -> i128 {
        self.factor
    }

    /// Convert a reading in feet to the ledger encoding, truncating toward zero.
    pub fn to_scaled(&self, value_feet: f64) -> Result<i128, ConversionError> {
        if value_feet.is_nan() {
            return Err(ConversionError::InvalidMeasurement("value is NaN".to_string()));
        }
        if value_feet.is_infinite() {
            return Err(ConversionError::InvalidMeasurement(
                "value is infinite".to_string(),
            ));
        }
        if value_feet < 0.0 {
            return Err(ConversionError::InvalidMeasurement(format!(
                "negative reading {value_feet}"
            )));
        }

        let scaled = (value_feet * self.factor as f64).trunc();
        if scaled >= i128::MAX as f64 {
            return Err(ConversionError::InvalidMeasurement(format!(
                "reading {value_feet} overflows the ledger encoding"
            )));
        }

        Ok(scaled as i128)
    }

    pub fn to_feet(&self, scaled: i128) -> f64 {
        scaled as f64 / self.factor as f64
    }
}

impl Default for Scale {
    fn default() -> Self {
        Self {
            decimals: DEFAULT_SCALE_DECIMALS,
            factor: 10i128.pow(DEFAULT_SCALE_DECIMALS),
        }
    }
}
