//! Candid arguments and replies for the oracle canister methods
//!
//! Replies are decoded by value so a canister answering `int64`, `nat64`,
//! `int`, `nat` or `float64` all work. Float replies carry feet and are scaled
//! on the way in.

use candid::de::IDLDeserialize;
use candid::types::value::{IDLArgs, IDLValue};
use candid::Encode;

use crate::config::CanisterValueType;
use crate::error::LedgerError;
use crate::units::Scale;

/// Which canister setter an argument is for. Thresholds are unsigned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    Level,
    Threshold,
}

/// Encode no arguments.
pub fn empty() -> Result<Vec<u8>, LedgerError> {
    Encode!().map_err(encode_error)
}

/// Encode a scaled value as the single argument of a setter.
pub fn encode_scaled(
    scaled: i128,
    slot: Slot,
    value_type: CanisterValueType,
    scale: Scale,
) -> Result<Vec<u8>, LedgerError> {
    let encoded = match (value_type, slot) {
        (CanisterValueType::Float, _) => Encode!(&scale.to_feet(scaled)),
        (CanisterValueType::Integer, Slot::Level) => {
            let value = i64::try_from(scaled).map_err(|_| {
                LedgerError::WriteRejected(format!("{scaled} does not fit the canister's int64"))
            })?;
            Encode!(&value)
        }
        (CanisterValueType::Integer, Slot::Threshold) => {
            let value = u64::try_from(scaled).map_err(|_| {
                LedgerError::WriteRejected(format!("{scaled} does not fit the canister's nat64"))
            })?;
            Encode!(&value)
        }
    };
    encoded.map_err(encode_error)
}

/// Decode the first value of a numeric reply into scaled units.
pub fn decode_scaled(bytes: &[u8], scale: Scale) -> Result<i128, String> {
    let args = IDLArgs::from_bytes(bytes).map_err(|e| e.to_string())?;
    let value = args
        .args
        .first()
        .ok_or_else(|| "reply carries no value".to_string())?;

    match value {
        IDLValue::Int64(v) => Ok(i128::from(*v)),
        IDLValue::Nat64(v) => Ok(i128::from(*v)),
        IDLValue::Int32(v) => Ok(i128::from(*v)),
        IDLValue::Nat32(v) => Ok(i128::from(*v)),
        IDLValue::Int(v) => v
            .to_string()
            .parse::<i128>()
            .map_err(|_| format!("int {v} does not fit 128 bits")),
        IDLValue::Nat(v) => v
            .to_string()
            .parse::<i128>()
            .map_err(|_| format!("nat {v} does not fit 128 bits")),
        IDLValue::Float64(feet) => scale.to_scaled(*feet).map_err(|e| e.to_string()),
        other => Err(format!("expected a number, got {other:?}")),
    }
}

/// Decode `variant { Ok : null; Err : text }`. A reply with no values counts as `Ok`.
pub fn decode_unit_result(bytes: &[u8]) -> Result<Result<(), String>, String> {
    let mut de = IDLDeserialize::new(bytes).map_err(|e| e.to_string())?;
    if de.is_done() {
        return Ok(Ok(()));
    }
    let outcome = de
        .get_value::<Result<(), String>>()
        .map_err(|e| e.to_string())?;
    de.done().map_err(|e| e.to_string())?;
    Ok(outcome)
}

fn encode_error(err: candid::Error) -> LedgerError {
    LedgerError::WriteRejected(format!("could not encode candid argument: {err}"))
}
