use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: Decimal },

    #[error("hold decision must have zero quantity, got {0}")]
    HoldWithQuantity(Decimal),

    #[error("debate already concluded")]
    DebateConcluded,

    #[error("judge decision must not be empty")]
    EmptyJudgeDecision,

    #[error("workflow invariant violated: {0}")]
    Invariant(String),

    #[error("unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}

/// Check that a score lies in `[0, 1]`.
pub fn check_unit_interval(field: &'static str, value: Decimal) -> Result<(), ModelError> {
    if value < Decimal::ZERO || value > Decimal::ONE {
        return Err(ModelError::OutOfRange { field, value });
    }
    Ok(())
}
