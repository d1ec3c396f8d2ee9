use std::fmt;

use lumedb_query::{ArithmeticError, PathError};

/// Error taxonomy for the Update Engine and Index Set, carrying the
/// numeric codes the wire layer is expected to preserve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    InvalidModifier(String),
    ModOnIdNotAllowed,
    DollarInFieldName(String),
    CannotChangeId,
    MultiUpdateRequiresOperators,
    PositionalWithoutMatch,
    NonArrayTarget(String),
    ArrayOnlyModifier(String),
    InvalidCurrentDateType(String),
    DuplicateKey(String),
    IllegalUpdate,
    NonNumericOperand(String),
}

impl EngineError {
    pub fn code(&self) -> i32 {
        match self {
            EngineError::InvalidCurrentDateType(_) => 2,
            EngineError::NonArrayTarget(_) => 10141,
            EngineError::ArrayOnlyModifier(_) => 10153,
            EngineError::InvalidModifier(_) => 10147,
            EngineError::ModOnIdNotAllowed => 10148,
            EngineError::MultiUpdateRequiresOperators => 10158,
            EngineError::CannotChangeId => 13596,
            EngineError::DollarInFieldName(_) => 15896,
            EngineError::PositionalWithoutMatch => 16650,
            EngineError::DuplicateKey(_) => 11000,
            EngineError::IllegalUpdate => 9,
            EngineError::NonNumericOperand(_) => 14,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InvalidModifier(op) => write!(f, "Invalid modifier specified: {op}"),
            EngineError::ModOnIdNotAllowed => {
                write!(f, "Mod on {{ _id: ... }} not allowed")
            }
            EngineError::DollarInFieldName(field) => {
                write!(f, "can't have . or $ in field names: {field}")
            }
            EngineError::CannotChangeId => write!(f, "_id field cannot be changed"),
            EngineError::MultiUpdateRequiresOperators => write!(
                f,
                "multi update only works with $ operators"
            ),
            EngineError::PositionalWithoutMatch => write!(
                f,
                "the positional operator did not find the match needed from the query"
            ),
            EngineError::NonArrayTarget(path) => {
                write!(f, "can't append to non-array field: {path}")
            }
            EngineError::ArrayOnlyModifier(op) => {
                write!(f, "{op} can only be applied to an array")
            }
            EngineError::InvalidCurrentDateType(ty) => {
                write!(f, "{ty} is not valid type for $currentDate, must be date or timestamp")
            }
            EngineError::DuplicateKey(msg) => write!(f, "duplicate key error: {msg}"),
            EngineError::IllegalUpdate => write!(
                f,
                "update document must be either all $ operators or a full replacement, not both"
            ),
            EngineError::NonNumericOperand(reason) => write!(f, "{reason}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<PathError> for EngineError {
    fn from(e: PathError) -> Self {
        match e {
            PathError::PositionalWithoutMatch => EngineError::PositionalWithoutMatch,
            PathError::Empty => EngineError::InvalidModifier("empty path".to_string()),
            PathError::NonArrayTarget(seg) => EngineError::NonArrayTarget(seg),
        }
    }
}

impl From<ArithmeticError> for EngineError {
    fn from(e: ArithmeticError) -> Self {
        EngineError::NonNumericOperand(e.0)
    }
}
