use std::fmt::{self, Display};

/// Errors produced by model constructors and validation routines.
#[derive(Debug)]
pub enum ModelError {
    EmptyLogicalKey,
    InvalidId(String),
    UnknownOperation(String),
    UnknownStatus(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::EmptyLogicalKey => {
                write!(f, "logical key cannot be empty")
            }
            ModelError::InvalidId(raw) => write!(f, "invalid id: {raw}"),
            ModelError::UnknownOperation(raw) => {
                write!(f, "unknown operation: {raw}")
            }
            ModelError::UnknownStatus(raw) => {
                write!(f, "unknown status flag: {raw}")
            }
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
