//! Error types for lbm-scheme.
//!
//! Scheme construction either fully succeeds or returns one of these; there is
//! no partially built scheme.

use thiserror::Error;

use crate::symbolic::ParseError;

/// Result type alias for scheme operations.
pub type Result<T> = std::result::Result<T, SchemeError>;

#[derive(Debug, Error)]
pub enum SchemeError {
    /// Malformed scheme description, wrong-sized vector, unresolvable reference.
    #[error("configuration error{}: key `{key}`: {message}", scheme_suffix(.scheme))]
    Configuration {
        scheme: Option<usize>,
        key: String,
        message: String,
    },

    /// The moment matrix of an elementary scheme is singular.
    #[error(
        "moment matrix of elementary scheme {scheme} is not invertible: the choice of polynomials is odd"
    )]
    Algebraic { scheme: usize },

    /// A symbolic entry did not reduce to a real number.
    #[error("unable to convert `{expression}` to a float ({context}); check the `parameters` entry")]
    NumericConversion { expression: String, context: String },

    /// An analyzer could not complete.
    #[error("analysis error: {0}")]
    Analysis(String),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn scheme_suffix(scheme: &Option<usize>) -> String {
    match scheme {
        Some(k) => format!(" in elementary scheme {k}"),
        None => String::new(),
    }
}

impl SchemeError {
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        SchemeError::Configuration {
            scheme: None,
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn scheme_config(scheme: usize, key: impl Into<String>, message: impl Into<String>) -> Self {
        SchemeError::Configuration {
            scheme: Some(scheme),
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn conversion(expression: impl ToString, context: impl Into<String>) -> Self {
        SchemeError::NumericConversion {
            expression: expression.to_string(),
            context: context.into(),
        }
    }
}
