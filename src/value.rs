//! The dynamic value representation shared by `values` entries and variable
//! initializers: a tagged sum rather than a dynamic container. When
//! reduction fails, the original token sequence is preserved as
//! [`Value::Symbolic`] so downstream tools can still present it.

use crate::token::Token;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int64(i64),
    UInt64(u64),
    Float(f64),
    Str(String),
    Symbolic(Vec<Token>),
}

impl Value {
    /// Best-effort conversion to `i64`, used where an integer is required
    /// (enum member values, array lengths, bit-field widths).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            Value::UInt64(v) => i64::try_from(*v).ok(),
            Value::Float(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self, Value::Symbolic(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int64(v) => write!(f, "{v}"),
            Value::UInt64(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v:?}"),
            Value::Symbolic(tokens) => {
                let rendered: Vec<String> = tokens.iter().map(|t| t.text.clone()).collect();
                write!(f, "{}", rendered.join(" "))
            }
        }
    }
}
