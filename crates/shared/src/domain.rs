use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

macro_rules! string_id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id_newtype!(ObjectId);
string_id_newtype!(TransactionDigest);
string_id_newtype!(Address);

impl ObjectId {
    /// Parses a persisted session fragment (`#0xabc` or `0xabc`). Blank input
    /// means no object is tracked.
    pub fn from_fragment(fragment: &str) -> Option<Self> {
        let raw = fragment.trim();
        let raw = raw.strip_prefix('#').unwrap_or(raw).trim();
        if raw.is_empty() {
            return None;
        }
        Some(Self(raw.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorSymbol {
    #[default]
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl OperatorSymbol {
    pub const ALL: [OperatorSymbol; 4] = [
        OperatorSymbol::Add,
        OperatorSymbol::Subtract,
        OperatorSymbol::Multiply,
        OperatorSymbol::Divide,
    ];

    pub fn code(self) -> u8 {
        match self {
            OperatorSymbol::Add => 1,
            OperatorSymbol::Subtract => 2,
            OperatorSymbol::Multiply => 3,
            OperatorSymbol::Divide => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(OperatorSymbol::Add),
            2 => Some(OperatorSymbol::Subtract),
            3 => Some(OperatorSymbol::Multiply),
            4 => Some(OperatorSymbol::Divide),
            _ => None,
        }
    }

    pub fn glyph(self) -> &'static str {
        match self {
            OperatorSymbol::Add => "+",
            OperatorSymbol::Subtract => "-",
            OperatorSymbol::Multiply => "×",
            OperatorSymbol::Divide => "÷",
        }
    }
}

impl fmt::Display for OperatorSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.glyph())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown operator '{0}' (expected one of + - × ÷)")]
pub struct UnknownOperator(pub String);

impl FromStr for OperatorSymbol {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "+" | "add" | "plus" => Ok(OperatorSymbol::Add),
            "-" | "sub" | "subtract" | "minus" => Ok(OperatorSymbol::Subtract),
            "×" | "*" | "x" | "mul" | "multiply" | "times" => Ok(OperatorSymbol::Multiply),
            "÷" | "/" | "div" | "divide" => Ok(OperatorSymbol::Divide),
            _ => Err(UnknownOperator(s.to_string())),
        }
    }
}

/// Operands as entered by the user. They are normalized to non-negative
/// integers only when a request is built.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CalculationInput {
    pub a: f64,
    pub b: f64,
    pub op: OperatorSymbol,
}

impl CalculationInput {
    pub fn new(a: f64, b: f64, op: OperatorSymbol) -> Self {
        Self { a, b, op }
    }
}

/// Decoded view of a `Calculation` object created by the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationRecord {
    pub a: u64,
    pub b: u64,
    pub op: OperatorSymbol,
    pub result: u64,
    pub owner: String,
}

impl fmt::Display for CalculationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} = {}", self.a, self.op, self.b, self.result)
    }
}
