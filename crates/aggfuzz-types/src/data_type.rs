use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical type of one argument or column.
///
/// Composite types own their children, so a descriptor is a plain immutable
/// value that can be cloned and shared freely across generators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Boolean,
    Tinyint,
    Smallint,
    Integer,
    Bigint,
    Real,
    Double,
    Varchar,
    Timestamp,
    Array(Box<Self>),
    Map(Box<Self>, Box<Self>),
    /// Type of a column that holds only nulls (engine output).
    Unknown,
}

impl DataType {
    /// Shorthand for `ARRAY(element)`.
    pub fn array(element: Self) -> Self {
        Self::Array(Box::new(element))
    }

    /// Shorthand for `MAP(key, value)`.
    pub fn map(key: Self, value: Self) -> Self {
        Self::Map(Box::new(key), Box::new(value))
    }

    pub const fn is_bigint(&self) -> bool {
        matches!(self, Self::Bigint)
    }

    pub const fn is_double(&self) -> bool {
        matches!(self, Self::Double)
    }

    pub const fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    pub const fn is_integral(&self) -> bool {
        matches!(
            self,
            Self::Tinyint | Self::Smallint | Self::Integer | Self::Bigint
        )
    }

    pub const fn is_floating(&self) -> bool {
        matches!(self, Self::Real | Self::Double)
    }

    /// Element type of an array, `None` for every other type.
    pub fn element_type(&self) -> Option<&Self> {
        match self {
            Self::Array(element) => Some(element),
            _ => None,
        }
    }

    /// Inclusive value range of an integral type.
    pub const fn integral_range(&self) -> Option<(i64, i64)> {
        match self {
            Self::Tinyint => Some((i8::MIN as i64, i8::MAX as i64)),
            Self::Smallint => Some((i16::MIN as i64, i16::MAX as i64)),
            Self::Integer => Some((i32::MIN as i64, i32::MAX as i64)),
            Self::Bigint => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean => f.write_str("BOOLEAN"),
            Self::Tinyint => f.write_str("TINYINT"),
            Self::Smallint => f.write_str("SMALLINT"),
            Self::Integer => f.write_str("INTEGER"),
            Self::Bigint => f.write_str("BIGINT"),
            Self::Real => f.write_str("REAL"),
            Self::Double => f.write_str("DOUBLE"),
            Self::Varchar => f.write_str("VARCHAR"),
            Self::Timestamp => f.write_str("TIMESTAMP"),
            Self::Array(element) => write!(f, "ARRAY({element})"),
            Self::Map(key, value) => write!(f, "MAP({key}, {value})"),
            Self::Unknown => f.write_str("UNKNOWN"),
        }
    }
}
