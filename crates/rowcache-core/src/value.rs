//! Bound statement arguments.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A value bound to a statement placeholder.
///
/// `List` covers slices, arrays and any other collection argument; every
/// other variant is a scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BoundArg {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer value.
    Int(i64),
    /// Unsigned integer value.
    UInt(u64),
    /// Floating point value.
    Float(f64),
    /// Text value.
    Text(String),
    /// A collection of values.
    List(Vec<BoundArg>),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl BoundArg {
    /// Create a list argument from anything convertible.
    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<BoundArg>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Check if the value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Check if the value is a collection.
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// Flatten into identity tokens.
    ///
    /// Lists expand recursively, nulls contribute nothing and every other
    /// scalar contributes its display form.
    pub fn flatten(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    /// Append identity tokens to `out`. See [`BoundArg::flatten`].
    pub fn flatten_into(&self, out: &mut Vec<String>) {
        match self {
            Self::Null => {}
            Self::List(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
            other => out.push(other.to_string()),
        }
    }
}

impl fmt::Display for BoundArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "<nil>"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::UInt(u) => write!(f, "{}", u),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(s) => write!(f, "{}", s),
            Self::Bytes(bytes) => {
                write!(f, "[")?;
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", b)?;
                }
                write!(f, "]")
            }
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

// Conversions from Rust types to BoundArg
impl From<bool> for BoundArg {
    fn from(v: bool) -> Self {
        BoundArg::Bool(v)
    }
}

impl From<i32> for BoundArg {
    fn from(v: i32) -> Self {
        BoundArg::Int(v as i64)
    }
}

impl From<i64> for BoundArg {
    fn from(v: i64) -> Self {
        BoundArg::Int(v)
    }
}

impl From<u32> for BoundArg {
    fn from(v: u32) -> Self {
        BoundArg::UInt(v as u64)
    }
}

impl From<u64> for BoundArg {
    fn from(v: u64) -> Self {
        BoundArg::UInt(v)
    }
}

impl From<usize> for BoundArg {
    fn from(v: usize) -> Self {
        BoundArg::UInt(v as u64)
    }
}

impl From<f32> for BoundArg {
    fn from(v: f32) -> Self {
        BoundArg::Float(v as f64)
    }
}

impl From<f64> for BoundArg {
    fn from(v: f64) -> Self {
        BoundArg::Float(v)
    }
}

impl From<&str> for BoundArg {
    fn from(v: &str) -> Self {
        BoundArg::Text(v.to_string())
    }
}

impl From<String> for BoundArg {
    fn from(v: String) -> Self {
        BoundArg::Text(v)
    }
}

impl<T> From<Vec<T>> for BoundArg
where
    T: Into<BoundArg>,
{
    fn from(v: Vec<T>) -> Self {
        BoundArg::list(v)
    }
}

impl<T, const N: usize> From<[T; N]> for BoundArg
where
    T: Into<BoundArg>,
{
    fn from(v: [T; N]) -> Self {
        BoundArg::list(v)
    }
}

impl<T> From<Option<T>> for BoundArg
where
    T: Into<BoundArg>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => BoundArg::Null,
        }
    }
}
