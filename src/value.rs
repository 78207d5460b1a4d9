use crate::{Error, Result};
use std::cmp::Ordering;

/// A database-facing value, used both in result rows and in predicate
/// literals. Trimmed to the types a provider-agnostic shim has to move
/// around; providers with richer type systems map into these on the way out.
#[derive(Default, Debug, Clone)]
pub enum Value {
    #[default]
    Null,
    Boolean(Option<bool>),
    Int32(Option<i32>),
    Int64(Option<i64>),
    Float64(Option<f64>),
    Varchar(Option<String>),
    Blob(Option<Box<[u8]>>),
}

impl Value {
    pub fn same_type(&self, other: &Self) -> bool {
        core::mem::discriminant(self) == core::mem::discriminant(other)
    }

    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Boolean(v) => v.is_none(),
            Value::Int32(v) => v.is_none(),
            Value::Int64(v) => v.is_none(),
            Value::Float64(v) => v.is_none(),
            Value::Varchar(v) => v.is_none(),
            Value::Blob(v) => v.is_none(),
        }
    }

    /// Ordering used by predicate evaluation and sorting. Integers compare
    /// across widths and against floats, everything else only within its own
    /// type. `None` means not comparable, which includes every null operand.
    pub fn try_compare(&self, other: &Self) -> Option<Ordering> {
        use Value::*;
        match (self, other) {
            (Boolean(Some(l)), Boolean(Some(r))) => l.partial_cmp(r),
            (Int32(Some(l)), Int32(Some(r))) => l.partial_cmp(r),
            (Int64(Some(l)), Int64(Some(r))) => l.partial_cmp(r),
            (Int32(Some(l)), Int64(Some(r))) => (*l as i64).partial_cmp(r),
            (Int64(Some(l)), Int32(Some(r))) => l.partial_cmp(&(*r as i64)),
            (Float64(Some(l)), Float64(Some(r))) => l.partial_cmp(r),
            (Int32(Some(l)), Float64(Some(r))) => (*l as f64).partial_cmp(r),
            (Int64(Some(l)), Float64(Some(r))) => (*l as f64).partial_cmp(r),
            (Float64(Some(l)), Int32(Some(r))) => l.partial_cmp(&(*r as f64)),
            (Float64(Some(l)), Int64(Some(r))) => l.partial_cmp(&(*r as f64)),
            (Varchar(Some(l)), Varchar(Some(r))) => l.partial_cmp(r),
            (Blob(Some(l)), Blob(Some(r))) => l.partial_cmp(r),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Boolean(Some(v)) => Ok(*v),
            v => Err(Error::msg(format!("Cannot read {:?} as a boolean", v))),
        }
    }

    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Value::Int32(Some(v)) => Ok(*v as i64),
            Value::Int64(Some(v)) => Ok(*v),
            v => Err(Error::msg(format!("Cannot read {:?} as an integer", v))),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Value::Int32(Some(v)) => Ok(*v as f64),
            Value::Int64(Some(v)) => Ok(*v as f64),
            Value::Float64(Some(v)) => Ok(*v),
            v => Err(Error::msg(format!("Cannot read {:?} as a float", v))),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Value::Varchar(Some(v)) => Ok(v),
            v => Err(Error::msg(format!("Cannot read {:?} as a string", v))),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Boolean(l), Boolean(r)) => l == r,
            (Int32(l), Int32(r)) => l == r,
            (Int64(l), Int64(r)) => l == r,
            (Float64(l), Float64(r)) => l == r,
            (Varchar(l), Varchar(r)) => l == r,
            (Blob(l), Blob(r)) => l == r,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(Some(value))
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int32(Some(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64(Some(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float64(Some(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Varchar(Some(value.to_owned()))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Varchar(Some(value))
    }
}

impl From<Box<[u8]>> for Value {
    fn from(value: Box<[u8]>) -> Self {
        Value::Blob(Some(value))
    }
}
