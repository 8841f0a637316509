use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::entry::Entry;
use crate::error::{Error, Result};

/// Comparison operators supported by key and value filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Less than
    Lt,
    /// Less than or equal
    Le,
    /// Greater than
    Gt,
    /// Greater than or equal
    Ge,
    /// Equal
    Eq,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Eq => "==",
        }
    }

    /// Checks whether `lhs <op> rhs` holds under byte-wise lexicographic order.
    pub fn compare(&self, lhs: &[u8], rhs: &[u8]) -> bool {
        let ordering = lhs.cmp(rhs);
        match self {
            Operator::Lt => ordering == Ordering::Less,
            Operator::Le => ordering != Ordering::Greater,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Ge => ordering != Ordering::Less,
            Operator::Eq => ordering == Ordering::Equal,
        }
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Le),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Ge),
            "==" => Ok(Operator::Eq),
            other => Err(Error::invalid(format!("unsupported operator '{other}'"))),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A predicate over a single entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Key starts with the given string.
    KeyPrefix(String),
    /// Key compared against a reference key.
    KeyCompare(Operator, String),
    /// Value compared against a reference value.
    ValueCompare(Operator, Vec<u8>),
}

impl Filter {
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Filter::KeyPrefix(prefix) => entry.key.as_str().starts_with(prefix.as_str()),
            Filter::KeyCompare(op, key) => op.compare(entry.key.as_bytes(), key.as_bytes()),
            // an entry with no materialized value cannot satisfy a value predicate
            Filter::ValueCompare(op, value) => entry
                .value()
                .is_some_and(|v| op.compare(v, value.as_slice())),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::KeyPrefix(prefix) => write!(f, "KEY PREFIX {prefix:?}"),
            Filter::KeyCompare(op, key) => write!(f, "KEY {op} {key:?}"),
            Filter::ValueCompare(op, value) => {
                write!(f, "VALUE {op} {:?}", String::from_utf8_lossy(value))
            }
        }
    }
}

/// Textual description of a filter, as produced by a command line.
///
/// `target` is `key` or `value`, `op` is `prefix` (keys only) or one of the
/// comparison operators, and `operand` is the reference string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    pub target: String,
    pub op: String,
    pub operand: String,
}

impl FilterSpec {
    pub fn new(target: impl Into<String>, op: impl Into<String>, operand: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            op: op.into(),
            operand: operand.into(),
        }
    }

    /// Resolves the spec into a [`Filter`], rejecting anything unsupported.
    pub fn to_filter(&self) -> Result<Filter> {
        match (self.target.as_str(), self.op.as_str()) {
            ("key", "prefix") => Ok(Filter::KeyPrefix(self.operand.clone())),
            ("value", "prefix") => Err(Error::invalid("prefix filters only apply to keys")),
            ("key", op) => Ok(Filter::KeyCompare(op.parse()?, self.operand.clone())),
            ("value", op) => Ok(Filter::ValueCompare(
                op.parse()?,
                self.operand.as_bytes().to_vec(),
            )),
            (target, _) => Err(Error::invalid(format!(
                "unsupported filter target '{target}', expected 'key' or 'value'"
            ))),
        }
    }
}

impl FromStr for FilterSpec {
    type Err = Error;

    /// Parses `"<target> <op> <operand>"`. The operand is the remainder of the
    /// text and may contain whitespace.
    fn from_str(s: &str) -> Result<Self> {
        let malformed = || Error::invalid(format!("malformed filter '{s}', expected '<key|value> <op> <operand>'"));

        let (target, rest) = s.trim_start().split_once(char::is_whitespace).ok_or_else(malformed)?;
        let (op, operand) = rest.trim_start().split_once(char::is_whitespace).ok_or_else(malformed)?;
        let operand = operand.trim_start();
        if operand.is_empty() {
            return Err(malformed());
        }

        let spec = FilterSpec::new(target, op, operand);
        spec.to_filter()?;
        Ok(spec)
    }
}
