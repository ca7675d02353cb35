//! The attribute filter DSL: `key__operator__value` expressions evaluated
//! against a record's semi-structured `data` payload.
//!
//! An expression splits on the last two `__`-delimited segments from the
//! right, so the key itself may contain `__` to address nested attributes
//! (`dimensions__diameter__exact__4` filters `data.dimensions.diameter`).
//! Filters only ever run against records already inside the visible set
//! produced by the temporal resolver — never into superseded records.

use chrono::NaiveDate;
use serde_json::Value;

use crate::{Error, Result};

// ─── Operators ───────────────────────────────────────────────────────────────

/// The closed set of comparison operators. Parsing an unknown operator name
/// fails at the variant boundary instead of falling through at match time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
  Exact,
  Gt,
  Gte,
  Lt,
  Lte,
  Icontains,
  In,
}

impl Operator {
  pub fn parse(name: &str) -> Result<Self> {
    match name {
      "exact" => Ok(Self::Exact),
      "gt" => Ok(Self::Gt),
      "gte" => Ok(Self::Gte),
      "lt" => Ok(Self::Lt),
      "lte" => Ok(Self::Lte),
      "icontains" => Ok(Self::Icontains),
      "in" => Ok(Self::In),
      other => Err(Error::UnknownOperator(other.to_owned())),
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Exact => "exact",
      Self::Gt => "gt",
      Self::Gte => "gte",
      Self::Lt => "lt",
      Self::Lte => "lte",
      Self::Icontains => "icontains",
      Self::In => "in",
    }
  }

  fn is_ordered(self) -> bool {
    matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte)
  }
}

// ─── Values ──────────────────────────────────────────────────────────────────

/// A filter value coerced from its query-string form. Numbers win over dates,
/// dates over plain strings, matching the source system's coercion order.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
  Number(f64),
  Date(NaiveDate),
  Str(String),
}

impl FilterValue {
  pub fn coerce(raw: &str) -> Self {
    if let Ok(n) = raw.parse::<f64>() {
      return Self::Number(n);
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
      return Self::Date(d);
    }
    Self::Str(raw.to_owned())
  }
}

// ─── Expressions ─────────────────────────────────────────────────────────────

/// One parsed `key__operator__value` expression.
#[derive(Debug, Clone)]
pub struct FilterExpr {
  /// Nested attribute path inside `data`, e.g. `["dimensions", "diameter"]`.
  pub path:     Vec<String>,
  pub operator: Operator,
  /// The literal value segment, uncoerced.
  pub raw:      String,
  pub value:    FilterValue,
}

impl FilterExpr {
  /// Parse a single expression. Fewer than three `__`-separated segments is
  /// an [`Error::InvalidFilterShape`]; ordered operators reject values that
  /// are neither numeric nor an ISO date.
  pub fn parse(expr: &str) -> Result<Self> {
    // rsplitn yields segments right-to-left: value, operator, key.
    let mut segments = expr.rsplitn(3, "__");
    let (Some(raw), Some(op_name), Some(key)) =
      (segments.next(), segments.next(), segments.next())
    else {
      return Err(Error::InvalidFilterShape(expr.to_owned()));
    };
    if key.is_empty() {
      return Err(Error::InvalidFilterShape(expr.to_owned()));
    }

    let operator = Operator::parse(op_name)?;
    let value = FilterValue::coerce(raw);

    if operator.is_ordered() && matches!(value, FilterValue::Str(_)) {
      return Err(Error::UnsupportedComparisonType {
        operator: operator.as_str().to_owned(),
        value:    raw.to_owned(),
      });
    }

    Ok(Self {
      path: key.split("__").map(str::to_owned).collect(),
      operator,
      raw: raw.to_owned(),
      value,
    })
  }

  /// Parse the comma-separated `data_attrs` variant. Expressions are ANDed;
  /// values must not contain commas here (use the single-expression variant
  /// for that).
  pub fn parse_list(exprs: &str) -> Result<Vec<Self>> {
    exprs.split(',').map(Self::parse).collect()
  }

  /// Whether `data` satisfies this expression.
  pub fn matches(&self, data: &Value) -> bool {
    let Some(stored) = lookup(data, &self.path) else {
      return false;
    };

    match self.operator {
      Operator::Exact => matches_exact(stored, &self.raw, &self.value),
      // membership against a pipe-separated literal set, each item matched
      // like `exact`
      Operator::In => self
        .raw
        .split('|')
        .any(|item| matches_exact(stored, item, &FilterValue::coerce(item))),
      Operator::Icontains => match stringify(stored) {
        Some(s) => s.to_lowercase().contains(&self.raw.to_lowercase()),
        None => false,
      },
      Operator::Gt => compare(stored, &self.value).is_some_and(|o| o.is_gt()),
      Operator::Gte => compare(stored, &self.value).is_some_and(|o| o.is_ge()),
      Operator::Lt => compare(stored, &self.value).is_some_and(|o| o.is_lt()),
      Operator::Lte => compare(stored, &self.value).is_some_and(|o| o.is_le()),
    }
  }
}

// ─── Evaluation helpers ──────────────────────────────────────────────────────

/// Resolve a nested attribute path, to arbitrary depth.
fn lookup<'a>(data: &'a Value, path: &[String]) -> Option<&'a Value> {
  path.iter().try_fold(data, |value, key| value.get(key))
}

/// `exact` tries the literal string first; if the value is unambiguously
/// numeric it also matches the numeric form. Payload storage is schemaless,
/// so a `"4"` vs `4` ambiguity must not hide matches.
fn matches_exact(stored: &Value, raw: &str, coerced: &FilterValue) -> bool {
  if stored.as_str() == Some(raw) {
    return true;
  }
  if let (FilterValue::Number(wanted), Some(n)) = (coerced, stored.as_f64()) {
    return n == *wanted;
  }
  false
}

/// Stringify a scalar for `icontains`; containers never match.
fn stringify(stored: &Value) -> Option<String> {
  match stored {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    _ => None,
  }
}

/// Ordered comparison of a stored payload value against a filter value.
/// Returns `None` when the two are not comparable (no match).
fn compare(stored: &Value, wanted: &FilterValue) -> Option<std::cmp::Ordering> {
  match wanted {
    FilterValue::Number(wanted) => stored.as_f64()?.partial_cmp(wanted),
    FilterValue::Date(wanted) => {
      let stored = NaiveDate::parse_from_str(stored.as_str()?, "%Y-%m-%d").ok()?;
      Some(stored.cmp(wanted))
    }
    FilterValue::Str(_) => None,
  }
}

// ─── Contains-anywhere search ────────────────────────────────────────────────

/// The free-text search mode: case-insensitive substring match against every
/// string-valued leaf of the payload, recursively.
pub fn contains_anywhere(data: &Value, needle: &str) -> bool {
  let needle = needle.to_lowercase();
  contains_value(data, &needle)
}

fn contains_value(value: &Value, needle: &str) -> bool {
  match value {
    Value::String(s) => s.to_lowercase().contains(needle),
    Value::Array(items) => items.iter().any(|v| contains_value(v, needle)),
    Value::Object(map) => map.values().any(|v| contains_value(v, needle)),
    _ => false,
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
