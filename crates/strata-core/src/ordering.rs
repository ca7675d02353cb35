//! Result ordering on representation paths, including nested payload
//! attributes (`-record__data__length,record__index`).

use std::cmp::Ordering;

use serde_json::Value;

use crate::{Error, Result};

// ─── Keys ────────────────────────────────────────────────────────────────────

/// One ordering term: a `__`-delimited representation path, optionally
/// descending (`-` prefix).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderKey {
  pub path:       Vec<String>,
  pub descending: bool,
}

impl OrderKey {
  fn term(&self) -> String {
    self.path.join("__")
  }
}

/// Parse a comma-separated `ordering` parameter. Empty terms are dropped.
pub fn parse(raw: &str) -> Vec<OrderKey> {
  raw
    .split(',')
    .map(str::trim)
    .filter(|term| !term.is_empty())
    .map(|term| {
      let (descending, term) = match term.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, term),
      };
      OrderKey {
        path:       term.split("__").map(str::to_owned).collect(),
        descending,
      }
    })
    .collect()
}

/// Field-restricted callers may only sort on fields inside every one of
/// their allow-lists (directly, or through the term's parent path for
/// payload attributes).
pub fn validate_terms(keys: &[OrderKey], allow_lists: &[Vec<String>]) -> Result<()> {
  if allow_lists.is_empty() {
    return Ok(());
  }

  let allowed = |term: &str| {
    allow_lists.iter().all(|list| {
      list.iter().any(|f| f == term)
        || term
          .rsplit_once("__")
          .is_some_and(|(parent, _)| list.iter().any(|f| f == parent))
    })
  };

  let rejected: Vec<String> = keys
    .iter()
    .map(OrderKey::term)
    .filter(|term| !allowed(term))
    .collect();

  if rejected.is_empty() {
    Ok(())
  } else {
    Err(Error::UnauthorizedOrderingFields(rejected.join(", ")))
  }
}

// ─── Sorting ─────────────────────────────────────────────────────────────────

/// Sort representations in place by the given keys. Missing paths sort
/// before present ones; mixed-type values fall back to a stable type rank.
pub fn sort_by_keys(items: &mut [Value], keys: &[OrderKey]) {
  items.sort_by(|a, b| {
    for key in keys {
      let ord = compare_at(a, b, &key.path);
      let ord = if key.descending { ord.reverse() } else { ord };
      if ord != Ordering::Equal {
        return ord;
      }
    }
    Ordering::Equal
  });
}

fn compare_at(a: &Value, b: &Value, path: &[String]) -> Ordering {
  let lookup = |v: &Value| -> Option<Value> {
    path
      .iter()
      .try_fold(v, |value, key| value.get(key))
      .cloned()
  };
  compare_values(lookup(a).as_ref(), lookup(b).as_ref())
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
  match (a, b) {
    (None, None) => Ordering::Equal,
    (None, Some(_)) => Ordering::Less,
    (Some(_), None) => Ordering::Greater,
    (Some(a), Some(b)) => match (a, b) {
      (Value::Number(x), Value::Number(y)) => x
        .as_f64()
        .partial_cmp(&y.as_f64())
        .unwrap_or(Ordering::Equal),
      (Value::String(x), Value::String(y)) => x.cmp(y),
      (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
      _ => type_rank(a).cmp(&type_rank(b)),
    },
  }
}

fn type_rank(v: &Value) -> u8 {
  match v {
    Value::Null => 0,
    Value::Bool(_) => 1,
    Value::Number(_) => 2,
    Value::String(_) => 3,
    Value::Array(_) => 4,
    Value::Object(_) => 5,
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn parses_prefix_and_nesting() {
    let keys = parse("-record__data__length,record__index");
    assert_eq!(keys.len(), 2);
    assert!(keys[0].descending);
    assert_eq!(keys[0].path, vec!["record", "data", "length"]);
    assert!(!keys[1].descending);
  }

  #[test]
  fn sorts_on_nested_payload_attributes() {
    let mut items = vec![
      json!({ "record": { "data": { "length": 5 } } }),
      json!({ "record": { "data": { "length": 2 } } }),
      json!({ "record": { "data": {} } }),
    ];
    sort_by_keys(&mut items, &parse("record__data__length"));
    assert!(items[0]["record"]["data"].get("length").is_none());
    assert_eq!(items[1]["record"]["data"]["length"], json!(2));
    assert_eq!(items[2]["record"]["data"]["length"], json!(5));

    sort_by_keys(&mut items, &parse("-record__data__length"));
    assert_eq!(items[0]["record"]["data"]["length"], json!(5));
  }

  #[test]
  fn restricted_callers_cannot_sort_outside_their_allow_lists() {
    let keys = parse("record__data__secret");
    let err = validate_terms(&keys, &[vec!["uuid".to_string()]]).unwrap_err();
    assert!(matches!(err, Error::UnauthorizedOrderingFields(_)));

    // the parent path authorizes one extra level of payload nesting
    let keys = parse("record__data__name");
    assert!(validate_terms(&keys, &[vec!["record__data".to_string()]]).is_ok());

    // unrestricted callers are not checked
    assert!(validate_terms(&parse("anything"), &[]).is_ok());
  }
}
