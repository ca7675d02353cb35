//! The field-authorization projector: reduces an outgoing representation to
//! the field paths a caller's permission authorizes, and reports which
//! present fields were suppressed.
//!
//! Field names use `__` as the nesting separator (`record__data__diameter`
//! addresses `record.data.diameter`). Leaves under `record__data__` are
//! lenient — payload attributes are optional per record, so their absence is
//! skipped rather than reported. Any other absent leaf is a configuration or
//! request error, surfaced to the caller.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use crate::{Error, Result};

// ─── Allow-list ──────────────────────────────────────────────────────────────

/// The caller's authorized field set. [`AllowedFields::All`] is the sentinel
/// for unrestricted access; projecting with it is a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedFields {
  All,
  Restricted(Vec<String>),
}

// ─── Spec tree ───────────────────────────────────────────────────────────────

/// A nested projection spec built from `__`-delimited field names.
#[derive(Debug, Clone, Default)]
pub struct FieldSpec {
  nodes: BTreeMap<String, FieldNode>,
}

#[derive(Debug, Clone)]
enum FieldNode {
  /// `lenient` leaves vanish silently when absent from the representation.
  Leaf { lenient: bool },
  Branch(FieldSpec),
}

impl FieldSpec {
  /// Build the spec tree. Full paths beginning with `record__data__` get
  /// lenient leaves; everything else must exist in the representation.
  pub fn build(fields: &[String]) -> Self {
    let mut spec = Self::default();
    for field in fields {
      let lenient = field.starts_with("record__data__");
      spec.insert(&mut field.split("__").peekable(), lenient);
    }
    spec
  }

  fn insert<'a>(
    &mut self,
    segments: &mut std::iter::Peekable<std::str::Split<'a, &'a str>>,
    lenient: bool,
  ) {
    let Some(head) = segments.next() else { return };
    let rest = segments;
    if rest.peek().is_none() {
      self.nodes.insert(head.to_owned(), FieldNode::Leaf { lenient });
    } else {
      let entry = self
        .nodes
        .entry(head.to_owned())
        .or_insert_with(|| FieldNode::Branch(FieldSpec::default()));
      // a later, deeper path wins over an earlier leaf at the same key
      if let FieldNode::Leaf { .. } = entry {
        *entry = FieldNode::Branch(FieldSpec::default());
      }
      if let FieldNode::Branch(branch) = entry {
        branch.insert(rest, lenient);
      }
    }
  }
}

/// A leaf the spec references but the representation does not contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingField(pub String);

/// Apply `spec` to `value`, keeping only the listed paths. Strict leaves
/// absent from `value` abort with the offending path.
pub fn project(value: &Value, spec: &FieldSpec) -> Result<Value, MissingField> {
  project_at(value, spec, "")
}

fn project_at(
  value: &Value,
  spec: &FieldSpec,
  prefix: &str,
) -> Result<Value, MissingField> {
  let mut out = Map::new();
  for (key, node) in &spec.nodes {
    let path = join(prefix, key);
    match (value.get(key), node) {
      (Some(child), FieldNode::Leaf { .. }) => {
        out.insert(key.clone(), child.clone());
      }
      (Some(child), FieldNode::Branch(inner)) => {
        out.insert(key.clone(), project_at(child, inner, &path)?);
      }
      (None, FieldNode::Leaf { lenient: true }) => {}
      (None, _) => return Err(MissingField(path)),
    }
  }
  Ok(Value::Object(out))
}

fn join(prefix: &str, key: &str) -> String {
  if prefix.is_empty() {
    key.to_owned()
  } else {
    format!("{prefix}__{key}")
  }
}

/// All leaf paths of a representation, `__`-joined. Arrays count as leaves.
pub fn field_names(value: &Value) -> BTreeSet<String> {
  let mut names = BTreeSet::new();
  collect_names(value, "", &mut names);
  names
}

fn collect_names(value: &Value, prefix: &str, out: &mut BTreeSet<String>) {
  match value {
    Value::Object(map) => {
      for (key, child) in map {
        collect_names(child, &join(prefix, key), out);
      }
    }
    _ if !prefix.is_empty() => {
      out.insert(prefix.to_owned());
    }
    _ => {}
  }
}

// ─── Suppressed-field report ─────────────────────────────────────────────────

/// Field paths that were present in the full representation but excluded
/// from the final output, aggregated per object type + schema version.
/// Surfaced by the transport layer as a response header.
#[derive(Debug, Clone, Default)]
pub struct SuppressedFields(BTreeMap<String, BTreeSet<String>>);

impl SuppressedFields {
  pub fn record<I>(&mut self, source: &str, paths: I)
  where
    I: IntoIterator<Item = String>,
  {
    self.0.entry(source.to_owned()).or_default().extend(paths);
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Header-friendly rendering: a bare list for a single source, otherwise
  /// `source=field,field; source=field` pairs.
  pub fn pretty(&self) -> String {
    if self.0.len() == 1 {
      let fields = self.0.values().next().map(|v| join_set(v));
      return fields.unwrap_or_default();
    }
    self
      .0
      .iter()
      .map(|(source, fields)| format!("{source}={}", join_set(fields)))
      .collect::<Vec<_>>()
      .join("; ")
  }
}

/// Whether a selected field name falls inside an allowed one: equal, an
/// ancestor of it, or a descendant of it.
fn name_overlaps(allowed: &str, selected: &str) -> bool {
  allowed == selected
    || allowed
      .strip_prefix(selected)
      .is_some_and(|rest| rest.starts_with("__"))
    || selected
      .strip_prefix(allowed)
      .is_some_and(|rest| rest.starts_with("__"))
}

fn join_set(fields: &BTreeSet<String>) -> String {
  fields.iter().cloned().collect::<Vec<_>>().join(",")
}

// ─── Projector ───────────────────────────────────────────────────────────────

/// Shape one outgoing representation according to the caller's allow-list and
/// the optional explicit `fields=` query selection.
///
/// The query selection is applied *after* (and must be a subset of) the
/// allow-list: selecting a field outside the permitted set is a request
/// error, distinct from the allow-list referencing a field absent from the
/// data. Suppressed-but-present paths are recorded in `report` under
/// `source` (the type URL + version of the projected record).
pub fn apply(
  representation: &Value,
  allowed: &AllowedFields,
  query_fields: &[String],
  source: &str,
  report: &mut SuppressedFields,
) -> Result<Value> {
  if query_fields.is_empty() && *allowed == AllowedFields::All {
    return Ok(representation.clone());
  }

  // The authorization check is on field names, not data presence: selecting
  // an unauthorized payload attribute must fail even though its (lenient)
  // absence from the data would project silently.
  if let AllowedFields::Restricted(allowed_names) = allowed {
    let unauthorized: Vec<String> = query_fields
      .iter()
      .filter(|q| !allowed_names.iter().any(|a| name_overlaps(a, q)))
      .cloned()
      .collect();
    if !unauthorized.is_empty() {
      return Err(Error::UnauthorizedFieldSelection(unauthorized.join(", ")));
    }
  }

  let allowed_value = match allowed {
    AllowedFields::All => representation.clone(),
    AllowedFields::Restricted(fields) => {
      let spec = FieldSpec::build(fields);
      project(representation, &spec)
        .map_err(|MissingField(path)| Error::FieldsAbsentInData(path))?
    }
  };

  let result = if query_fields.is_empty() {
    allowed_value
  } else {
    let spec = FieldSpec::build(query_fields);
    project(&allowed_value, &spec)
      .map_err(|MissingField(path)| Error::UnauthorizedFieldSelection(path))?
  };

  let suppressed: Vec<String> = field_names(representation)
    .difference(&field_names(&result))
    .cloned()
    .collect();
  if !suppressed.is_empty() {
    report.record(source, suppressed);
  }

  Ok(result)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
