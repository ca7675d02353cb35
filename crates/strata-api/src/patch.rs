//! Recursive merge of a partial-update body into the current payload.
//!
//! Close to RFC 7396 merge-patch, with one deliberate difference: `null`
//! overwrites the value but never deletes the key. Payload attributes are
//! optional per record, so deletion happens by writing a full replacement
//! record, not by patching.

use serde_json::Value;

pub fn merge_patch(base: &Value, patch: &Value) -> Value {
  match (base, patch) {
    (Value::Object(base), Value::Object(patch)) => {
      let mut out = base.clone();
      for (key, value) in patch {
        let merged = match out.get(key) {
          Some(existing) => merge_patch(existing, value),
          None => value.clone(),
        };
        out.insert(key.clone(), merged);
      }
      Value::Object(out)
    }
    _ => patch.clone(),
  }
}
