//! The `ObjectStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `strata-store-sqlite`).
//! Higher layers (`strata-api`, `strata-server`) depend on this abstraction,
//! not on any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  filter::FilterExpr,
  object::{Object, ObjectType},
  permission::{Permission, TokenAuth},
  record::{Record, RecordDraft},
  temporal::TemporalAxis,
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Parameters for [`ObjectStore::list_objects`].
#[derive(Debug, Clone)]
pub struct RecordQuery {
  /// Restrict to objects of these types. `None` means no restriction
  /// (superuser); an empty list matches nothing.
  pub object_types: Option<Vec<Uuid>>,
  /// Restrict to records at this schema version.
  pub type_version: Option<u16>,
  /// The temporal axis the visible record is resolved against.
  pub axis:         TemporalAxis,
  /// Attribute filter expressions, ANDed together, evaluated against the
  /// visible record's payload only.
  pub filters:      Vec<FilterExpr>,
  /// The contains-anywhere free-text search over string leaves.
  pub text:         Option<String>,
}

impl RecordQuery {
  pub fn new(axis: TemporalAxis) -> Self {
    Self {
      object_types: None,
      type_version: None,
      axis,
      filters: Vec::new(),
      text: None,
    }
  }
}

/// An object paired with its type and the record visible on the queried axis.
#[derive(Debug, Clone)]
pub struct ResolvedObject {
  pub object:      Object,
  pub object_type: ObjectType,
  pub record:      Record,
}

/// Outcome of a single-object resolution. Distinguishes "never existed" from
/// "exists, but no record is visible at the requested date".
#[derive(Debug, Clone)]
pub enum ObjectState {
  Missing,
  NoVisibleRecord { object: Object, object_type: ObjectType },
  Visible(ResolvedObject),
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Strata store backend.
///
/// Records are append-only: no method mutates or deletes a persisted record,
/// except for the end-dating write inside `append_record`'s transaction and
/// the explicit `clear_correction` link detachment. Appends to one object
/// are linearized by the backend; unrelated objects never contend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait ObjectStore: Send + Sync {
  type Error: std::error::Error + crate::error::StoreError + Send + Sync + 'static;

  // ── Object types ──────────────────────────────────────────────────────

  /// Insert or refresh a cached object type.
  fn put_object_type(
    &self,
    object_type: ObjectType,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// The narrow `resolveType` contract: look a cached type up by UUID.
  fn get_object_type(
    &self,
    uuid: Uuid,
  ) -> impl Future<Output = Result<Option<ObjectType>, Self::Error>> + Send + '_;

  fn list_object_types(
    &self,
  ) -> impl Future<Output = Result<Vec<ObjectType>, Self::Error>> + Send + '_;

  // ── Objects and records ───────────────────────────────────────────────

  /// Create an object together with its first record, atomically.
  fn create_object(
    &self,
    object_type: Uuid,
    draft: RecordDraft,
  ) -> impl Future<Output = Result<(Object, Record), Self::Error>> + Send + '_;

  fn get_object(
    &self,
    uuid: Uuid,
  ) -> impl Future<Output = Result<Option<Object>, Self::Error>> + Send + '_;

  /// Append a record per the correction-chain rules: the index assignment,
  /// the end-dating of a superseded open record, and the insert happen in
  /// one transaction serialized per object.
  fn append_record(
    &self,
    object: Uuid,
    draft: RecordDraft,
  ) -> impl Future<Output = Result<Record, Self::Error>> + Send + '_;

  /// Detach the correction link of the record at `index` without altering
  /// the corrected target.
  fn clear_correction(
    &self,
    object: Uuid,
    index: u32,
  ) -> impl Future<Output = Result<Record, Self::Error>> + Send + '_;

  /// All records of an object ordered by index — the raw history, not
  /// filtered by any temporal axis.
  fn list_records(
    &self,
    object: Uuid,
  ) -> impl Future<Output = Result<Vec<Record>, Self::Error>> + Send + '_;

  fn get_record(
    &self,
    object: Uuid,
    index: u32,
  ) -> impl Future<Output = Result<Option<Record>, Self::Error>> + Send + '_;

  /// Delete an object and its whole record history. Returns `false` if the
  /// object did not exist.
  fn delete_object(
    &self,
    uuid: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Resolution ────────────────────────────────────────────────────────

  /// Resolve one object against a temporal axis.
  fn get_object_state(
    &self,
    uuid: Uuid,
    axis: TemporalAxis,
  ) -> impl Future<Output = Result<ObjectState, Self::Error>> + Send + '_;

  /// List all objects whose visible record satisfies `query`. Objects with
  /// no record visible on the axis are silently excluded.
  fn list_objects<'a>(
    &'a self,
    query: &'a RecordQuery,
  ) -> impl Future<Output = Result<Vec<ResolvedObject>, Self::Error>> + Send + 'a;

  // ── Tokens and permissions ────────────────────────────────────────────

  fn put_token(
    &self,
    token: TokenAuth,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_token<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<Option<TokenAuth>, Self::Error>> + Send + 'a;

  /// Insert or replace the permission of one token for one object type.
  fn set_permission<'a>(
    &'a self,
    token: &'a str,
    permission: Permission,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn get_permission<'a>(
    &'a self,
    token: &'a str,
    object_type: Uuid,
  ) -> impl Future<Output = Result<Option<Permission>, Self::Error>> + Send + 'a;

  fn list_permissions<'a>(
    &'a self,
    token: &'a str,
  ) -> impl Future<Output = Result<Vec<Permission>, Self::Error>> + Send + 'a;
}
