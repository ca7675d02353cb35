use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use serde_json::json;
use uuid::Uuid;

use strata_core::{
  Error as CoreError,
  error::StoreError as _,
  filter::FilterExpr,
  object::ObjectType,
  permission::{Permission, PermissionMode, TokenAuth},
  record::RecordDraft,
  store::{ObjectState, ObjectStore, RecordQuery},
  temporal::TemporalAxis,
};

use crate::{Error, SqliteStore};

fn date(s: &str) -> NaiveDate {
  s.parse().unwrap()
}

fn object_type(name: &str) -> ObjectType {
  let now = Utc::now();
  ObjectType {
    uuid: Uuid::new_v4(),
    service_url: "https://types.example.org".to_string(),
    name: name.to_string(),
    name_plural: format!("{name}s"),
    allow_geometry: true,
    created_at: now,
    modified_at: now,
  }
}

fn draft(data: serde_json::Value, start: &str) -> RecordDraft {
  RecordDraft::new(1, data, date(start))
}

async fn store_with_type(name: &str) -> (SqliteStore, ObjectType) {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let ot = object_type(name);
  store.put_object_type(ot.clone()).await.unwrap();
  (store, ot)
}

fn core(err: &Error) -> &CoreError {
  err.as_core().expect("expected a core error")
}

#[tokio::test]
async fn object_type_roundtrip() {
  let (store, ot) = store_with_type("tree").await;

  let found = store.get_object_type(ot.uuid).await.unwrap().unwrap();
  assert_eq!(found.name, "tree");
  assert_eq!(found.name_plural, "trees");
  assert!(found.allow_geometry);

  assert!(store.get_object_type(Uuid::new_v4()).await.unwrap().is_none());
  assert_eq!(store.list_object_types().await.unwrap().len(), 1);
}

#[tokio::test]
async fn create_rejects_unknown_type() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let err = store
    .create_object(Uuid::new_v4(), draft(json!({}), "2020-01-01"))
    .await
    .unwrap_err();
  assert!(matches!(core(&err), CoreError::ObjectTypeNotFound(_)));
}

#[tokio::test]
async fn first_record_is_open_at_index_one() {
  let (store, ot) = store_with_type("tree").await;
  let (object, record) = store
    .create_object(ot.uuid, draft(json!({"diameter": 30}), "2020-01-01"))
    .await
    .unwrap();

  assert_eq!(record.index, 1);
  assert_eq!(record.end_at, None);

  let records = store.list_records(object.uuid).await.unwrap();
  assert_eq!(records.len(), 1);
  assert_eq!(records[0].data, json!({"diameter": 30}));
}

#[tokio::test]
async fn append_end_dates_the_superseded_record() {
  let (store, ot) = store_with_type("tree").await;
  let (object, _) = store
    .create_object(ot.uuid, draft(json!({"diameter": 30}), "2020-01-01"))
    .await
    .unwrap();

  let r2 = store
    .append_record(object.uuid, draft(json!({"diameter": 32}), "2021-06-01"))
    .await
    .unwrap();
  assert_eq!(r2.index, 2);
  assert_eq!(r2.end_at, None);

  let records = store.list_records(object.uuid).await.unwrap();
  assert_eq!(records[0].end_at, Some(date("2021-06-01")));
  // exactly one open record after every append
  let open: Vec<_> = records.iter().filter(|r| r.end_at.is_none()).collect();
  assert_eq!(open.len(), 1);
  assert_eq!(open[0].index, 2);
}

#[tokio::test]
async fn append_to_missing_object_fails() {
  let (store, _) = store_with_type("tree").await;
  let err = store
    .append_record(Uuid::new_v4(), draft(json!({}), "2020-01-01"))
    .await
    .unwrap_err();
  assert!(matches!(core(&err), CoreError::ObjectNotFound(_)));
}

#[tokio::test]
async fn material_and_formal_resolution() {
  let (store, ot) = store_with_type("tree").await;
  let (object, _) = store
    .create_object(ot.uuid, draft(json!({"v": 1}), "2001-01-01"))
    .await
    .unwrap();
  store
    .append_record(object.uuid, draft(json!({"v": 2}), "2005-01-01"))
    .await
    .unwrap();

  // materially, the first record still answers for dates inside its window
  let state = store
    .get_object_state(object.uuid, TemporalAxis::Material(date("2003-06-01")))
    .await
    .unwrap();
  let ObjectState::Visible(resolved) = state else {
    panic!("expected a visible record");
  };
  assert_eq!(resolved.record.index, 1);

  // before any record's window: object exists but nothing is visible
  let state = store
    .get_object_state(object.uuid, TemporalAxis::Material(date("1999-01-01")))
    .await
    .unwrap();
  assert!(matches!(state, ObjectState::NoVisibleRecord { .. }));

  // formal: both records registered today, higher index wins
  let today = Utc::now().date_naive();
  let state = store
    .get_object_state(object.uuid, TemporalAxis::Formal(today))
    .await
    .unwrap();
  let ObjectState::Visible(resolved) = state else {
    panic!("expected a visible record");
  };
  assert_eq!(resolved.record.index, 2);

  // an unknown uuid is Missing, not NoVisibleRecord
  let state = store
    .get_object_state(Uuid::new_v4(), TemporalAxis::today())
    .await
    .unwrap();
  assert!(matches!(state, ObjectState::Missing));
}

#[tokio::test]
async fn correction_leaves_the_target_window_alone() {
  let (store, ot) = store_with_type("tree").await;
  let (object, _) = store
    .create_object(ot.uuid, draft(json!({"diameter": 30}), "2020-01-01"))
    .await
    .unwrap();

  let mut fix = draft(json!({"diameter": 31}), "2020-01-01");
  fix.correction_for = Some(1);
  let r2 = store.append_record(object.uuid, fix).await.unwrap();
  assert_eq!(r2.correction_for, Some(1));

  let records = store.list_records(object.uuid).await.unwrap();
  // the corrected record keeps its open window and gains the back-link
  assert_eq!(records[0].end_at, None);
  assert_eq!(records[0].corrected_by, Some(2));
}

#[tokio::test]
async fn second_correction_of_the_same_target_fails() {
  let (store, ot) = store_with_type("tree").await;
  let (object, _) = store
    .create_object(ot.uuid, draft(json!({}), "2020-01-01"))
    .await
    .unwrap();

  let mut fix = draft(json!({}), "2020-01-01");
  fix.correction_for = Some(1);
  store.append_record(object.uuid, fix).await.unwrap();

  let mut again = draft(json!({}), "2020-01-01");
  again.correction_for = Some(1);
  let err = store.append_record(object.uuid, again).await.unwrap_err();
  assert!(matches!(
    core(&err),
    CoreError::AlreadyCorrected { index: 1, by: 2 }
  ));
}

#[tokio::test]
async fn cleared_correction_can_be_reassigned() {
  let (store, ot) = store_with_type("tree").await;
  let (object, _) = store
    .create_object(ot.uuid, draft(json!({}), "2020-01-01"))
    .await
    .unwrap();

  let mut fix = draft(json!({}), "2020-01-01");
  fix.correction_for = Some(1);
  store.append_record(object.uuid, fix).await.unwrap();

  let detached = store.clear_correction(object.uuid, 2).await.unwrap();
  assert_eq!(detached.correction_for, None);

  let records = store.list_records(object.uuid).await.unwrap();
  assert_eq!(records[0].corrected_by, None);

  // the slot is free again
  let mut fix = draft(json!({}), "2020-01-01");
  fix.correction_for = Some(1);
  let r3 = store.append_record(object.uuid, fix).await.unwrap();
  assert_eq!(r3.index, 3);
  assert_eq!(r3.correction_for, Some(1));
}

#[tokio::test]
async fn delete_removes_history() {
  let (store, ot) = store_with_type("tree").await;
  let (object, _) = store
    .create_object(ot.uuid, draft(json!({}), "2020-01-01"))
    .await
    .unwrap();

  assert!(store.delete_object(object.uuid).await.unwrap());
  assert!(store.get_object(object.uuid).await.unwrap().is_none());
  assert!(store.list_records(object.uuid).await.unwrap().is_empty());
  assert!(!store.delete_object(object.uuid).await.unwrap());
}

#[tokio::test]
async fn listing_filters_on_the_visible_record_only() {
  let (store, ot) = store_with_type("tree").await;

  // this tree's visible diameter is 32; the 30 lives in a closed record
  let (grown, _) = store
    .create_object(ot.uuid, draft(json!({"diameter": 30}), "2019-01-01"))
    .await
    .unwrap();
  store
    .append_record(grown.uuid, draft(json!({"diameter": 32}), "2020-01-01"))
    .await
    .unwrap();

  store
    .create_object(ot.uuid, draft(json!({"diameter": 4}), "2019-01-01"))
    .await
    .unwrap();

  let mut query = RecordQuery::new(TemporalAxis::today());
  query.filters = vec![FilterExpr::parse("diameter__gt__5").unwrap()];
  let found = store.list_objects(&query).await.unwrap();
  assert_eq!(found.len(), 1);
  assert_eq!(found[0].object.uuid, grown.uuid);

  // the closed record's value must not leak into filtering
  let mut query = RecordQuery::new(TemporalAxis::today());
  query.filters = vec![FilterExpr::parse("diameter__exact__30").unwrap()];
  assert!(store.list_objects(&query).await.unwrap().is_empty());

  // but resolving at an older date brings it back
  let mut query = RecordQuery::new(TemporalAxis::Material(date("2019-06-01")));
  query.filters = vec![FilterExpr::parse("diameter__exact__30").unwrap()];
  let found = store.list_objects(&query).await.unwrap();
  assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn listing_respects_type_restrictions() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let trees = object_type("tree");
  let lamps = object_type("lamp");
  store.put_object_type(trees.clone()).await.unwrap();
  store.put_object_type(lamps.clone()).await.unwrap();

  store
    .create_object(trees.uuid, draft(json!({}), "2020-01-01"))
    .await
    .unwrap();
  store
    .create_object(lamps.uuid, draft(json!({}), "2020-01-01"))
    .await
    .unwrap();

  let mut query = RecordQuery::new(TemporalAxis::today());
  query.object_types = Some(vec![trees.uuid]);
  let found = store.list_objects(&query).await.unwrap();
  assert_eq!(found.len(), 1);
  assert_eq!(found[0].object_type.uuid, trees.uuid);

  // an empty allow-list matches nothing; None matches everything
  query.object_types = Some(vec![]);
  assert!(store.list_objects(&query).await.unwrap().is_empty());
  query.object_types = None;
  assert_eq!(store.list_objects(&query).await.unwrap().len(), 2);
}

#[tokio::test]
async fn free_text_search_walks_nested_strings() {
  let (store, ot) = store_with_type("tree").await;
  let (oak, _) = store
    .create_object(
      ot.uuid,
      draft(json!({"species": {"latin": "Quercus robur"}}), "2020-01-01"),
    )
    .await
    .unwrap();
  store
    .create_object(ot.uuid, draft(json!({"species": "elm"}), "2020-01-01"))
    .await
    .unwrap();

  let mut query = RecordQuery::new(TemporalAxis::today());
  query.text = Some("quercus".to_string());
  let found = store.list_objects(&query).await.unwrap();
  assert_eq!(found.len(), 1);
  assert_eq!(found[0].object.uuid, oak.uuid);

  // numbers are not string leaves
  let mut query = RecordQuery::new(TemporalAxis::today());
  query.text = Some("2020".to_string());
  assert!(store.list_objects(&query).await.unwrap().is_empty());
}

#[tokio::test]
async fn type_version_filter() {
  let (store, ot) = store_with_type("tree").await;
  store
    .create_object(ot.uuid, draft(json!({}), "2020-01-01"))
    .await
    .unwrap();
  store
    .create_object(ot.uuid, RecordDraft::new(2, json!({}), date("2020-01-01")))
    .await
    .unwrap();

  let mut query = RecordQuery::new(TemporalAxis::today());
  query.type_version = Some(2);
  let found = store.list_objects(&query).await.unwrap();
  assert_eq!(found.len(), 1);
  assert_eq!(found[0].record.version, 2);
}

#[tokio::test]
async fn token_and_permission_roundtrip() {
  let (store, ot) = store_with_type("tree").await;

  let token = TokenAuth {
    token:          "cafebabe".to_string(),
    contact_person: "A. Person".to_string(),
    email:          "a@example.org".to_string(),
    organization:   String::new(),
    application:    String::new(),
    administration: String::new(),
    is_superuser:   false,
    created_at:     Utc::now(),
  };
  store.put_token(token.clone()).await.unwrap();

  let found = store.get_token("cafebabe").await.unwrap().unwrap();
  assert_eq!(found.contact_person, "A. Person");
  assert!(store.get_token("missing").await.unwrap().is_none());

  let permission = Permission {
    object_type: ot.uuid,
    mode:        PermissionMode::ReadOnly,
    use_fields:  true,
    fields:      BTreeMap::from([(1, vec!["uuid".to_string()])]),
  };
  store.set_permission("cafebabe", permission).await.unwrap();

  let found = store.get_permission("cafebabe", ot.uuid).await.unwrap().unwrap();
  assert_eq!(found.mode, PermissionMode::ReadOnly);
  assert!(found.use_fields);
  assert_eq!(found.fields[&1], vec!["uuid".to_string()]);

  // replacing widens the permission in place
  let widened = Permission {
    object_type: ot.uuid,
    mode:        PermissionMode::ReadAndWrite,
    use_fields:  false,
    fields:      BTreeMap::new(),
  };
  store.set_permission("cafebabe", widened).await.unwrap();
  let found = store.get_permission("cafebabe", ot.uuid).await.unwrap().unwrap();
  assert!(found.can_write());

  assert_eq!(store.list_permissions("cafebabe").await.unwrap().len(), 1);
  assert!(store.list_permissions("other").await.unwrap().is_empty());
}
