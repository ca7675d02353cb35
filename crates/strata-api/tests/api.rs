//! End-to-end tests: real router, real SQLite store, requests driven through
//! `tower::ServiceExt::oneshot`.

use std::{collections::BTreeMap, sync::Arc};

use axum::{
  Router,
  body::{Body, to_bytes},
  http::{Request, StatusCode, header},
};
use chrono::Utc;
use serde_json::{Value, json};
use tower::ServiceExt as _;
use uuid::Uuid;

use strata_api::{AppState, api_router};
use strata_core::{
  object::ObjectType,
  permission::{Permission, PermissionMode, TokenAuth},
  store::ObjectStore as _,
};
use strata_store_sqlite::SqliteStore;

const ADMIN: &str = "admintoken";
const READER: &str = "readertoken";

async fn seed() -> (Router, ObjectType) {
  let store = SqliteStore::open_in_memory().await.unwrap();

  let now = Utc::now();
  let object_type = ObjectType {
    uuid: Uuid::new_v4(),
    service_url: "https://types.example.org".to_string(),
    name: "tree".to_string(),
    name_plural: "trees".to_string(),
    allow_geometry: false,
    created_at: now,
    modified_at: now,
  };
  store.put_object_type(object_type.clone()).await.unwrap();

  let token = |key: &str, is_superuser| TokenAuth {
    token:          key.to_string(),
    contact_person: "Test".to_string(),
    email:          "test@example.org".to_string(),
    organization:   String::new(),
    application:    String::new(),
    administration: String::new(),
    is_superuser,
    created_at:     now,
  };
  store.put_token(token(ADMIN, true)).await.unwrap();
  store.put_token(token(READER, false)).await.unwrap();

  // the reader sees only url + record index + the payload name
  store
    .set_permission(READER, Permission {
      object_type: object_type.uuid,
      mode:        PermissionMode::ReadOnly,
      use_fields:  true,
      fields:      BTreeMap::from([(1, vec![
        "url".to_string(),
        "record__index".to_string(),
        "record__data__name".to_string(),
      ])]),
    })
    .await
    .unwrap();

  let router = api_router(AppState::new(
    Arc::new(store),
    "https://objects.example.org/api/v2",
  ));
  (router, object_type)
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
  let mut builder = Request::builder().method(method).uri(uri);
  if let Some(token) = token {
    builder = builder.header(header::AUTHORIZATION, format!("Token {token}"));
  }
  match body {
    Some(body) => builder
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(body.to_string()))
      .unwrap(),
    None => builder.body(Body::empty()).unwrap(),
  }
}

async fn json_body(response: axum::response::Response) -> Value {
  let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
  serde_json::from_slice(&bytes).unwrap()
}

fn create_body(object_type: &ObjectType, data: Value, start_at: &str) -> Value {
  json!({
    "type": object_type.url(),
    "record": { "typeVersion": 1, "data": data, "startAt": start_at }
  })
}

async fn create_object(router: &Router, object_type: &ObjectType, data: Value) -> Value {
  let response = router
    .clone()
    .oneshot(request(
      "POST",
      "/objects",
      Some(ADMIN),
      Some(create_body(object_type, data, "2020-01-01")),
    ))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::CREATED);
  json_body(response).await
}

#[tokio::test]
async fn requests_without_a_token_are_unauthorized() {
  let (router, _) = seed().await;
  let response = router
    .oneshot(request("GET", "/objects", None, None))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

  let (router, _) = seed().await;
  let response = router
    .oneshot(request("GET", "/objects", Some("wrong"), None))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_then_retrieve() {
  let (router, object_type) = seed().await;
  let created =
    create_object(&router, &object_type, json!({"name": "Willow", "diameter": 4})).await;

  assert_eq!(created["type"], json!(object_type.url()));
  assert_eq!(created["record"]["index"], json!(1));
  assert_eq!(created["record"]["typeVersion"], json!(1));
  assert_eq!(created["record"]["startAt"], json!("2020-01-01"));
  assert_eq!(created["record"]["endAt"], json!(null));

  let uuid = created["uuid"].as_str().unwrap();
  let response = router
    .clone()
    .oneshot(request("GET", &format!("/objects/{uuid}"), Some(ADMIN), None))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::OK);
  let fetched = json_body(response).await;
  assert_eq!(fetched["record"]["data"]["name"], json!("Willow"));

  // before the record's material window: found as an object, not at the date
  let response = router
    .clone()
    .oneshot(request(
      "GET",
      &format!("/objects/{uuid}?date=1999-01-01"),
      Some(ADMIN),
      None,
    ))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::NOT_FOUND);

  let response = router
    .oneshot(request(
      "GET",
      &format!("/objects/{}", Uuid::new_v4()),
      Some(ADMIN),
      None,
    ))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn field_restricted_listing_is_projected_and_reported() {
  let (router, object_type) = seed().await;
  create_object(&router, &object_type, json!({"name": "Willow", "diameter": 4})).await;

  let response = router
    .clone()
    .oneshot(request("GET", "/objects", Some(READER), None))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::OK);

  let header = response
    .headers()
    .get("x-unauthorized-fields")
    .expect("suppressed fields should be reported")
    .to_str()
    .unwrap()
    .to_string();
  assert!(header.contains("uuid"), "{header}");
  assert!(header.contains("record__data__diameter"), "{header}");

  let items = json_body(response).await;
  let item = &items.as_array().unwrap()[0];
  assert!(item.get("uuid").is_none());
  assert_eq!(item["record"]["index"], json!(1));
  assert_eq!(item["record"]["data"]["name"], json!("Willow"));
  assert!(item["record"]["data"].get("diameter").is_none());
}

#[tokio::test]
async fn explicit_fields_outside_the_allow_list_are_rejected() {
  let (router, object_type) = seed().await;
  create_object(&router, &object_type, json!({"name": "Willow"})).await;

  let response = router
    .clone()
    .oneshot(request(
      "GET",
      "/objects?fields=record__data__diameter",
      Some(READER),
      None,
    ))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::BAD_REQUEST);

  // narrowing inside the allow-list is fine
  let response = router
    .oneshot(request("GET", "/objects?fields=url", Some(READER), None))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::OK);
  let items = json_body(response).await;
  let item = &items.as_array().unwrap()[0];
  assert!(item.get("url").is_some());
  assert!(item.get("record").is_none());
}

#[tokio::test]
async fn read_only_tokens_cannot_write() {
  let (router, object_type) = seed().await;

  let response = router
    .clone()
    .oneshot(request(
      "POST",
      "/objects",
      Some(READER),
      Some(create_body(&object_type, json!({}), "2020-01-01")),
    ))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::FORBIDDEN);

  let created = create_object(&router, &object_type, json!({"name": "Willow"})).await;
  let uuid = created["uuid"].as_str().unwrap();
  let response = router
    .oneshot(request("DELETE", &format!("/objects/{uuid}"), Some(READER), None))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn history_is_forbidden_for_field_restricted_tokens() {
  let (router, object_type) = seed().await;
  let created = create_object(&router, &object_type, json!({"name": "Willow"})).await;
  let uuid = created["uuid"].as_str().unwrap();

  let response = router
    .clone()
    .oneshot(request(
      "GET",
      &format!("/objects/{uuid}/history"),
      Some(READER),
      None,
    ))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::FORBIDDEN);

  let response = router
    .oneshot(request(
      "GET",
      &format!("/objects/{uuid}/history"),
      Some(ADMIN),
      None,
    ))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::OK);
  let records = json_body(response).await;
  assert_eq!(records.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn put_appends_and_end_dates() {
  let (router, object_type) = seed().await;
  let created = create_object(&router, &object_type, json!({"diameter": 30})).await;
  let uuid = created["uuid"].as_str().unwrap();

  let response = router
    .clone()
    .oneshot(request(
      "PUT",
      &format!("/objects/{uuid}"),
      Some(ADMIN),
      Some(create_body(&object_type, json!({"diameter": 32}), "2021-06-01")),
    ))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::OK);
  let updated = json_body(response).await;
  assert_eq!(updated["record"]["index"], json!(2));

  let response = router
    .clone()
    .oneshot(request(
      "GET",
      &format!("/objects/{uuid}/history"),
      Some(ADMIN),
      None,
    ))
    .await
    .unwrap();
  let records = json_body(response).await;
  assert_eq!(records[0]["endAt"], json!("2021-06-01"));
  assert_eq!(records[1]["endAt"], json!(null));

  // changing the type on update is rejected
  let response = router
    .oneshot(request(
      "PUT",
      &format!("/objects/{uuid}"),
      Some(ADMIN),
      Some(json!({
        "type": Uuid::new_v4().to_string(),
        "record": { "typeVersion": 1, "data": {}, "startAt": "2021-06-01" }
      })),
    ))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn patch_merges_the_latest_payload() {
  let (router, object_type) = seed().await;
  let created = create_object(
    &router,
    &object_type,
    json!({"name": "Willow", "size": {"diameter": 30, "height": 12}}),
  )
  .await;
  let uuid = created["uuid"].as_str().unwrap();

  let response = router
    .clone()
    .oneshot(request(
      "PATCH",
      &format!("/objects/{uuid}"),
      Some(ADMIN),
      Some(json!({ "record": { "data": { "size": { "diameter": 32 } } } })),
    ))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::OK);
  let patched = json_body(response).await;

  assert_eq!(patched["record"]["index"], json!(2));
  assert_eq!(patched["record"]["data"]["name"], json!("Willow"));
  assert_eq!(patched["record"]["data"]["size"]["diameter"], json!(32));
  assert_eq!(patched["record"]["data"]["size"]["height"], json!(12));
  // untouched parts carry over
  assert_eq!(patched["record"]["startAt"], created["record"]["startAt"]);
}

#[tokio::test]
async fn geometry_is_rejected_when_the_type_disallows_it() {
  let (router, object_type) = seed().await;

  let response = router
    .oneshot(request(
      "POST",
      "/objects",
      Some(ADMIN),
      Some(json!({
        "type": object_type.url(),
        "record": {
          "typeVersion": 1,
          "data": {},
          "startAt": "2020-01-01",
          "geometry": { "type": "Point", "coordinates": [4.9, 52.3] }
        }
      })),
    ))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn filtering_and_ordering_through_the_query_string() {
  let (router, object_type) = seed().await;
  create_object(&router, &object_type, json!({"name": "Oak", "diameter": 40})).await;
  create_object(&router, &object_type, json!({"name": "Willow", "diameter": 4})).await;

  let response = router
    .clone()
    .oneshot(request(
      "GET",
      "/objects?data_attrs=diameter__gt__5",
      Some(ADMIN),
      None,
    ))
    .await
    .unwrap();
  let items = json_body(response).await;
  let items = items.as_array().unwrap();
  assert_eq!(items.len(), 1);
  assert_eq!(items[0]["record"]["data"]["name"], json!("Oak"));

  let response = router
    .clone()
    .oneshot(request(
      "GET",
      "/objects?ordering=-record__data__diameter",
      Some(ADMIN),
      None,
    ))
    .await
    .unwrap();
  let items = json_body(response).await;
  let items = items.as_array().unwrap();
  assert_eq!(items[0]["record"]["data"]["diameter"], json!(40));
  assert_eq!(items[1]["record"]["data"]["diameter"], json!(4));

  // the reader cannot sort on a field outside its allow-lists
  let response = router
    .oneshot(request(
      "GET",
      "/objects?ordering=record__data__diameter",
      Some(READER),
      None,
    ))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn permissions_endpoint_lists_the_callers_grants() {
  let (router, object_type) = seed().await;

  let response = router
    .clone()
    .oneshot(request("GET", "/permissions", Some(READER), None))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::OK);
  let grants = json_body(response).await;
  let grants = grants.as_array().unwrap();
  assert_eq!(grants.len(), 1);
  assert_eq!(grants[0]["objectType"], json!(object_type.uuid.to_string()));
  assert_eq!(grants[0]["mode"], json!("read_only"));
  assert_eq!(grants[0]["useFields"], json!(true));

  let response = router
    .oneshot(request("GET", "/permissions", Some(ADMIN), None))
    .await
    .unwrap();
  let grants = json_body(response).await;
  assert!(grants.as_array().unwrap().is_empty());
}
