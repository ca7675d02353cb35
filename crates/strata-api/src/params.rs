//! Query-string parsing for the object endpoints.
//!
//! The parameters are order-insensitive and some (`data_attr`) repeat, so
//! handlers extract the raw pair list and feed it through [`parse_pairs`].

use chrono::NaiveDate;
use strata_core::{
  filter::FilterExpr,
  ordering::{self, OrderKey},
  temporal::TemporalAxis,
};
use uuid::Uuid;

use crate::error::ApiError;

/// Everything the list and retrieve endpoints accept in the query string.
#[derive(Debug)]
pub struct ListQuery {
  pub axis:         TemporalAxis,
  /// The `type` parameter, resolved to a type uuid.
  pub object_type:  Option<Uuid>,
  pub type_version: Option<u16>,
  pub filters:      Vec<FilterExpr>,
  /// The `data_icontains` free-text needle.
  pub text:         Option<String>,
  /// The explicit `fields=` selection, `__`-delimited paths.
  pub fields:       Vec<String>,
  pub ordering:     Vec<OrderKey>,
}

/// Accepts either a bare type uuid or a full registry URL ending in one.
pub fn type_ref_uuid(raw: &str) -> Result<Uuid, ApiError> {
  let tail = raw
    .trim_end_matches('/')
    .rsplit('/')
    .next()
    .unwrap_or(raw);
  Uuid::parse_str(tail)
    .map_err(|_| ApiError::BadRequest(format!("invalid object type reference: {raw:?}")))
}

fn parse_date(name: &str, raw: &str) -> Result<NaiveDate, ApiError> {
  NaiveDate::parse_from_str(raw, "%Y-%m-%d")
    .map_err(|_| ApiError::BadRequest(format!("invalid {name}: {raw:?}, expected YYYY-MM-DD")))
}

pub fn parse_pairs(pairs: &[(String, String)]) -> Result<ListQuery, ApiError> {
  let mut date = None;
  let mut registration_date = None;
  let mut object_type = None;
  let mut type_version = None;
  let mut filters = Vec::new();
  let mut text = None;
  let mut fields = Vec::new();
  let mut order_keys = Vec::new();

  for (key, value) in pairs {
    match key.as_str() {
      "date" => date = Some(parse_date("date", value)?),
      "registrationDate" => {
        registration_date = Some(parse_date("registrationDate", value)?);
      }
      "type" => object_type = Some(type_ref_uuid(value)?),
      "typeVersion" => {
        type_version = Some(value.parse().map_err(|_| {
          ApiError::BadRequest(format!("invalid typeVersion: {value:?}"))
        })?);
      }
      // comma-separated expressions; values must not contain commas here
      "data_attrs" => filters.extend(FilterExpr::parse_list(value)?),
      // repeatable single expression; the value segment may contain commas
      "data_attr" => filters.push(FilterExpr::parse(value)?),
      "data_icontains" => text = Some(value.clone()),
      "fields" => fields.extend(
        value
          .split(',')
          .map(str::trim)
          .filter(|f| !f.is_empty())
          .map(str::to_owned),
      ),
      "ordering" => order_keys = ordering::parse(value),
      _ => {}
    }
  }

  Ok(ListQuery {
    axis: TemporalAxis::from_params(date, registration_date)?,
    object_type,
    type_version,
    filters,
    text,
    fields,
    ordering: order_keys,
  })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
