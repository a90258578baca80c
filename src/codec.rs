//! JSON rendering of handler output.
//!
//! Everything leaving the server goes through here: identifiers become their
//! string form, timestamps use one canonical layout, and store-native values
//! without a JSON counterpart (BSON object ids, datetimes, binary UUIDs) are
//! flattened before they reach the serializer.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bson::spec::BinarySubtype;
use bson::{Binary, Bson, Decimal128};
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde_json::{Map, Number, Value};
use uuid::Uuid;

/// Canonical timestamp layout: UTC, second precision, no zone suffix
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// SQLite GLOB matching exactly the canonical layout
pub const DATETIME_GLOB: &str =
  "[0-9][0-9][0-9][0-9]-[0-9][0-9]-[0-9][0-9]T[0-9][0-9]:[0-9][0-9]:[0-9][0-9]";

/// POSIX regex matching exactly the canonical layout
pub const DATETIME_REGEX: &str = r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}$";

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
  ts.format(DATETIME_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
  NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).ok()
}

pub fn now_timestamp() -> String {
  format_timestamp(&Utc::now())
}

/// Canonical timestamp `ttl` seconds ago; values at or below it have expired
pub fn expiry_cutoff(ttl: u64) -> Result<String, anyhow::Error> {
  let delta = i64::try_from(ttl)
    .ok()
    .and_then(TimeDelta::try_seconds)
    .ok_or_else(|| anyhow::anyhow!("ttl of {} seconds is out of range", ttl))?;
  let cutoff = Utc::now()
    .checked_sub_signed(delta)
    .ok_or_else(|| anyhow::anyhow!("ttl of {} seconds is out of range", ttl))?;
  Ok(format_timestamp(&cutoff))
}

/// Serialize `value` as the response body with the JSON content type
pub fn json_response(status: StatusCode, value: &Value) -> Response {
  match serde_json::to_vec(value) {
    Ok(body) => (status, [(header::CONTENT_TYPE, JSON_CONTENT_TYPE)], body).into_response(),
    Err(e) => {
      tracing::error!("Failed to encode response body: {}", e);
      StatusCode::INTERNAL_SERVER_ERROR.into_response()
    }
  }
}

pub fn uuid_to_bson(uuid: &Uuid) -> Bson {
  Bson::Binary(Binary {
    subtype: BinarySubtype::Uuid,
    bytes: uuid.as_bytes().to_vec(),
  })
}

pub fn bson_to_uuid(value: &Bson) -> Option<Uuid> {
  match value {
    Bson::Binary(binary) => binary_uuid(binary),
    _ => None,
  }
}

fn binary_uuid(binary: &Binary) -> Option<Uuid> {
  match binary.subtype {
    BinarySubtype::Uuid | BinarySubtype::UuidOld => Uuid::from_slice(&binary.bytes).ok(),
    _ => None,
  }
}

/// Exponent bias of the IEEE 754-2008 decimal128 interchange format
const DECIMAL128_BIAS: u128 = 6176;

/// Exact decimal128 encoding of an integer (coefficient in the low 113 bits, exponent 0)
fn u64_to_decimal128(value: u64) -> Decimal128 {
  let bits = (DECIMAL128_BIAS << 113) | value as u128;
  Decimal128::from_bytes(bits.to_le_bytes())
}

/// Inverse of `u64_to_decimal128`; `None` for any other decimal
fn decimal128_to_u64(value: &Decimal128) -> Option<u64> {
  let bits = u128::from_le_bytes(value.bytes());
  let sign_and_exponent = bits >> 113;
  if sign_and_exponent != DECIMAL128_BIAS {
    return None;
  }
  u64::try_from(bits & ((1u128 << 113) - 1)).ok()
}

/// Convert a stored BSON value into plain JSON
pub fn bson_to_json(value: Bson) -> Value {
  match value {
    Bson::Null | Bson::Undefined => Value::Null,
    Bson::Boolean(b) => Value::Bool(b),
    Bson::Int32(i) => Value::from(i),
    Bson::Int64(i) => Value::from(i),
    Bson::Double(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
    Bson::String(s) => Value::String(s),
    Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
    Bson::Document(doc) => {
      let map: Map<String, Value> = doc.into_iter().map(|(k, v)| (k, bson_to_json(v))).collect();
      Value::Object(map)
    }
    Bson::Decimal128(d) => match decimal128_to_u64(&d) {
      Some(n) => Value::from(n),
      None => Value::String(Bson::Decimal128(d).to_string()),
    },
    Bson::ObjectId(oid) => Value::String(oid.to_hex()),
    Bson::DateTime(dt) => match DateTime::<Utc>::from_timestamp_millis(dt.timestamp_millis()) {
      Some(ts) => Value::String(format_timestamp(&ts)),
      None => Value::Null,
    },
    Bson::Binary(binary) => match binary_uuid(&binary) {
      Some(uuid) => Value::String(uuid.simple().to_string()),
      None => Value::String(hex::encode(&binary.bytes)),
    },
    other => Value::String(other.to_string()),
  }
}

/// Convert client JSON into BSON for storage
pub fn json_to_bson(value: &Value) -> Bson {
  match value {
    Value::Null => Bson::Null,
    Value::Bool(b) => Bson::Boolean(*b),
    Value::Number(n) => {
      if let Some(i) = n.as_i64() {
        match i32::try_from(i) {
          Ok(small) => Bson::Int32(small),
          Err(_) => Bson::Int64(i),
        }
      } else if let Some(u) = n.as_u64() {
        // Beyond i64: a double would round
        Bson::Decimal128(u64_to_decimal128(u))
      } else {
        Bson::Double(n.as_f64().unwrap_or(f64::NAN))
      }
    }
    Value::String(s) => Bson::String(s.clone()),
    Value::Array(items) => Bson::Array(items.iter().map(json_to_bson).collect()),
    Value::Object(map) => Bson::Document(
      map
        .iter()
        .map(|(k, v)| (k.clone(), json_to_bson(v)))
        .collect(),
    ),
  }
}

/// Replace a canonical timestamp string at `path` (dotted) with a BSON
/// datetime so the store can expire on it. Returns whether anything changed.
pub fn promote_timestamp(doc: &mut bson::Document, path: &str) -> bool {
  let (head, rest) = match path.split_once('.') {
    Some((head, rest)) => (head, Some(rest)),
    None => (path, None),
  };
  match (doc.get_mut(head), rest) {
    (Some(Bson::Document(inner)), Some(rest)) => promote_timestamp(inner, rest),
    (Some(slot), None) => {
      let Some(naive) = slot.as_str().and_then(parse_timestamp) else {
        return false;
      };
      *slot = Bson::DateTime(bson::DateTime::from_millis(naive.and_utc().timestamp_millis()));
      true
    }
    _ => false,
  }
}
