//! Wire envelopes returned by the CRM and Books APIs.

use serde::Deserialize;
use serde_json::{Map, Value};

/// `GET /{module}` list envelope.
#[derive(Debug, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub data: Vec<Map<String, Value>>,
    #[serde(default)]
    pub info: PageInfo,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageInfo {
    #[serde(default)]
    pub more_records: bool,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
}

/// `GET /settings/fields` envelope. `fields` stays optional so a missing
/// collection can be told apart from an empty one.
#[derive(Debug, Deserialize)]
pub struct FieldsResponse {
    #[serde(default)]
    pub fields: Option<Vec<FieldDescriptor>>,
}

#[derive(Debug, Deserialize)]
pub struct FieldDescriptor {
    pub api_name: String,
}

/// Books `GET /organizations` envelope. A non-zero `code` is a failure even
/// with HTTP 200.
#[derive(Debug, Deserialize)]
pub struct OrganizationsResponse {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub organizations: Vec<Map<String, Value>>,
}
