//! Paginated, field-batched record download.
//!
//! The list endpoint accepts at most 50 field names per request, so a module
//! with more fields is fetched once per field batch. Every batch is paged
//! until `info.more_records` goes false. The result is the concatenation of
//! all partial records in request order; any failed page discards all of it.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::client::CrmClient;
use super::error::CrmError;
use super::responses::ListResponse;

pub const MAX_BATCH_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Records per page (`per_page`).
    pub page_size: u32,
    /// Field names per request.
    pub batch_size: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            page_size: MAX_PAGE_SIZE,
            batch_size: MAX_BATCH_SIZE,
        }
    }
}

impl FetchOptions {
    pub fn validate(&self) -> Result<(), CrmError> {
        if !(1..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(CrmError::InvalidOptions(format!(
                "batch size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, self.batch_size
            )));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(CrmError::InvalidOptions(format!(
                "page size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, self.page_size
            )));
        }
        Ok(())
    }
}

/// One remote record as returned for a single field batch and page.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialRecord {
    pub id: String,
    /// Field values keyed by API name, including `id`.
    pub fields: Map<String, Value>,
}

impl PartialRecord {
    /// Wrap a raw record, or `None` when it carries no usable id.
    pub fn from_raw(fields: Map<String, Value>) -> Option<Self> {
        let id = match fields.get("id")? {
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        Some(Self { id, fields })
    }
}

/// Split `fields` into consecutive batches of at most `batch_size`.
pub fn field_batches(fields: &[String], batch_size: usize) -> Vec<&[String]> {
    fields.chunks(batch_size.max(1)).collect()
}

impl CrmClient {
    /// Download every record of `module` restricted to `fields`.
    ///
    /// Requests are strictly sequential. A failure anywhere returns
    /// [`CrmError::Fetch`] naming the 1-based batch and page; no partial
    /// result escapes.
    pub async fn fetch_all(
        &self,
        module: &str,
        fields: &[String],
        options: FetchOptions,
    ) -> Result<Vec<PartialRecord>, CrmError> {
        options.validate()?;

        let url = format!("{}/{}", self.endpoints.crm, module);
        let batches = field_batches(fields, options.batch_size);
        let mut records: Vec<PartialRecord> = Vec::new();

        for (index, batch) in batches.iter().enumerate() {
            let chunk = index + 1;
            let joined = batch.join(",");
            let mut page: u32 = 1;

            loop {
                let fetch_err = |cause: String| CrmError::Fetch {
                    module: module.to_string(),
                    chunk,
                    page,
                    cause,
                };

                let headers = self.auth_headers().await?;
                let query = [
                    ("fields", joined.clone()),
                    ("page", page.to_string()),
                    ("per_page", options.page_size.to_string()),
                ];
                let response = self
                    .session
                    .get(&url, &query, &headers)
                    .await
                    .map_err(|e| fetch_err(format!("transport error: {:#}", e)))?;

                if !response.is_success() {
                    return Err(fetch_err(format!(
                        "HTTP {}: {}",
                        response.status, response.body
                    )));
                }
                if response.is_empty() {
                    debug!(
                        "Module '{}' batch {}/{} page {}: no content",
                        module,
                        chunk,
                        batches.len(),
                        page
                    );
                    break;
                }

                let list: ListResponse = response
                    .json()
                    .map_err(|_| fetch_err(format!("unexpected response: {}", response.body)))?;
                debug!(
                    "Module '{}' batch {}/{} page {}: {} records",
                    module,
                    chunk,
                    batches.len(),
                    page,
                    list.data.len()
                );

                for raw in list.data {
                    match PartialRecord::from_raw(raw) {
                        Some(record) => records.push(record),
                        None => warn!(
                            "Module '{}' batch {} page {}: dropping record without an id",
                            module, chunk, page
                        ),
                    }
                }

                if !list.info.more_records {
                    break;
                }
                page += 1;
            }
        }

        Ok(records)
    }
}
