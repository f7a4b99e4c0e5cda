use serde_json::Value;
use tracing::{debug, warn};

use super::client::CrmClient;
use super::error::CrmError;
use super::fetch::PartialRecord;
use super::responses::OrganizationsResponse;

impl CrmClient {
    /// Every organization visible to the token, from the Books API.
    ///
    /// The endpoint is not paged. Records are keyed by `organization_id`.
    pub async fn fetch_organizations(&self) -> Result<Vec<PartialRecord>, CrmError> {
        let headers = self.auth_headers().await?;
        let url = format!("{}/organizations", self.endpoints.books);
        let response = self
            .session
            .get(&url, &[], &headers)
            .await
            .map_err(|e| CrmError::Organizations(format!("transport error: {:#}", e)))?;

        if !response.is_success() {
            return Err(CrmError::Organizations(format!(
                "HTTP {}: {}",
                response.status, response.body
            )));
        }
        let parsed: OrganizationsResponse = response.json().map_err(|_| {
            CrmError::Organizations(format!("unexpected response: {}", response.body))
        })?;
        if parsed.code != 0 {
            return Err(CrmError::Organizations(parsed.message));
        }

        debug!("Fetched {} organizations", parsed.organizations.len());
        let records = parsed
            .organizations
            .into_iter()
            .filter_map(|fields| {
                let id = match fields.get("organization_id") {
                    Some(Value::String(s)) if !s.is_empty() => s.clone(),
                    Some(Value::Number(n)) => n.to_string(),
                    _ => {
                        warn!("Dropping organization without an organization_id");
                        return None;
                    }
                };
                Some(PartialRecord { id, fields })
            })
            .collect();
        Ok(records)
    }
}
