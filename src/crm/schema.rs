use tracing::debug;

use super::client::CrmClient;
use super::error::CrmError;
use super::responses::FieldsResponse;

impl CrmClient {
    /// API names of every field the module exposes, in server order.
    ///
    /// Fetched fresh on each call; nothing is cached between runs.
    pub async fn fetch_module_fields(&self, module: &str) -> Result<Vec<String>, CrmError> {
        let schema_err = |message: String| CrmError::SchemaFetch {
            module: module.to_string(),
            message,
        };

        let headers = self.auth_headers().await?;
        let url = format!("{}/settings/fields", self.endpoints.crm);
        let response = self
            .session
            .get(&url, &[("module", module.to_string())], &headers)
            .await
            .map_err(|e| schema_err(format!("transport error: {:#}", e)))?;

        if !response.is_success() {
            return Err(schema_err(format!(
                "HTTP {}: {}",
                response.status, response.body
            )));
        }
        let parsed: FieldsResponse = response
            .json()
            .map_err(|_| schema_err(format!("unexpected response: {}", response.body)))?;
        let fields = parsed
            .fields
            .ok_or_else(|| schema_err(format!("no fields in response: {}", response.body)))?;
        if fields.is_empty() {
            return Err(schema_err("module has no fields".into()));
        }

        let names: Vec<String> = fields.into_iter().map(|f| f.api_name).collect();
        debug!("Module '{}' exposes {} fields", module, names.len());
        Ok(names)
    }
}
