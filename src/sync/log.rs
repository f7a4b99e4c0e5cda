use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::store::{LogEntry, OperationLog, RunStatus, StoreError};

/// Writes one operation log entry per sync run.
#[derive(Clone)]
pub struct OperationLogger {
    log: Arc<dyn OperationLog>,
    config_ref: String,
}

impl std::fmt::Debug for OperationLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationLogger")
            .field("config_ref", &self.config_ref)
            .finish_non_exhaustive()
    }
}

impl OperationLogger {
    pub fn new(log: Arc<dyn OperationLog>, config_ref: impl Into<String>) -> Self {
        Self {
            log,
            config_ref: config_ref.into(),
        }
    }

    pub fn config_ref(&self) -> &str {
        &self.config_ref
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn log(
        &self,
        table_name: &str,
        record_count: u64,
        status: RunStatus,
        timestamp: DateTime<Utc>,
        initiated_at: DateTime<Utc>,
        error_message: &str,
    ) -> Result<i64, StoreError> {
        let entry = LogEntry {
            config_ref: self.config_ref.clone(),
            table_name: table_name.to_string(),
            record_count,
            status,
            error_message: error_message.to_string(),
            timestamp,
            initiated_at,
        };
        self.log.append_log(&entry).await
    }

    pub async fn success(
        &self,
        table_name: &str,
        record_count: u64,
        initiated_at: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        self.log(
            table_name,
            record_count,
            RunStatus::Success,
            Utc::now(),
            initiated_at,
            "",
        )
        .await
    }

    pub async fn failure(
        &self,
        table_name: &str,
        initiated_at: DateTime<Utc>,
        error_message: &str,
    ) -> Result<i64, StoreError> {
        self.log(
            table_name,
            0,
            RunStatus::Failure,
            Utc::now(),
            initiated_at,
            error_message,
        )
        .await
    }
}
