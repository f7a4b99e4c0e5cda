//! Module sync pipeline: token check → schema → batched fetch → merge →
//! reconcile → operation log.

pub mod log;
pub mod mapping;
pub mod reconcile;

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::crm::{merge, CrmClient, CrmError, FetchOptions};
use crate::store::{EntityStore, StoreError};
use crate::types::SyncModule;

use self::log::OperationLogger;
use self::mapping::mapping_for;
use self::reconcile::{ensure_partner_contacts, reconcile, ReconcileError, ReconcileSummary};

pub const DEFAULT_PROJECT_MODULE: &str = "Property_Project";

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Crm(#[from] CrmError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error("Failed to write operation log: {0}")]
    Log(#[source] StoreError),
}

/// Everything a module sync needs for one credential configuration.
pub struct SyncContext {
    pub client: CrmClient,
    pub entities: Arc<dyn EntityStore>,
    pub logger: OperationLogger,
    pub options: FetchOptions,
    /// API name of the custom module holding projects.
    pub project_module: String,
}

impl SyncContext {
    /// Remote API name for a CRM-backed module.
    fn api_name(&self, module: SyncModule) -> &str {
        match module {
            SyncModule::Contacts => "Contacts",
            SyncModule::Products => "Products",
            SyncModule::Projects => &self.project_module,
            SyncModule::Organizations => "organizations",
        }
    }

    async fn execute(&self, module: SyncModule) -> Result<ReconcileSummary, SyncError> {
        let partials = match module {
            SyncModule::Organizations => self.client.fetch_organizations().await?,
            _ => {
                let api_name = self.api_name(module);
                let fields = self.client.fetch_module_fields(api_name).await?;
                self.client.fetch_all(api_name, &fields, self.options).await?
            }
        };
        let merged = merge(partials);
        if module == SyncModule::Organizations {
            ensure_partner_contacts(self.entities.as_ref(), &merged).await?;
        }
        info!(
            "{}: {} records after merging",
            self.api_name(module),
            merged.len()
        );
        Ok(reconcile(self.entities.as_ref(), &merged, mapping_for(module)).await?)
    }

    /// Run one module sync end to end and record its outcome.
    ///
    /// Exactly one operation log entry is appended, on success or failure.
    pub async fn run_module(&self, module: SyncModule) -> Result<ReconcileSummary, SyncError> {
        let table = mapping_for(module).kind.table();
        let initiated_at = Utc::now();
        info!("Syncing {} into {}", module.as_str(), table);

        match self.execute(module).await {
            Ok(summary) => {
                self.logger
                    .success(table, summary.written(), initiated_at)
                    .await
                    .map_err(SyncError::Log)?;
                Ok(summary)
            }
            Err(e) => {
                error!("Sync of {} failed: {}", module.as_str(), e);
                if let Err(log_err) = self
                    .logger
                    .failure(table, initiated_at, &e.to_string())
                    .await
                {
                    error!("Could not record failure in operation log: {}", log_err);
                }
                Err(e)
            }
        }
    }

    /// Run `modules` in order, continuing past module failures. Returns the
    /// number of modules that failed.
    ///
    /// A token failure ends the run: the remaining modules are logged as
    /// failed with the same message and no further request is made.
    pub async fn run_modules(&self, modules: &[SyncModule]) -> usize {
        let mut failed = 0;
        for (i, &module) in modules.iter().enumerate() {
            match self.run_module(module).await {
                Ok(summary) => info!(
                    "{}: done ({} created, {} updated, {} skipped)",
                    module.as_str(),
                    summary.created,
                    summary.updated,
                    summary.skipped
                ),
                Err(SyncError::Crm(e)) if e.is_auth() => {
                    warn!("Authorization failed; run `crm-sync authorize` to grant access again");
                    let skipped = &modules[i + 1..];
                    self.log_skipped(skipped, &e.to_string()).await;
                    return failed + 1 + skipped.len();
                }
                Err(_) => failed += 1,
            }
        }
        failed
    }

    async fn log_skipped(&self, modules: &[SyncModule], message: &str) {
        for &module in modules {
            let table = mapping_for(module).kind.table();
            if let Err(e) = self.logger.failure(table, Utc::now(), message).await {
                error!("Could not record failure in operation log: {}", e);
            }
        }
    }
}
