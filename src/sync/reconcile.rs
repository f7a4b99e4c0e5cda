//! Upsert merged remote records into the local entity tables.
//!
//! Records are matched on the natural key of the target table. A match is
//! updated in place (mapped columns only), a miss is created. Nothing is ever
//! deleted. The whole batch of writes goes to the store in one transaction.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::mapping::{calendar_date, value_text, Convert, EntityMapping, FieldMapping};
use crate::crm::{MergedRecord, MergedRecords};
use crate::store::{EntityKind, EntityStore, EntityWrite, FieldValue, StoreError};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub created: u64,
    pub updated: u64,
    /// Records dropped because of a per-record problem.
    pub skipped: u64,
}

impl ReconcileSummary {
    /// Local entities written by the run.
    pub fn written(&self) -> u64 {
        self.created + self.updated
    }
}

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Record {remote_id} has no value for natural key '{column}'")]
    MissingKey {
        remote_id: String,
        column: &'static str,
    },

    #[error("Record {remote_id} has no value for reference '{column}'")]
    MissingReference {
        remote_id: String,
        column: &'static str,
    },

    #[error("Record {remote_id} references unknown {table} '{key}'")]
    UnresolvedReference {
        remote_id: String,
        table: &'static str,
        key: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReconcileError {
    /// Whether the error concerns one record only. Such records are skipped;
    /// anything else aborts the run.
    pub fn is_record_level(&self) -> bool {
        !matches!(self, Self::Store(_))
    }
}

/// Caches reference lookups for the duration of one reconcile call.
struct ReferenceResolver<'a> {
    store: &'a dyn EntityStore,
    cache: HashMap<(EntityKind, String), Option<i64>>,
}

impl<'a> ReferenceResolver<'a> {
    fn new(store: &'a dyn EntityStore) -> Self {
        Self {
            store,
            cache: HashMap::new(),
        }
    }

    async fn resolve(&mut self, kind: EntityKind, key: &str) -> Result<Option<i64>, StoreError> {
        let cache_key = (kind, key.to_string());
        if let Some(found) = self.cache.get(&cache_key) {
            return Ok(*found);
        }
        let found = self.store.find_entity_id(kind, key).await?;
        self.cache.insert(cache_key, found);
        Ok(found)
    }
}

fn first_source(record: &MergedRecord, field: &FieldMapping) -> Option<String> {
    field
        .sources
        .iter()
        .filter_map(|source| record.get(source))
        .find_map(value_text)
}

/// Natural key and column values for one record.
async fn map_record(
    record: &MergedRecord,
    mapping: &EntityMapping,
    resolver: &mut ReferenceResolver<'_>,
) -> Result<(String, Vec<(&'static str, FieldValue)>), ReconcileError> {
    let key_column = mapping.kind.key_column();
    let mut key: Option<String> = None;
    let mut values = Vec::with_capacity(mapping.fields.len());

    for field in mapping.fields {
        let raw = first_source(record, field).or_else(|| field.default.map(str::to_string));
        let value = match field.convert {
            Convert::Text => raw.map(FieldValue::Text).unwrap_or(FieldValue::Null),
            Convert::CalendarDate => match raw {
                Some(text) => match calendar_date(&text) {
                    Some(date) => FieldValue::Text(date),
                    None => {
                        warn!(
                            "Record {}: '{}' is not a date for column {}",
                            record.id, text, field.column
                        );
                        FieldValue::Null
                    }
                },
                None => FieldValue::Null,
            },
            Convert::RecordJson => FieldValue::Text(Value::Object(record.fields.clone()).to_string()),
            Convert::Reference(target) => {
                let remote_key = raw.ok_or_else(|| ReconcileError::MissingReference {
                    remote_id: record.id.clone(),
                    column: field.column,
                })?;
                match resolver.resolve(target, &remote_key).await? {
                    Some(local_id) => FieldValue::Integer(local_id),
                    None => {
                        return Err(ReconcileError::UnresolvedReference {
                            remote_id: record.id.clone(),
                            table: target.table(),
                            key: remote_key,
                        })
                    }
                }
            }
            Convert::OptionalReference(target) => match raw {
                Some(remote_key) => match resolver.resolve(target, &remote_key).await? {
                    Some(local_id) => FieldValue::Integer(local_id),
                    None => {
                        debug!(
                            "Record {}: no {} '{}' for column {}",
                            record.id,
                            target.table(),
                            remote_key,
                            field.column
                        );
                        FieldValue::Null
                    }
                },
                None => FieldValue::Null,
            },
        };

        if field.column == key_column {
            key = value.as_text().map(str::to_string);
        }
        values.push((field.column, value));
    }

    let key = key.ok_or_else(|| ReconcileError::MissingKey {
        remote_id: record.id.clone(),
        column: key_column,
    })?;
    Ok((key, values))
}

/// Create or update one local entity per distinct natural key in `records`.
///
/// When two records share a natural key, the later one wins and a warning
/// names both remote ids.
pub async fn reconcile(
    store: &dyn EntityStore,
    records: &MergedRecords,
    mapping: &EntityMapping,
) -> Result<ReconcileSummary, ReconcileError> {
    let kind = mapping.kind;
    let mut resolver = ReferenceResolver::new(store);
    let mut writes: Vec<EntityWrite> = Vec::with_capacity(records.len());
    let mut planned: HashMap<String, (usize, String)> = HashMap::new();
    let mut summary = ReconcileSummary::default();

    for record in records {
        let (key, values) = match map_record(record, mapping, &mut resolver).await {
            Ok(mapped) => mapped,
            Err(e) if e.is_record_level() => {
                warn!("Skipping {} record: {}", kind.table(), e);
                summary.skipped += 1;
                continue;
            }
            Err(e) => return Err(e),
        };

        if let Some((slot, previous_id)) = planned.get_mut(&key) {
            warn!(
                "Records {} and {} share {} '{}'; keeping {}",
                previous_id,
                record.id,
                kind.key_column(),
                key,
                record.id
            );
            *writes[*slot].values_mut() = values;
            *previous_id = record.id.clone();
            continue;
        }

        let write = match store.find_entity_id(kind, &key).await? {
            Some(id) => EntityWrite::Update { id, values },
            None => EntityWrite::Create { values },
        };
        let action = match write {
            EntityWrite::Create { .. } => "create",
            EntityWrite::Update { .. } => "update",
        };
        debug!("{} '{}': {}", kind.table(), key, action);
        planned.insert(key, (writes.len(), record.id.clone()));
        writes.push(write);
    }

    for write in &writes {
        match write {
            EntityWrite::Create { .. } => summary.created += 1,
            EntityWrite::Update { .. } => summary.updated += 1,
        }
    }

    store.apply_writes(kind, &writes).await?;

    info!(
        "{}: {} created, {} updated, {} skipped",
        kind.table(),
        summary.created,
        summary.updated,
        summary.skipped
    );
    Ok(summary)
}

/// Create the partner contact of every organization whose email has no
/// contact yet. Existing contacts are left as they are.
///
/// Returns the number of contacts created.
pub async fn ensure_partner_contacts(
    store: &dyn EntityStore,
    organizations: &MergedRecords,
) -> Result<u64, ReconcileError> {
    let mut seen = HashSet::new();
    let mut writes = Vec::new();

    for record in organizations {
        let Some(email) = record.get("email").and_then(value_text) else {
            continue;
        };
        if !seen.insert(email.clone()) {
            continue;
        }
        if store.find_entity_id(EntityKind::Contact, &email).await?.is_some() {
            continue;
        }
        let name = ["contact_name", "name"]
            .iter()
            .filter_map(|field| record.get(field))
            .find_map(value_text)
            .map(FieldValue::Text)
            .unwrap_or(FieldValue::Null);
        debug!("contacts '{}': create partner for {}", email, record.id);
        writes.push(EntityWrite::Create {
            values: vec![("email", FieldValue::Text(email)), ("name", name)],
        });
    }

    if !writes.is_empty() {
        store.apply_writes(EntityKind::Contact, &writes).await?;
        info!("contacts: {} partner contacts created", writes.len());
    }
    Ok(writes.len() as u64)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::crm::{merge, PartialRecord};
    use crate::store::{LocalEntity, SqliteRecordStore};
    use crate::sync::mapping::{COMPANIES, CONTACTS, PRODUCTS, PROJECTS};

    fn partial(value: Value) -> PartialRecord {
        PartialRecord::from_raw(value.as_object().unwrap().clone()).unwrap()
    }

    fn merged(values: Vec<Value>) -> MergedRecords {
        merge(values.into_iter().map(partial))
    }

    /// Key `A`, plus `B` and `C`, written into the contacts table.
    const ABC: EntityMapping = EntityMapping {
        kind: EntityKind::Contact,
        fields: &[
            FieldMapping::text("email", &["A"]),
            FieldMapping::text("name", &["B"]),
            FieldMapping::text("comment", &["C"]),
        ],
    };

    #[tokio::test]
    async fn test_batched_fields_merge_into_one_entity() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let records = merge(vec![
            partial(json!({"id": "1", "A": "x", "B": "y"})),
            partial(json!({"id": "1", "C": "z"})),
        ]);

        let summary = reconcile(&store, &records, &ABC).await.unwrap();
        assert_eq!(
            summary,
            ReconcileSummary {
                created: 1,
                updated: 0,
                skipped: 0
            }
        );

        let entity = store.get_entity(EntityKind::Contact, "x").await.unwrap().unwrap();
        assert_eq!(entity.text("name"), Some("y"));
        assert_eq!(entity.text("comment"), Some("z"));
        assert_eq!(store.count_entities(EntityKind::Contact).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let records = merged(vec![json!({"id": "9", "Email": "a@x", "Full_Name": "Ann"})]);

        let first = reconcile(&store, &records, &CONTACTS).await.unwrap();
        let second = reconcile(&store, &records, &CONTACTS).await.unwrap();
        assert_eq!(first.created, 1);
        assert_eq!(second.created, 0);
        assert_eq!(second.updated, 1);
        assert_eq!(store.count_entities(EntityKind::Contact).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_contact_comment_holds_record_json() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let records = merged(vec![json!({"id": "9", "Email": "a@x", "Full_Name": "Ann"})]);
        reconcile(&store, &records, &CONTACTS).await.unwrap();

        let entity = store.get_entity(EntityKind::Contact, "a@x").await.unwrap().unwrap();
        let comment: Value = serde_json::from_str(entity.text("comment").unwrap()).unwrap();
        assert_eq!(comment["Full_Name"], "Ann");
        assert_eq!(entity.text("remote_id"), Some("9"));
    }

    #[tokio::test]
    async fn test_local_only_columns_survive_update() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let records = merged(vec![json!({"id": "9", "Email": "a@x", "Full_Name": "Ann"})]);
        reconcile(&store, &records, &CONTACTS).await.unwrap();

        let id = store
            .find_entity_id(EntityKind::Contact, "a@x")
            .await
            .unwrap()
            .unwrap();
        store
            .apply_writes(
                EntityKind::Contact,
                &[EntityWrite::Update {
                    id,
                    values: vec![("notes", FieldValue::from("VIP"))],
                }],
            )
            .await
            .unwrap();

        let renamed = merged(vec![json!({"id": "9", "Email": "a@x", "Full_Name": "Ann Lee"})]);
        reconcile(&store, &renamed, &CONTACTS).await.unwrap();

        let entity = store.get_entity(EntityKind::Contact, "a@x").await.unwrap().unwrap();
        assert_eq!(entity.id, id);
        assert_eq!(entity.text("name"), Some("Ann Lee"));
        assert_eq!(entity.text("notes"), Some("VIP"));
    }

    #[tokio::test]
    async fn test_missing_key_is_skipped() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let records = merged(vec![
            json!({"id": "1", "Full_Name": "No Mail"}),
            json!({"id": "2", "Email": "b@x"}),
        ]);
        let summary = reconcile(&store, &records, &CONTACTS).await.unwrap();
        assert_eq!(summary.created, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[tokio::test]
    async fn test_key_collision_last_record_wins() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let records = merged(vec![
            json!({"id": "1", "Email": "same@x", "Full_Name": "First"}),
            json!({"id": "2", "Email": "same@x", "Full_Name": "Second"}),
        ]);
        let summary = reconcile(&store, &records, &CONTACTS).await.unwrap();
        assert_eq!(summary.created, 1);
        assert_eq!(summary.updated, 0);

        let entity = store.get_entity(EntityKind::Contact, "same@x").await.unwrap().unwrap();
        assert_eq!(entity.text("name"), Some("Second"));
        assert_eq!(entity.text("remote_id"), Some("2"));
    }

    #[tokio::test]
    async fn test_product_code_falls_back_to_name() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let records = merged(vec![
            json!({"id": "1", "Product_Code": "P-1", "Product_Name": "Widget", "Unit_Price": 12.5}),
            json!({"id": "2", "Product_Code": null, "Product_Name": "Gadget"}),
        ]);
        let summary = reconcile(&store, &records, &PRODUCTS).await.unwrap();
        assert_eq!(summary.created, 2);

        let widget = store.get_entity(EntityKind::Product, "P-1").await.unwrap().unwrap();
        assert_eq!(widget.text("unit_price"), Some("12.5"));
        let gadget = store.get_entity(EntityKind::Product, "Gadget").await.unwrap().unwrap();
        assert_eq!(gadget.text("name"), Some("Gadget"));
        assert_eq!(gadget.text("remote_id"), Some("2"));
    }

    #[tokio::test]
    async fn test_projects_resolve_company_and_dates() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let orgs = merged(vec![json!({"id": "777", "organization_id": "777", "name": "Zillum"})]);
        reconcile(&store, &orgs, &COMPANIES).await.unwrap();
        let company_id = store
            .find_entity_id(EntityKind::Company, "777")
            .await
            .unwrap()
            .unwrap();

        let projects = merged(vec![
            json!({
                "id": "p1",
                "Organisation_ID": "777",
                "Description_of_Land": "Plot 4",
                "Anticipated_Start_Date": "2024-03-01T09:30:00+05:30",
                "Anticipated_Completion_Date": "2025-06-30"
            }),
            json!({"id": "p2", "Organisation_ID": "999", "Name": "Orphan"}),
            json!({"id": "p3", "Name": "No org"}),
        ]);
        let summary = reconcile(&store, &projects, &PROJECTS).await.unwrap();
        assert_eq!(summary.created, 1);
        assert_eq!(summary.skipped, 2);

        let project: LocalEntity = store
            .get_entity(EntityKind::Project, "p1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(project.text("name"), Some("Unnamed Project"));
        assert_eq!(project.text("description"), Some("Plot 4"));
        assert_eq!(project.text("date_start"), Some("2024-03-01"));
        assert_eq!(project.text("date_end"), Some("2025-06-30"));
        assert_eq!(
            project.values.get("company_id"),
            Some(&FieldValue::Integer(company_id))
        );
    }

    #[tokio::test]
    async fn test_building_preferred_over_land_description() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let orgs = merged(vec![json!({"id": "1", "organization_id": "1"})]);
        reconcile(&store, &orgs, &COMPANIES).await.unwrap();
        let projects = merged(vec![json!({
            "id": "p1",
            "Organisation_ID": "1",
            "Name": "Tower",
            "Building": "Block A",
            "Description_of_Land": "Plot 4"
        })]);
        reconcile(&store, &projects, &PROJECTS).await.unwrap();
        let project = store.get_entity(EntityKind::Project, "p1").await.unwrap().unwrap();
        assert_eq!(project.text("description"), Some("Block A"));
        assert_eq!(project.text("name"), Some("Tower"));
    }

    #[tokio::test]
    async fn test_partner_contacts_created_once_and_linked() {
        let store = SqliteRecordStore::open_in_memory().unwrap();
        let existing = merged(vec![json!({"id": "c1", "Email": "ops@acme.test", "Full_Name": "Ops Desk"})]);
        reconcile(&store, &existing, &CONTACTS).await.unwrap();

        let orgs = merged(vec![
            json!({"id": "1", "organization_id": "1", "name": "Zillum", "contact_name": "Ann Lee", "email": "ann@zillum.test"}),
            json!({"id": "2", "organization_id": "2", "name": "Acme", "contact_name": "Someone Else", "email": "ops@acme.test"}),
            json!({"id": "3", "organization_id": "3", "name": "No Mail"}),
        ]);
        let created = ensure_partner_contacts(&store, &orgs).await.unwrap();
        assert_eq!(created, 1);
        assert_eq!(ensure_partner_contacts(&store, &orgs).await.unwrap(), 0);

        let ann = store
            .get_entity(EntityKind::Contact, "ann@zillum.test")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ann.text("name"), Some("Ann Lee"));
        let ops = store
            .get_entity(EntityKind::Contact, "ops@acme.test")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ops.text("name"), Some("Ops Desk"));

        let summary = reconcile(&store, &orgs, &COMPANIES).await.unwrap();
        assert_eq!(summary.created, 3);
        assert_eq!(summary.skipped, 0);
        let zillum = store.get_entity(EntityKind::Company, "1").await.unwrap().unwrap();
        assert_eq!(zillum.values.get("partner_id"), Some(&FieldValue::Integer(ann.id)));
        assert_eq!(zillum.text("contact_name"), Some("Ann Lee"));
        let acme = store.get_entity(EntityKind::Company, "2").await.unwrap().unwrap();
        assert_eq!(acme.values.get("partner_id"), Some(&FieldValue::Integer(ops.id)));
        let no_mail = store.get_entity(EntityKind::Company, "3").await.unwrap().unwrap();
        assert_eq!(no_mail.values.get("partner_id"), Some(&FieldValue::Null));
    }

    struct BrokenStore;

    #[async_trait]
    impl EntityStore for BrokenStore {
        async fn find_entity_id(
            &self,
            _kind: EntityKind,
            _key: &str,
        ) -> Result<Option<i64>, StoreError> {
            Ok(None)
        }

        async fn apply_writes(
            &self,
            _kind: EntityKind,
            _writes: &[EntityWrite],
        ) -> Result<(), StoreError> {
            Err(StoreError::Query("disk I/O error".into()))
        }

        async fn get_entity(
            &self,
            _kind: EntityKind,
            _key: &str,
        ) -> Result<Option<LocalEntity>, StoreError> {
            Ok(None)
        }

        async fn count_entities(&self, _kind: EntityKind) -> Result<u64, StoreError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_store_failure_aborts_reconcile() {
        let records = merged(vec![json!({"id": "1", "Email": "a@x"})]);
        let err = reconcile(&BrokenStore, &records, &CONTACTS)
            .await
            .unwrap_err();
        assert!(!err.is_record_level());
        assert!(err.to_string().contains("disk I/O error"));
    }
}
