//! Types for the local records store.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

/// The four local entity tables a sync can write into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Contact,
    Product,
    Project,
    Company,
}

impl EntityKind {
    /// Table backing this entity kind.
    pub fn table(&self) -> &'static str {
        match self {
            Self::Contact => "contacts",
            Self::Product => "products",
            Self::Project => "projects",
            Self::Company => "companies",
        }
    }

    /// Column holding the natural key used to match remote records.
    pub fn key_column(&self) -> &'static str {
        match self {
            Self::Contact => "email",
            Self::Product => "code",
            Self::Project => "external_id",
            Self::Company => "external_org_id",
        }
    }

    /// Columns a sync or a local user may write. Excludes `id` and the
    /// bookkeeping timestamps.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Self::Contact => &["email", "name", "comment", "remote_id", "notes"],
            Self::Product => &[
                "code",
                "name",
                "description",
                "unit_price",
                "remote_id",
                "notes",
            ],
            Self::Project => &[
                "external_id",
                "name",
                "description",
                "company_id",
                "date_start",
                "date_end",
                "notes",
            ],
            Self::Company => &[
                "external_org_id",
                "name",
                "contact_name",
                "partner_id",
                "email",
                "phone",
                "currency_code",
                "time_zone",
                "notes",
            ],
        }
    }
}

/// A single column value as stored locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::from(rusqlite::types::Null),
            Self::Text(s) => ToSqlOutput::from(s.as_str()),
            Self::Integer(i) => ToSqlOutput::from(*i),
        })
    }
}

impl FromSql for FieldValue {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(Self::Null),
            ValueRef::Integer(i) => Ok(Self::Integer(i)),
            ValueRef::Real(f) => Ok(Self::Text(f.to_string())),
            ValueRef::Text(t) => Ok(Self::Text(String::from_utf8_lossy(t).into_owned())),
            ValueRef::Blob(_) => Err(FromSqlError::InvalidType),
        }
    }
}

/// Column assignments for one entity row.
pub type ColumnValues = Vec<(&'static str, FieldValue)>;

/// A planned write against one entity table.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityWrite {
    Create { values: ColumnValues },
    Update { id: i64, values: ColumnValues },
}

impl EntityWrite {
    pub fn values(&self) -> &ColumnValues {
        match self {
            Self::Create { values } | Self::Update { values, .. } => values,
        }
    }

    pub fn values_mut(&mut self) -> &mut ColumnValues {
        match self {
            Self::Create { values } | Self::Update { values, .. } => values,
        }
    }
}

/// A local entity row read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalEntity {
    pub id: i64,
    pub kind: EntityKind,
    pub values: BTreeMap<String, FieldValue>,
}

impl LocalEntity {
    pub fn text(&self, column: &str) -> Option<&str> {
        self.values.get(column).and_then(FieldValue::as_text)
    }
}

/// Outcome of one sync invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Failure,
}

impl RunStatus {
    /// Convert to the string stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    /// Parse from the string stored in the database.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            _ => None,
        }
    }
}

/// One immutable row of the operation log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Name of the credential configuration the run used.
    pub config_ref: String,
    /// Local table the run wrote into.
    pub table_name: String,
    pub record_count: u64,
    pub status: RunStatus,
    /// Empty on success.
    pub error_message: String,
    /// When the run finished.
    pub timestamp: DateTime<Utc>,
    pub initiated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_column_is_writable() {
        for kind in [
            EntityKind::Contact,
            EntityKind::Product,
            EntityKind::Project,
            EntityKind::Company,
        ] {
            assert!(kind.columns().contains(&kind.key_column()));
        }
    }

    #[test]
    fn test_run_status_round_trip() {
        assert_eq!(RunStatus::from_str("success"), Some(RunStatus::Success));
        assert_eq!(RunStatus::from_str("failure"), Some(RunStatus::Failure));
        assert_eq!(RunStatus::from_str("partial"), None);
        assert_eq!(RunStatus::Failure.as_str(), "failure");
    }

    #[test]
    fn test_entity_write_values_mut() {
        let mut write = EntityWrite::Update {
            id: 4,
            values: vec![("name", FieldValue::from("old"))],
        };
        write.values_mut()[0].1 = FieldValue::from("new");
        assert_eq!(write.values()[0].1.as_text(), Some("new"));
    }
}
