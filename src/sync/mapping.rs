//! Remote-field to local-column mappings for each synced module.

use chrono::NaiveDate;
use serde_json::Value;

use crate::store::EntityKind;
use crate::types::SyncModule;

/// How a remote value becomes a column value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convert {
    /// Strings as-is, numbers and booleans stringified.
    Text,
    /// Leading `YYYY-MM-DD` of a date or datetime string.
    CalendarDate,
    /// The whole merged record serialized as JSON. Ignores `sources`.
    RecordJson,
    /// Remote natural key of another entity, resolved to its local id.
    /// A record whose reference is missing or unresolved is skipped.
    Reference(EntityKind),
    /// Like `Reference`, but a missing or unresolved key leaves the column
    /// NULL and the record is kept.
    OptionalReference(EntityKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    pub column: &'static str,
    /// Remote fields tried in order; the first non-empty one wins.
    pub sources: &'static [&'static str],
    pub convert: Convert,
    /// Used when every source is empty.
    pub default: Option<&'static str>,
}

impl FieldMapping {
    pub const fn text(column: &'static str, sources: &'static [&'static str]) -> Self {
        Self {
            column,
            sources,
            convert: Convert::Text,
            default: None,
        }
    }

    pub const fn with(
        column: &'static str,
        sources: &'static [&'static str],
        convert: Convert,
    ) -> Self {
        Self {
            column,
            sources,
            convert,
            default: None,
        }
    }

    pub const fn or_default(self, default: &'static str) -> Self {
        Self {
            default: Some(default),
            ..self
        }
    }
}

/// Target table plus the column mappings for one module.
///
/// The mapping for `kind.key_column()` yields the natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityMapping {
    pub kind: EntityKind,
    pub fields: &'static [FieldMapping],
}

impl EntityMapping {
    pub fn key_field(&self) -> Option<&FieldMapping> {
        let key = self.kind.key_column();
        self.fields.iter().find(|f| f.column == key)
    }
}

pub const CONTACTS: EntityMapping = EntityMapping {
    kind: EntityKind::Contact,
    fields: &[
        FieldMapping::text("email", &["Email"]),
        FieldMapping::text("name", &["Full_Name"]),
        FieldMapping::with("comment", &[], Convert::RecordJson),
        FieldMapping::text("remote_id", &["id"]),
    ],
};

pub const PRODUCTS: EntityMapping = EntityMapping {
    kind: EntityKind::Product,
    fields: &[
        FieldMapping::text("code", &["Product_Code", "Product_Name"]),
        FieldMapping::text("name", &["Product_Name"]),
        FieldMapping::text("description", &["Description"]),
        FieldMapping::text("unit_price", &["Unit_Price"]),
        FieldMapping::text("remote_id", &["id"]),
    ],
};

pub const PROJECTS: EntityMapping = EntityMapping {
    kind: EntityKind::Project,
    fields: &[
        FieldMapping::text("external_id", &["id"]),
        FieldMapping::text("name", &["Name"]).or_default("Unnamed Project"),
        FieldMapping::text("description", &["Building", "Description_of_Land"]),
        FieldMapping::with(
            "company_id",
            &["Organisation_ID"],
            Convert::Reference(EntityKind::Company),
        ),
        FieldMapping::with("date_start", &["Anticipated_Start_Date"], Convert::CalendarDate),
        FieldMapping::with(
            "date_end",
            &["Anticipated_Completion_Date"],
            Convert::CalendarDate,
        ),
    ],
};

pub const COMPANIES: EntityMapping = EntityMapping {
    kind: EntityKind::Company,
    fields: &[
        FieldMapping::text("external_org_id", &["organization_id"]),
        FieldMapping::text("name", &["name"]),
        FieldMapping::text("contact_name", &["contact_name"]),
        FieldMapping::with(
            "partner_id",
            &["email"],
            Convert::OptionalReference(EntityKind::Contact),
        ),
        FieldMapping::text("email", &["email"]),
        FieldMapping::text("phone", &["phone"]),
        FieldMapping::text("currency_code", &["currency_code"]),
        FieldMapping::text("time_zone", &["time_zone"]),
    ],
};

pub fn mapping_for(module: SyncModule) -> &'static EntityMapping {
    match module {
        SyncModule::Contacts => &CONTACTS,
        SyncModule::Products => &PRODUCTS,
        SyncModule::Projects => &PROJECTS,
        SyncModule::Organizations => &COMPANIES,
    }
}

/// Text form of a scalar remote value. Empty strings and nulls count as
/// absent. Lookup objects (`{"name": .., "id": ..}`) yield their id.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(map) => map.get("id").and_then(value_text),
        Value::Array(_) => Some(value.to_string()),
    }
}

/// `YYYY-MM-DD` prefix of `text`, if it is a real calendar date.
pub fn calendar_date(text: &str) -> Option<String> {
    let prefix = text.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()?;
    Some(prefix.to_string())
}
