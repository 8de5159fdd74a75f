//! Database schema introspection and property resolution.
//!
//! Retrieves the database definition once per run and answers the questions
//! the exporter needs: which property groups the pages, which one is the
//! title, and which properties best serve as section and ordering columns.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::AppError;
use crate::notion::client::NotionClient;
use crate::notion::text::normalize;

/// Kinds of properties usable for grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupPropertyKind {
    Select,
    MultiSelect,
    Status,
}

impl GroupPropertyKind {
    /// Parses the Notion property type string.
    fn from_type(t: &str) -> Option<Self> {
        match t {
            "select" => Some(GroupPropertyKind::Select),
            "multi_select" => Some(GroupPropertyKind::MultiSelect),
            "status" => Some(GroupPropertyKind::Status),
            _ => None,
        }
    }

    /// The JSON key the property value lives under on a page.
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupPropertyKind::Select => "select",
            GroupPropertyKind::MultiSelect => "multi_select",
            GroupPropertyKind::Status => "status",
        }
    }
}

/// One configured option of a select/multi_select/status property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub id: String,
    pub name: String,
}

/// The resolved grouping property.
#[derive(Debug, Clone)]
pub struct GroupProperty {
    /// The property's actual name in the schema (may differ from the
    /// configured name in accents or casing).
    pub name: String,
    pub kind: GroupPropertyKind,
    /// Configured options, in schema order.
    pub options: Vec<SelectOption>,
}

/// Database schema as retrieved from the API, reduced to what the exporter
/// needs: property names mapped to their type strings plus raw metadata.
#[derive(Debug, Clone)]
pub struct DatabaseSchema {
    properties: BTreeMap<String, Value>,
}

/// Candidate names for the section property, normalized.
const SECTION_CANDIDATES: &[&str] = &[
    "szakasz", "szekcio", "section", "modul", "fejezet", "resz", "chapter",
];

/// Candidate names for the ordering property, normalized.
const ORDER_CANDIDATES: &[&str] = &["sorszam", "sorrend", "order", "index", "pozicio", "rank"];

impl DatabaseSchema {
    /// Retrieves the schema for a database.
    pub async fn retrieve(client: &NotionClient, database_id: &str) -> Result<Self, AppError> {
        let value = client
            .get(&format!("/v1/databases/{}", database_id))
            .await?;
        Ok(Self::from_value(&value))
    }

    /// Builds a schema view from the raw database object.
    pub fn from_value(value: &Value) -> Self {
        let mut properties = BTreeMap::new();
        if let Some(props) = value.get("properties").and_then(Value::as_object) {
            for (name, meta) in props {
                properties.insert(name.clone(), meta.clone());
            }
        }
        Self { properties }
    }

    fn property_type(meta: &Value) -> &str {
        meta.get("type").and_then(Value::as_str).unwrap_or("")
    }

    /// Name of the title property, if the schema has one.
    pub fn title_property(&self) -> Option<String> {
        self.properties
            .iter()
            .find(|(_, meta)| Self::property_type(meta) == "title")
            .map(|(name, _)| name.clone())
    }

    /// Best-effort section property: a known candidate name first, otherwise
    /// the first select/multi_select/status property.
    pub fn section_property(&self) -> Option<String> {
        for name in self.properties.keys() {
            if SECTION_CANDIDATES.contains(&normalize(name).as_str()) {
                return Some(name.clone());
            }
        }
        self.properties
            .iter()
            .find(|(_, meta)| {
                matches!(
                    Self::property_type(meta),
                    "select" | "multi_select" | "status"
                )
            })
            .map(|(name, _)| name.clone())
    }

    /// Best-effort ordering property: a known candidate name first, otherwise
    /// the first number property.
    pub fn order_property(&self) -> Option<String> {
        for name in self.properties.keys() {
            if ORDER_CANDIDATES.contains(&normalize(name).as_str()) {
                return Some(name.clone());
            }
        }
        self.properties
            .iter()
            .find(|(_, meta)| Self::property_type(meta) == "number")
            .map(|(name, _)| name.clone())
    }

    /// Resolves the grouping property by exact name, then by normalized name.
    ///
    /// # Errors
    ///
    /// - `AppError::NotFound` when no property matches the wanted name.
    /// - `AppError::NotionError` when the property exists but is not a
    ///   select/multi_select/status property and cannot group pages.
    pub fn group_property(&self, wanted: &str) -> Result<GroupProperty, AppError> {
        let (name, meta) = match self.properties.get_key_value(wanted) {
            Some((name, meta)) => (name.clone(), meta),
            None => {
                let norm_wanted = normalize(wanted);
                self.properties
                    .iter()
                    .find(|(name, _)| normalize(name) == norm_wanted)
                    .map(|(name, meta)| (name.clone(), meta))
                    .ok_or_else(|| {
                        AppError::NotFound(format!("Grouping property not in schema: {}", wanted))
                    })?
            }
        };

        let type_str = Self::property_type(meta);
        let kind = GroupPropertyKind::from_type(type_str).ok_or_else(|| AppError::NotionError {
            code: "unsupported_property".into(),
            message: format!("Property '{}' has type '{}', expected select/multi_select/status", name, type_str),
        })?;

        let options = meta
            .get(kind.as_str())
            .and_then(|v| v.get("options"))
            .and_then(Value::as_array)
            .map(|opts| {
                opts.iter()
                    .filter_map(|opt| {
                        let id = opt.get("id")?.as_str()?.to_string();
                        let name = opt
                            .get("name")
                            .and_then(Value::as_str)
                            .unwrap_or("")
                            .to_string();
                        Some(SelectOption { id, name })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(GroupProperty {
            name,
            kind,
            options,
        })
    }
}
