//! Field metadata supplied by the host form

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Current field values, keyed by field id (or title)
pub type FormData = HashMap<String, Value>;

/// Field metadata, keyed by field id
pub type FieldMap = HashMap<String, FieldMeta>;

/// Metadata describing one form field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMeta {
    /// Stable field id
    pub id: String,
    /// Display title, usable as `[Title]` in formulas
    pub title: String,
    /// Field type as reported by the form builder (text, number, date, ...)
    #[serde(rename = "type", default)]
    pub field_type: String,
    /// Optional alternate name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Whether the field must be filled before its section counts as complete
    #[serde(default)]
    pub required: bool,
}

impl FieldMeta {
    pub fn new(id: impl Into<String>, title: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            field_type: field_type.into(),
            name: None,
            required: false,
        }
    }

    /// Mark the field as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set an alternate lookup name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Does `key` name this field by id, title or alternate name?
    pub fn matches(&self, key: &str) -> bool {
        self.id == key || self.title == key || self.name.as_deref() == Some(key)
    }
}
