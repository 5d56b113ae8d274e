use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A group of fields shown, required and completed as a unit
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Section {
    pub id: String,
    pub title: String,
    /// Field ids in this section
    pub fields: Vec<String>,
    /// Visible while this holds; always visible when absent
    #[serde(alias = "showFormula", skip_serializing_if = "Option::is_none")]
    pub show_condition: Option<String>,
    /// Required while this holds; optional when absent
    #[serde(alias = "requiredFormula", skip_serializing_if = "Option::is_none")]
    pub required_condition: Option<String>,
    /// Complete while this holds; when absent, complete once every required
    /// field of the section is filled
    #[serde(alias = "completionFormula", skip_serializing_if = "Option::is_none")]
    pub completion_condition: Option<String>,
    /// Position in the form; ties keep registration order
    pub order: i32,
    /// May be left incomplete when moving on
    pub allow_skip: bool,
    /// Move on automatically once complete
    pub auto_advance: bool,
    pub advance_delay_ms: u64,
}

impl Section {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn show_when(mut self, formula: impl Into<String>) -> Self {
        self.show_condition = Some(formula.into());
        self
    }

    pub fn required_when(mut self, formula: impl Into<String>) -> Self {
        self.required_condition = Some(formula.into());
        self
    }

    pub fn complete_when(mut self, formula: impl Into<String>) -> Self {
        self.completion_condition = Some(formula.into());
        self
    }

    pub fn skippable(mut self) -> Self {
        self.allow_skip = true;
        self
    }

    pub fn with_auto_advance(mut self, delay_ms: u64) -> Self {
        self.auto_advance = true;
        self.advance_delay_ms = delay_ms;
        self
    }
}

/// Navigation state of a form, as exported to and imported from the host
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlowState {
    pub current_section_id: Option<String>,
    pub completed_section_ids: BTreeSet<String>,
    pub visited_section_ids: BTreeSet<String>,
    /// Previously current sections, most recent last
    pub navigation_history: Vec<String>,
}

impl FlowState {
    /// Forget everything about a section
    pub(crate) fn forget(&mut self, id: &str) {
        if self.current_section_id.as_deref() == Some(id) {
            self.current_section_id = None;
        }
        self.completed_section_ids.remove(id);
        self.visited_section_ids.remove(id);
        self.navigation_history.retain(|h| h != id);
    }
}
