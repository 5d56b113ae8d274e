//! Calculated fields and validation rules
//!
//! [`CalculationRegistry`] keeps the calculation fields and validation rules of
//! one form together with the dependency graph built from their formulas.
//! When a field changes, the registry yields the calculation fields to
//! recompute (in dependency order) and the validation targets to re-check.
//!
//! # Example
//!
//! ```rust
//! use formflow::calculation::{CalculationOptions, CalculationRegistry};
//! use formflow::format::FormatOptions;
//! use formflow_core::{FieldMap, FormData, Value};
//!
//! let mut registry = CalculationRegistry::new();
//! registry.register_calculation_field(
//!     "Total",
//!     "SUM([Qty],[Price])",
//!     CalculationOptions::formatted(FormatOptions::currency()),
//! );
//!
//! let mut data = FormData::new();
//! data.insert("Qty".into(), Value::from(3));
//! data.insert("Price".into(), Value::from(10));
//!
//! let total = registry.calculate_field_value("Total", &data, &FieldMap::new());
//! assert_eq!(total, "$13.00");
//! ```

use crate::error::ConfigError;
use crate::format::{format_value, FormatOptions};
use formflow_core::{FieldMap, FormData, Value};
use formflow_formula::{DependencyGraph, FormulaEngine, NodeKey};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Priority given to the violation recorded for a rule that fails to evaluate
pub const FAILED_RULE_PRIORITY: i32 = 999;

/// When the host should recompute a calculation field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    /// On every change of a dependency
    #[default]
    Realtime,
    /// When a dependency loses focus
    OnBlur,
    /// Only on submission
    OnSubmit,
}

/// Severity of a validation rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Error,
    Warning,
    Info,
}

/// Options for registering a calculation field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalculationOptions {
    pub update_mode: UpdateMode,
    pub format: FormatOptions,
}

impl CalculationOptions {
    /// Realtime updates with the given format
    pub fn formatted(format: FormatOptions) -> Self {
        Self {
            update_mode: UpdateMode::Realtime,
            format,
        }
    }
}

/// Options for registering a validation rule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleOptions {
    pub severity: Severity,
    /// Rules run in ascending priority
    pub priority: i32,
}

/// A field whose value derives from a formula
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationField {
    pub field_id: String,
    pub formula: String,
    /// Field names referenced by the formula
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub update_mode: UpdateMode,
    #[serde(default)]
    pub format: FormatOptions,
}

/// A rule that must hold for a field's value to be accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRule {
    pub field_id: String,
    pub formula: String,
    pub message: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub priority: i32,
}

/// A failed validation rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub field_id: String,
    pub message: String,
    pub severity: Severity,
    pub priority: i32,
}

/// Result of recomputing one calculation field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedValue {
    pub field_id: String,
    /// Raw value written back into the form data (null on failure)
    pub value: Value,
    /// Formatted value (empty on failure)
    pub display: String,
}

/// Exported registry configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistryConfiguration {
    pub calculations: Vec<CalculationField>,
    pub validations: Vec<ValidationRule>,
}

impl RegistryConfiguration {
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Calculation and validation registry for one form
#[derive(Debug, Default)]
pub struct CalculationRegistry {
    engine: FormulaEngine,
    calculations: BTreeMap<String, CalculationField>,
    /// Rules per field, kept sorted by priority
    validations: BTreeMap<String, Vec<ValidationRule>>,
    graph: DependencyGraph,
}

impl CalculationRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a calculation field.
    ///
    /// Dependencies are extracted from the formula text. A formula that closes
    /// a dependency cycle is accepted; each field of the cycle is recomputed
    /// once per change.
    pub fn register_calculation_field(
        &mut self,
        field_id: impl Into<String>,
        formula: impl Into<String>,
        options: CalculationOptions,
    ) -> &CalculationField {
        let field_id = field_id.into();
        let formula = formula.into();
        let dependencies = self.engine.get_dependencies(&formula);

        let node = NodeKey::Field(field_id.clone());
        self.graph.set_dependencies(node.clone(), dependencies.iter().cloned());
        if self.graph.has_circular_reference(&node) {
            warn!("calculation field {} is part of a dependency cycle", field_id);
        }

        debug!("registered calculation field {} <- {:?}", field_id, dependencies);
        let field = CalculationField {
            field_id: field_id.clone(),
            formula,
            dependencies,
            update_mode: options.update_mode,
            format: options.format,
        };
        self.calculations.insert(field_id.clone(), field);
        &self.calculations[&field_id]
    }

    /// Remove a calculation field. Fields that reference it keep their edges.
    pub fn unregister_calculation_field(&mut self, field_id: &str) -> Option<CalculationField> {
        let removed = self.calculations.remove(field_id)?;
        self.graph.clear_precedents(&NodeKey::field(field_id));
        Some(removed)
    }

    /// Add a validation rule to a field
    pub fn register_validation_rule(
        &mut self,
        field_id: impl Into<String>,
        formula: impl Into<String>,
        message: impl Into<String>,
        options: RuleOptions,
    ) -> &ValidationRule {
        let field_id = field_id.into();
        let rule = ValidationRule {
            field_id: field_id.clone(),
            formula: formula.into(),
            message: message.into(),
            severity: options.severity,
            priority: options.priority,
        };

        let rules = self.validations.entry(field_id.clone()).or_default();
        rules.push(rule);
        // Stable: equal priorities keep registration order
        rules.sort_by_key(|r| r.priority);

        self.rebuild_validation_node(&field_id);

        let rules = &self.validations[&field_id];
        let index = rules
            .iter()
            .rposition(|r| r.priority == options.priority)
            .unwrap_or(rules.len() - 1);
        &rules[index]
    }

    /// Remove every validation rule of a field
    pub fn unregister_validation_rules(&mut self, field_id: &str) -> Vec<ValidationRule> {
        self.graph.clear_precedents(&NodeKey::validation(field_id));
        self.validations.remove(field_id).unwrap_or_default()
    }

    /// The validation node depends on the field itself and on everything its
    /// rules reference
    fn rebuild_validation_node(&mut self, field_id: &str) {
        let mut dependencies = vec![field_id.to_string()];
        for rule in self.validations.get(field_id).into_iter().flatten() {
            for name in self.engine.get_dependencies(&rule.formula) {
                if !dependencies.contains(&name) {
                    dependencies.push(name);
                }
            }
        }
        self.graph
            .set_dependencies(NodeKey::validation(field_id), dependencies);
    }

    pub fn calculation_field(&self, field_id: &str) -> Option<&CalculationField> {
        self.calculations.get(field_id)
    }

    /// All calculation fields, by id
    pub fn calculation_fields(&self) -> impl Iterator<Item = &CalculationField> {
        self.calculations.values()
    }

    /// Validation rules of a field, in evaluation order
    pub fn validation_rules(&self, field_id: &str) -> &[ValidationRule] {
        self.validations
            .get(field_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Calculation fields affected by a change to `changed`, in dependency
    /// order. Each field is reported once, even inside a cycle.
    pub fn get_affected_fields(&self, changed: &str) -> Vec<String> {
        self.graph
            .get_recalc_order(&[NodeKey::field(changed)])
            .into_iter()
            .filter(|node| node.is_field() && self.calculations.contains_key(node.id()))
            .map(|node| node.id().to_string())
            .collect()
    }

    /// Fields whose validation rules must be re-checked after a change to
    /// `changed`, including through recomputed calculation fields
    pub fn get_affected_validations(&self, changed: &str) -> Vec<String> {
        self.graph
            .get_recalc_order(&[NodeKey::field(changed)])
            .into_iter()
            .filter(|node| !node.is_field())
            .map(|node| node.id().to_string())
            .collect()
    }

    /// Raw value of a calculation field; `None` when the field is unknown or
    /// its formula fails
    pub fn calculate_raw_value(
        &mut self,
        field_id: &str,
        form_data: &FormData,
        field_map: &FieldMap,
    ) -> Option<Value> {
        let field = self.calculations.get(field_id)?;
        match self.engine.try_evaluate(&field.formula, form_data, field_map) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("calculation of {} failed: {}", field_id, e);
                None
            }
        }
    }

    /// Evaluate a calculation field and format it for display.
    /// Returns empty text when the field is unknown or its formula fails.
    pub fn calculate_field_value(
        &mut self,
        field_id: &str,
        form_data: &FormData,
        field_map: &FieldMap,
    ) -> String {
        match self.calculate_raw_value(field_id, form_data, field_map) {
            Some(value) => format_value(&value, &self.calculations[field_id].format),
            None => String::new(),
        }
    }

    /// Recompute every calculation field affected by a change, in dependency
    /// order, writing each raw result back into `form_data` so later fields see it.
    pub fn apply_change(
        &mut self,
        changed: &str,
        form_data: &mut FormData,
        field_map: &FieldMap,
    ) -> Vec<CalculatedValue> {
        let affected = self.get_affected_fields(changed);
        let mut results = Vec::with_capacity(affected.len());

        for field_id in affected {
            let value = self
                .calculate_raw_value(&field_id, form_data, field_map)
                .unwrap_or_default();
            let display = match value {
                Value::Null => String::new(),
                ref v => format_value(v, &self.calculations[&field_id].format),
            };
            form_data.insert(field_id.clone(), value.clone());
            results.push(CalculatedValue {
                field_id,
                value,
                display,
            });
        }

        results
    }

    /// Check a candidate value against a field's rules.
    ///
    /// Rules run in ascending priority against a copy of the form data holding
    /// the candidate value. Each falsy rule yields one violation; a rule that
    /// fails to evaluate yields an error-severity violation at
    /// [`FAILED_RULE_PRIORITY`] and the remaining rules still run.
    pub fn validate_field(
        &mut self,
        field_id: &str,
        value: &Value,
        form_data: &FormData,
        field_map: &FieldMap,
    ) -> Vec<Violation> {
        let Some(rules) = self.validations.get(field_id) else {
            return Vec::new();
        };

        let mut data = form_data.clone();
        data.insert(field_id.to_string(), value.clone());

        let mut violations = Vec::new();
        for rule in rules {
            match self.engine.try_evaluate(&rule.formula, &data, field_map) {
                Ok(result) if result.to_bool() => {}
                Ok(_) => violations.push(Violation {
                    field_id: field_id.to_string(),
                    message: rule.message.clone(),
                    severity: rule.severity,
                    priority: rule.priority,
                }),
                Err(e) => {
                    warn!("validation rule {:?} on {} failed: {}", rule.formula, field_id, e);
                    violations.push(Violation {
                        field_id: field_id.to_string(),
                        message: format!("Validation rule could not be evaluated: {}", e),
                        severity: Severity::Error,
                        priority: FAILED_RULE_PRIORITY,
                    });
                }
            }
        }

        violations
    }

    /// Validate every field with rules against its current value.
    /// Only fields with violations appear in the result.
    pub fn validate_all(
        &mut self,
        form_data: &FormData,
        field_map: &FieldMap,
    ) -> BTreeMap<String, Vec<Violation>> {
        let field_ids: Vec<String> = self.validations.keys().cloned().collect();
        let mut results = BTreeMap::new();

        for field_id in field_ids {
            let value = form_data.get(&field_id).cloned().unwrap_or_default();
            let violations = self.validate_field(&field_id, &value, form_data, field_map);
            if !violations.is_empty() {
                results.insert(field_id, violations);
            }
        }

        results
    }

    /// Calculation fields that take part in a dependency cycle
    pub fn circular_fields(&self) -> Vec<String> {
        self.graph
            .circular_nodes()
            .into_iter()
            .filter(|node| node.is_field() && self.calculations.contains_key(node.id()))
            .map(|node| node.id().to_string())
            .collect()
    }

    /// Formula engine used by this registry
    pub fn engine_mut(&mut self) -> &mut FormulaEngine {
        &mut self.engine
    }

    /// Remove all fields, rules and graph edges
    pub fn clear(&mut self) {
        self.calculations.clear();
        self.validations.clear();
        self.graph.clear();
    }

    pub fn export_configuration(&self) -> RegistryConfiguration {
        RegistryConfiguration {
            calculations: self.calculations.values().cloned().collect(),
            validations: self.validations.values().flatten().cloned().collect(),
        }
    }

    /// Replace the registry contents. Dependencies are re-extracted from the
    /// formulas rather than taken from the configuration.
    pub fn import_configuration(&mut self, config: RegistryConfiguration) {
        self.clear();
        for field in config.calculations {
            self.register_calculation_field(
                field.field_id,
                field.formula,
                CalculationOptions {
                    update_mode: field.update_mode,
                    format: field.format,
                },
            );
        }
        for rule in config.validations {
            self.register_validation_rule(
                rule.field_id,
                rule.formula,
                rule.message,
                RuleOptions {
                    severity: rule.severity,
                    priority: rule.priority,
                },
            );
        }
    }

    pub fn export_json(&self) -> Result<String, ConfigError> {
        self.export_configuration().to_json()
    }

    pub fn import_json(&mut self, json: &str) -> Result<(), ConfigError> {
        self.import_configuration(RegistryConfiguration::from_json(json)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FormatType;
    use pretty_assertions::assert_eq;

    fn data(pairs: &[(&str, Value)]) -> FormData {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn chain() -> CalculationRegistry {
        let mut registry = CalculationRegistry::new();
        registry.register_calculation_field("C", "[B]*2", CalculationOptions::default());
        registry.register_calculation_field("B", "[A]+1", CalculationOptions::default());
        registry
    }

    #[test]
    fn test_dependencies_extracted() {
        let mut registry = CalculationRegistry::new();
        let field = registry.register_calculation_field(
            "Total",
            "IF([Qty]>0, [Qty]*[Price], 0)",
            CalculationOptions::default(),
        );
        assert_eq!(field.dependencies, vec!["Qty", "Price"]);
    }

    #[test]
    fn test_cascade_order() {
        let registry = chain();
        assert_eq!(registry.get_affected_fields("A"), vec!["B", "C"]);
        assert_eq!(registry.get_affected_fields("B"), vec!["C"]);
        assert!(registry.get_affected_fields("C").is_empty());
        assert!(registry.get_affected_fields("Unrelated").is_empty());
    }

    #[test]
    fn test_apply_change_writes_back_in_order() {
        let mut registry = chain();
        let mut form = data(&[("A", Value::from(4))]);
        let results = registry.apply_change("A", &mut form, &FieldMap::new());

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].field_id, "B");
        assert_eq!(results[0].value, Value::Number(5.0));
        assert_eq!(results[1].display, "10");
        assert_eq!(form["C"], Value::Number(10.0));
    }

    #[test]
    fn test_cycle_is_tolerated() {
        let mut registry = CalculationRegistry::new();
        registry.register_calculation_field("A", "[B]+1", CalculationOptions::default());
        registry.register_calculation_field("B", "[A]+1", CalculationOptions::default());
        registry.register_calculation_field("C", "[B]", CalculationOptions::default());

        assert_eq!(registry.circular_fields(), vec!["A", "B"]);
        assert_eq!(registry.get_affected_fields("A"), vec!["B", "C"]);

        let mut form = FormData::new();
        let results = registry.apply_change("A", &mut form, &FieldMap::new());
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_calculate_field_value_formats() {
        let mut registry = CalculationRegistry::new();
        registry.register_calculation_field(
            "Ratio",
            "[A]/[B]",
            CalculationOptions::formatted(
                FormatOptions::new(FormatType::Percentage).with_precision(1),
            ),
        );
        let fields = FieldMap::new();

        let form = data(&[("A", Value::from(1)), ("B", Value::from(3))]);
        assert_eq!(registry.calculate_field_value("Ratio", &form, &fields), "0.3%");

        // Division by zero degrades to empty
        let form = data(&[("A", Value::from(1))]);
        assert_eq!(registry.calculate_field_value("Ratio", &form, &fields), "");
        assert_eq!(registry.calculate_field_value("Missing", &form, &fields), "");
    }

    #[test]
    fn test_validate_field_priority_and_failures() {
        let mut registry = CalculationRegistry::new();
        registry.register_validation_rule(
            "Age",
            "[Age] < 130",
            "Too old",
            RuleOptions {
                severity: Severity::Warning,
                priority: 5,
            },
        );
        registry.register_validation_rule(
            "Age",
            "[Age] >= 18",
            "Must be an adult",
            RuleOptions::default(),
        );
        registry.register_validation_rule("Age", "BOGUS([Age])", "never shown", RuleOptions {
            severity: Severity::Info,
            priority: 1,
        });

        let rules: Vec<_> = registry
            .validation_rules("Age")
            .iter()
            .map(|r| r.priority)
            .collect();
        assert_eq!(rules, vec![0, 1, 5]);

        let form = FormData::new();
        let fields = FieldMap::new();

        let violations = registry.validate_field("Age", &Value::from(10), &form, &fields);
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].message, "Must be an adult");
        assert_eq!(violations[0].severity, Severity::Error);
        assert_eq!(violations[1].priority, FAILED_RULE_PRIORITY);

        let violations = registry.validate_field("Age", &Value::from(200), &form, &fields);
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].priority, FAILED_RULE_PRIORITY);
        assert_eq!(violations[0].severity, Severity::Error);
        assert_eq!(violations[1].message, "Too old");
        assert_eq!(violations[1].severity, Severity::Warning);

        let violations = registry.validate_field("Age", &Value::from(30), &form, &fields);
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn test_affected_validations_follow_calculations() {
        let mut registry = CalculationRegistry::new();
        registry.register_calculation_field("Total", "[Qty]*[Price]", CalculationOptions::default());
        registry.register_validation_rule("Total", "[Total] <= 1000", "Over budget", RuleOptions::default());
        registry.register_validation_rule("Qty", "[Qty] > 0", "Quantity required", RuleOptions::default());

        assert_eq!(registry.get_affected_fields("Qty"), vec!["Total"]);
        let mut validations = registry.get_affected_validations("Qty");
        validations.sort();
        assert_eq!(validations, vec!["Qty", "Total"]);
        assert_eq!(registry.get_affected_validations("Price"), vec!["Total"]);
    }

    #[test]
    fn test_validate_all() {
        let mut registry = CalculationRegistry::new();
        registry.register_validation_rule("Name", "ISNOTBLANK([Name])", "Name is required", RuleOptions::default());
        registry.register_validation_rule("Email", "CONTAINS([Email], \"@\")", "Invalid email", RuleOptions::default());

        let form = data(&[("Name", Value::text("Ada")), ("Email", Value::text("nope"))]);
        let results = registry.validate_all(&form, &FieldMap::new());
        assert_eq!(results.len(), 1);
        assert_eq!(results["Email"][0].message, "Invalid email");
    }

    #[test]
    fn test_unregister() {
        let mut registry = chain();
        assert!(registry.unregister_calculation_field("B").is_some());
        assert!(registry.get_affected_fields("A").is_empty());
        // C still reacts to B as a plain input
        assert_eq!(registry.get_affected_fields("B"), vec!["C"]);

        registry.register_validation_rule("C", "[C] > 0", "positive", RuleOptions::default());
        assert_eq!(registry.unregister_validation_rules("C").len(), 1);
        assert!(registry.get_affected_validations("C").is_empty());
    }

    #[test]
    fn test_export_import_round_trip() {
        let mut registry = chain();
        registry.register_validation_rule("C", "[C] > 0", "positive", RuleOptions::default());
        let json = registry.export_json().unwrap();

        let mut restored = CalculationRegistry::new();
        restored.import_json(&json).unwrap();
        assert_eq!(restored.export_configuration(), registry.export_configuration());
        assert_eq!(restored.get_affected_fields("A"), vec!["B", "C"]);

        assert!(restored.import_json("{ not json").is_err());
    }
}
