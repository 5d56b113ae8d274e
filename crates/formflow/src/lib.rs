//! # formflow
//!
//! Reactive rule engine for dynamic forms.
//!
//! Forms built with formflow describe their behaviour with formulas over the
//! current field values:
//!
//! - Calculated fields recompute in dependency order when an input changes
//! - Validation rules produce prioritized violations with a severity
//! - Multi-step sections show, hide, complete and auto-advance based on the data
//!
//! The formula language itself lives in [`formflow_formula`]; this crate wires
//! it into the [`CalculationRegistry`] and the [`SectionFlow`] state machine.
//!
//! ## Example
//!
//! ```rust
//! use formflow::prelude::*;
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
//! let changes = registry.apply_change("Qty", &mut data, &FieldMap::new());
//! assert_eq!(changes[0].display, "$13.00");
//! assert_eq!(data["Total"], Value::from(13));
//! ```

pub mod calculation;
pub mod error;
pub mod format;
pub mod prelude;
pub mod section;

pub use calculation::{
    CalculatedValue, CalculationField, CalculationOptions, CalculationRegistry,
    RegistryConfiguration, RuleOptions, Severity, UpdateMode, ValidationRule, Violation,
    FAILED_RULE_PRIORITY,
};
pub use error::{ConfigError, FlowError, FlowResult};
pub use format::{format_value, FormatOptions, FormatType};
pub use section::{
    EventCallback, EventCollector, FlowEvent, FlowOptions, FlowState, FormProgress,
    NavigateOptions, Section, SectionFlow, SectionProgress, SubscriptionId,
};

// Re-export the shared data model and the formula engine
pub use formflow_core::{FieldMap, FieldMeta, FormData, Value};
pub use formflow_formula::{FormulaEngine, FormulaError, FormulaResult};
