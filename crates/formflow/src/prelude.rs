//! Prelude module - common imports for formflow users
//!
//! ```rust
//! use formflow::prelude::*;
//! ```

pub use crate::{
    // Calculations and validation
    CalculatedValue,
    CalculationOptions,
    CalculationRegistry,
    // Errors
    FlowError,
    FlowResult,
    // Sections
    FlowEvent,
    FlowOptions,
    FlowState,
    FormProgress,
    // Formatting
    FormatOptions,
    FormatType,
    NavigateOptions,
    RuleOptions,
    Section,
    SectionFlow,
    Severity,
    UpdateMode,
    Violation,
};

pub use crate::{FieldMap, FieldMeta, FormData, FormulaEngine, Value};
