//! # formflow-core
//!
//! Core data structures for the formflow form rule engine.
//!
//! This crate provides the fundamental types shared by the formula engine and
//! the form-level registries:
//! - [`Value`] - A field value (null, boolean, number, text) with the coercion rules
//!   formulas use
//! - [`FieldMeta`] and [`FieldMap`] - Field metadata supplied by the host
//! - [`FormData`] - Current field values keyed by field id or title
//!
//! ## Example
//!
//! ```rust
//! use formflow_core::{FieldMeta, FieldMap, FormData, Value};
//!
//! let mut data = FormData::new();
//! data.insert("f_1".into(), Value::from("Complete"));
//!
//! let mut fields = FieldMap::new();
//! fields.insert("f_1".into(), FieldMeta::new("f_1", "Status", "text"));
//!
//! assert!(data["f_1"].to_bool());
//! ```

pub mod field;
pub mod value;

pub use field::{FieldMap, FieldMeta, FormData};
pub use value::Value;
