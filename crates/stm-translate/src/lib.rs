//! # stm-translate
//!
//! Translation engine turning a decoded STIX 2.0 bundle into a MISP event.
//!
//! Leaf-first:
//! - [`tables`]: field-key tables per object category ([`FieldMapper`])
//! - [`walker`]: dereferencing of observed-data reference graphs
//! - [`dispatcher`]: classification of each source object
//! - [`builder`]: assembly of attributes, objects and composite children
//! - [`run`]: the per-bundle loop with isolated per-object failures
//! - [`report`]: counts and diagnostics of one run

pub mod builder;
pub mod dispatcher;
pub mod report;
pub mod run;
pub mod tables;
pub mod walker;

pub use builder::ObjectBuilder;
pub use dispatcher::{Decision, Dispatcher};
pub use report::{RunReport, SkipRecord};
pub use run::{TranslationOutcome, TranslationRun};
pub use tables::{FieldMapper, Fragment, MappedField, Mapping, MappingTables};
pub use walker::{FlatField, FlatRecord, ObservableWalker, WalkOutcome};
