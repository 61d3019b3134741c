//! # stm-core
//!
//! Core types and error taxonomy for stix2misp.
//!
//! This crate provides the foundational types shared across all stix2misp crates:
//! - Source objects decoded from a STIX 2.0 bundle, with their classification hints
//! - Observable sub-objects and their flattened raw fields
//! - The MISP-shaped output model (attributes, objects, galaxies, event)
//! - Object categories and field specs used by the mapping tables
//! - The cross-cutting `TranslationError` taxonomy
//! - Object identifier generation and timestamp helpers
//! - Bundle ingestion (JSON text to typed source objects)

pub mod bundle;
pub mod errors;
pub mod ids;
pub mod mapping;
pub mod observable;
pub mod output;
pub mod source;
pub mod timestamp;
