//! # sta-csdl
//!
//! Schema codec between CSDL documents and a [`ModelRegistry`](sta_model::ModelRegistry).
//!
//! This crate provides:
//! - `CsdlDocument`: the document tree (schemas, entity types, complex
//!   types, enumerations, type definitions, entity containers)
//! - CSDL JSON parsing and emission (`from_json`, `to_json`)
//! - CSDL XML emission (`to_xml`)
//! - `apply_to`: register a document's types and containers in a registry
//! - `fill_from`: describe a registry as a document
//!
//! ## Round trip
//!
//! Parsing a document, applying it to a fresh registry and filling a new
//! document from that registry gives back the same tree. Defaults are
//! normalised at parse time, so an omitted `$Nullable` and an explicit
//! `false` are indistinguishable.

pub mod apply;
pub mod document;
pub mod error;
pub mod fill;
mod json;
mod xml;

pub use apply::{DESCRIPTION_TERM, KEY_JSON_NAME};
pub use document::{
    ComplexTypeItem, CsdlDocument, EntityContainerItem, EntitySetItem, EntityTypeItem,
    EnumTypeItem, NavigationPropertyItem, PropertyItem, Schema, SchemaItem, StructuralProperty,
    TypeDefinitionItem,
};
pub use error::CsdlError;
pub use fill::CONTAINER_NAME;
