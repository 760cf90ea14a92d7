//! # sta-model
//!
//! Metadata model and data binding for SensorThings-style REST APIs.
//!
//! This crate provides:
//! - `TypeCatalog` / `PropertyType`: primitive, simple, complex, collection
//!   and enumeration value types
//! - `ModelRegistry`: every entity and property type of one API, finalised
//!   exactly once
//! - `EntityType` / `Property`: the typed entity graph with primary keys and
//!   inverse navigation
//! - `Entity` / `EntitySet`: records bound to the registry, with lazy
//!   navigation loading and paginating iteration
//! - `Query` / `Expand`: the OData-style option grammar for requests and
//!   pub/sub topics
//! - `Session`: the capability through which entities reach the server
//!
//! ## Architecture
//!
//! The registry is the single owner of the type graph. Navigation properties
//! name their target type and cache a weak handle once the registry is
//! finalised. Transports live outside this crate behind [`Session`].

pub mod entity;
pub mod entity_set;
pub mod entity_type;
pub mod error;
pub mod json;
pub mod property;
pub mod query;
pub mod registry;
pub mod session;
pub mod types;
pub mod value;

pub use entity::{Entity, NavigationValue};
pub use entity_set::{EntitySet, EntitySetIter};
pub use entity_type::{DisplayFn, EntityType, PrimaryKey};
pub use error::{ModelError, ServiceError};
pub use json::{EntityDecoder, Page, encode_entity, encode_reference};
pub use property::{Annotations, EntityProperty, Facets, NavigationProperty, Property};
pub use query::{Expand, ExpandItem, Query, QueryBuilder, QueryOptions};
pub use registry::{ContainerInfo, DataModel, EntitySetInfo, ModelRegistry};
pub use session::{Method, PubSubCapabilities, Request, Response, Session};
pub use types::{ComplexMember, Primitive, PropertyType, TypeCatalog, TypeKind, ValueHooks};
pub use value::{ComplexValue, Value};
