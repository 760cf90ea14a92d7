//! The model registry: every entity type and property type of one API.
//!
//! Types are added while the registry is exclusively owned (`&mut self`).
//! [`ModelRegistry::init_finalise`] takes `&self` and may be called from any
//! number of threads; the first caller finalises every entity type and fills
//! the container map, later callers do nothing.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::entity_type::EntityType;
use crate::error::ModelError;
use crate::property::Annotations;
use crate::types::{PropertyType, TypeCatalog};

/// How a data model was declared in a schema document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataModel {
    pub namespace: String,
    pub alias: Option<String>,
    /// Type references into this namespace were written with the alias.
    pub alias_references: bool,
    pub annotations: Annotations,
}

impl DataModel {
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// `short` qualified the way documents refer to it: with the alias when
    /// this data model's references use it, else with the namespace.
    #[must_use]
    pub fn written_name(&self, short: &str) -> String {
        match (&self.alias, self.alias_references) {
            (Some(alias), true) => format!("{alias}.{short}"),
            _ => format!("{}.{short}", self.namespace),
        }
    }
}

/// The entity container declared by a schema document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerInfo {
    /// Namespace of the schema holding the container.
    pub namespace: String,
    pub name: String,
    /// The document's `$EntityContainer` reference, as written.
    pub reference: Option<String>,
    pub annotations: Annotations,
    /// Declared entity sets by container name.
    pub entity_sets: HashMap<String, EntitySetInfo>,
}

/// One declared entity set of a [`ContainerInfo`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntitySetInfo {
    /// Entity type reference, as written.
    pub entity_type: String,
    /// Navigation property path → target entity set.
    pub navigation_bindings: Vec<(String, String)>,
    pub annotations: Annotations,
}

/// Container name → entity type name, in registration order.
///
/// Holds names rather than handles so binding a container never pins an
/// entity type that is still being built.
#[derive(Debug, Default)]
struct Containers {
    order: Vec<String>,
    by_name: HashMap<String, String>,
}

impl Containers {
    fn insert(&mut self, container: &str, entity_type: &str) {
        if self
            .by_name
            .insert(container.to_string(), entity_type.to_string())
            .is_none()
        {
            self.order.push(container.to_string());
        }
    }
}

/// Catalog of entity and property types for one API surface.
#[derive(Debug)]
pub struct ModelRegistry {
    catalog: TypeCatalog,
    entity_types: Vec<Arc<EntityType>>,
    entity_index: HashMap<String, usize>,
    property_types: Vec<Arc<PropertyType>>,
    property_index: HashMap<String, usize>,
    containers: RwLock<Containers>,
    data_models: BTreeSet<String>,
    described_models: Vec<DataModel>,
    container_info: Option<ContainerInfo>,
    finalised: Mutex<bool>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    /// A registry backed by [`TypeCatalog::standard`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_catalog(TypeCatalog::standard())
    }

    #[must_use]
    pub fn with_catalog(catalog: TypeCatalog) -> Self {
        Self {
            catalog,
            entity_types: Vec::new(),
            entity_index: HashMap::new(),
            property_types: Vec::new(),
            property_index: HashMap::new(),
            containers: RwLock::new(Containers::default()),
            data_models: BTreeSet::new(),
            described_models: Vec::new(),
            container_info: None,
            finalised: Mutex::new(false),
        }
    }

    #[must_use]
    pub const fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    // -- entity types -------------------------------------------------------

    /// Register an entity type under its name.
    ///
    /// Registering the same `Arc` again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::NamingConflict`] if a different type already owns
    /// the name, or [`ModelError::Finalised`] after finalisation.
    pub fn register_entity_type(
        &mut self,
        entity_type: impl Into<Arc<EntityType>>,
    ) -> Result<Arc<EntityType>, ModelError> {
        let entity_type = entity_type.into();
        if let Some(&existing) = self.entity_index.get(entity_type.name()) {
            let existing = &self.entity_types[existing];
            if Arc::ptr_eq(existing, &entity_type) {
                return Ok(Arc::clone(existing));
            }
            return Err(ModelError::NamingConflict(entity_type.name().to_string()));
        }
        self.ensure_open("register entity types")?;

        self.entity_index
            .insert(entity_type.name().to_string(), self.entity_types.len());
        self.entity_types.push(Arc::clone(&entity_type));
        Ok(entity_type)
    }

    /// Look up an entity type by short or namespace-qualified name.
    #[must_use]
    pub fn entity_type(&self, name: &str) -> Option<Arc<EntityType>> {
        self.entity_position(name)
            .map(|i| Arc::clone(&self.entity_types[i]))
    }

    /// # Errors
    ///
    /// Returns [`ModelError::UnknownType`] if no such entity type exists.
    pub fn entity_type_or_err(&self, name: &str) -> Result<Arc<EntityType>, ModelError> {
        self.entity_type(name)
            .ok_or_else(|| ModelError::UnknownType(name.to_string()))
    }

    fn entity_position(&self, name: &str) -> Option<usize> {
        if let Some(&i) = self.entity_index.get(name) {
            return Some(i);
        }
        let (namespace, short) = name.rsplit_once('.')?;
        let &i = self.entity_index.get(short)?;
        match self.entity_types[i].namespace() {
            Some(ns) if ns != namespace => None,
            _ => Some(i),
        }
    }

    /// Mutable access to a registered type while nothing else holds it.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownType`], [`ModelError::TypeShared`] if the
    /// type is referenced outside the registry, or [`ModelError::Finalised`].
    pub fn entity_type_mut(&mut self, name: &str) -> Result<&mut EntityType, ModelError> {
        self.ensure_open("modify entity types")?;
        let i = self
            .entity_position(name)
            .ok_or_else(|| ModelError::UnknownType(name.to_string()))?;
        Arc::get_mut(&mut self.entity_types[i])
            .ok_or_else(|| ModelError::TypeShared(name.to_string()))
    }

    /// All entity types in registration order.
    #[must_use]
    pub fn entity_types(&self) -> &[Arc<EntityType>] {
        &self.entity_types
    }

    // -- containers ---------------------------------------------------------

    /// Bind a container name to a registered entity type.
    ///
    /// # Errors
    ///
    /// See [`entity_type_mut`](Self::entity_type_mut).
    pub fn register_container(&mut self, container: &str, entity_type: &str) -> Result<(), ModelError> {
        let target = self.entity_type_mut(entity_type)?;
        target.set_container(container);
        let name = target.name().to_string();
        self.containers
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(container, &name);
        Ok(())
    }

    #[must_use]
    pub fn entity_type_for_container(&self, container: &str) -> Option<Arc<EntityType>> {
        let containers = self.containers.read().unwrap_or_else(PoisonError::into_inner);
        containers
            .by_name
            .get(container)
            .and_then(|name| self.entity_type(name))
    }

    /// Container bindings in registration order.
    #[must_use]
    pub fn containers(&self) -> Vec<(String, Arc<EntityType>)> {
        let containers = self.containers.read().unwrap_or_else(PoisonError::into_inner);
        containers
            .order
            .iter()
            .filter_map(|name| {
                containers
                    .by_name
                    .get(name)
                    .and_then(|et| self.entity_type(et))
                    .map(|et| (name.clone(), et))
            })
            .collect()
    }

    // -- property types -----------------------------------------------------

    /// Register a custom property type. Last writer wins by name.
    pub fn register_property_type(&mut self, property_type: impl Into<Arc<PropertyType>>) {
        let property_type = property_type.into();
        match self.property_index.get(property_type.name()) {
            Some(&i) => self.property_types[i] = property_type,
            None => {
                self.property_index
                    .insert(property_type.name().to_string(), self.property_types.len());
                self.property_types.push(property_type);
            }
        }
    }

    /// Resolve a property type: custom types first, then the catalog.
    /// `Collection(X)` resolves `X` and wraps it.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownType`] if the name resolves nowhere.
    pub fn property_type(&self, name: &str) -> Result<Arc<PropertyType>, ModelError> {
        if let Some(&i) = self.property_index.get(name) {
            return Ok(Arc::clone(&self.property_types[i]));
        }
        if let Some(found) = self.catalog.get(name) {
            return Ok(found);
        }
        if let Some(inner) = name
            .strip_prefix("Collection(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let inner = self.property_type(inner)?;
            return Ok(Arc::new(PropertyType::collection(inner)));
        }
        Err(ModelError::UnknownType(name.to_string()))
    }

    /// Custom property types in registration order.
    #[must_use]
    pub fn custom_property_types(&self) -> &[Arc<PropertyType>] {
        &self.property_types
    }

    // -- data models --------------------------------------------------------

    /// Record a logical data model that contributed types.
    pub fn register_data_model(&mut self, name: impl Into<String>) {
        self.data_models.insert(name.into());
    }

    #[must_use]
    pub const fn data_models(&self) -> &BTreeSet<String> {
        &self.data_models
    }

    /// Record a data model together with how its document declared it.
    /// Replaces an earlier record for the same namespace.
    pub fn describe_data_model(&mut self, model: DataModel) {
        self.data_models.insert(model.namespace.clone());
        match self
            .described_models
            .iter_mut()
            .find(|m| m.namespace == model.namespace)
        {
            Some(existing) => *existing = model,
            None => self.described_models.push(model),
        }
    }

    #[must_use]
    pub fn data_model(&self, namespace: &str) -> Option<&DataModel> {
        self.described_models.iter().find(|m| m.namespace == namespace)
    }

    /// Described data models in the order they were recorded.
    #[must_use]
    pub fn described_data_models(&self) -> &[DataModel] {
        &self.described_models
    }

    pub fn set_container_info(&mut self, info: ContainerInfo) {
        self.container_info = Some(info);
    }

    #[must_use]
    pub const fn container_info(&self) -> Option<&ContainerInfo> {
        self.container_info.as_ref()
    }

    // -- finalisation -------------------------------------------------------

    /// Finalise every entity type and fill the container map.
    ///
    /// Exactly-once: the first successful call does the work, every later
    /// call returns immediately. Safe to call concurrently.
    ///
    /// # Errors
    ///
    /// Propagates the first [`EntityType::validate`] failure. Every type is
    /// validated before any is initialised, so on failure nothing changes
    /// and a later call can succeed once the model is fixed.
    pub fn init_finalise(&self) -> Result<(), ModelError> {
        let mut finalised = self.finalised.lock().unwrap_or_else(PoisonError::into_inner);
        if *finalised {
            return Ok(());
        }

        for entity_type in &self.entity_types {
            entity_type.validate(self)?;
        }
        for entity_type in &self.entity_types {
            entity_type.init(self)?;
        }

        let mut containers = self.containers.write().unwrap_or_else(PoisonError::into_inner);
        for entity_type in &self.entity_types {
            if let Some(container) = entity_type.container() {
                if !containers.by_name.contains_key(container) {
                    containers.insert(container, entity_type.name());
                }
            }
        }
        drop(containers);

        *finalised = true;
        tracing::debug!(
            entity_types = self.entity_types.len(),
            property_types = self.property_types.len(),
            "model registry finalised"
        );
        Ok(())
    }

    #[must_use]
    pub fn is_finalised(&self) -> bool {
        *self.finalised.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_open(&self, action: &str) -> Result<(), ModelError> {
        if self.is_finalised() {
            return Err(ModelError::Finalised(format!("cannot {action}")));
        }
        Ok(())
    }
}
