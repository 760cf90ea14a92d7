//! `$expand` descriptors.

use crate::entity_type::EntityType;
use crate::error::ModelError;
use crate::property::Property;

use super::options::{
    NESTED_SEPARATOR, QueryBuilder, QueryOptions, TOP_LEVEL_SEPARATOR, encode, join,
};

/// An ordered list of expand items, serialized joined by `,`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expand {
    items: Vec<ExpandItem>,
}

impl Expand {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_item(mut self, item: ExpandItem) -> Self {
        self.push(item);
        self
    }

    /// Append an item. An item for a relation already present replaces it.
    pub fn push(&mut self, item: ExpandItem) {
        match self.items.iter_mut().find(|i| i.relation == item.relation) {
            Some(existing) => *existing = item,
            None => self.items.push(item),
        }
    }

    #[must_use]
    pub fn items(&self) -> &[ExpandItem] {
        &self.items
    }

    /// The item expanding `relation`, if any.
    #[must_use]
    pub fn item(&self, relation: &str) -> Option<&ExpandItem> {
        self.items.iter().find(|i| i.relation == relation)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in nested form, joined by `,`.
    #[must_use]
    pub fn to_url(&self) -> String {
        self.items
            .iter()
            .map(ExpandItem::to_url)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// One navigation property to expand, with its own options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandItem {
    relation: String,
    target: Option<String>,
    options: QueryOptions,
}

impl ExpandItem {
    /// Expand `relation` without checking it against a type.
    #[must_use]
    pub fn new(relation: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            target: None,
            options: QueryOptions::default(),
        }
    }

    /// Expand the navigation property `relation` of `entity_type`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownProperty`] if the property does not exist
    /// and [`ModelError::PropertyKind`] if it is not a navigation property.
    pub fn on(entity_type: &EntityType, relation: &str) -> Result<Self, ModelError> {
        match entity_type.property_or_err(relation)? {
            Property::ToOne(nav) | Property::ToMany(nav) => Ok(Self {
                relation: nav.name().to_string(),
                target: Some(nav.target().to_string()),
                options: QueryOptions::default(),
            }),
            Property::Entity(p) => Err(ModelError::PropertyKind {
                entity_type: entity_type.name().to_string(),
                property: p.name().to_string(),
                expected: "a navigation property",
            }),
        }
    }

    #[must_use]
    pub fn relation(&self) -> &str {
        &self.relation
    }

    /// Name of the expanded entity type, when built with [`on`](Self::on).
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// The expand nested inside this item.
    #[must_use]
    pub fn nested(&self) -> Option<&Expand> {
        self.options.expand.as_ref()
    }

    /// Nested form: `relation(opt;opt)`, or just `relation` without options.
    #[must_use]
    pub fn to_url(&self) -> String {
        let options = self.options.render(NESTED_SEPARATOR);
        if options.is_empty() {
            self.relation.clone()
        } else {
            format!("{}({options})", self.relation)
        }
    }

    /// Top-level form: the options alone, joined by `&`.
    #[must_use]
    pub fn to_url_as_query(&self) -> String {
        join(self.options.pairs(), TOP_LEVEL_SEPARATOR)
    }

    /// Top-level form, percent-encoded.
    #[must_use]
    pub fn to_encoded_query(&self) -> String {
        encode(self.options.pairs())
    }
}

impl QueryBuilder for ExpandItem {
    fn options(&self) -> &QueryOptions {
        &self.options
    }

    fn options_mut(&mut self) -> &mut QueryOptions {
        &mut self.options
    }
}
