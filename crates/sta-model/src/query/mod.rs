//! Query and expand builders.
//!
//! A [`Query`] targets either the container of an entity type or a to-many
//! navigation property of a parent entity. It compiles to a request URL
//! (`&`-joined, percent-encoded options) or to a pub/sub topic, and can be
//! executed through its session.

mod expand;
mod options;

use std::sync::Arc;

pub use expand::{Expand, ExpandItem};
pub use options::{NESTED_SEPARATOR, QueryBuilder, QueryOptions, TOP_LEVEL_SEPARATOR};

use crate::entity::Entity;
use crate::entity_set::EntitySet;
use crate::entity_type::EntityType;
use crate::error::{ModelError, ServiceError};
use crate::json::EntityDecoder;
use crate::property::Property;
use crate::session::{PubSubCapabilities, Session};

/// A request for entities of one type.
#[derive(Clone)]
pub struct Query {
    entity_type: Arc<EntityType>,
    parent: Option<(Box<Entity>, String)>,
    session: Option<Arc<dyn Session>>,
    options: QueryOptions,
}

impl Query {
    /// Query the container of `entity_type`.
    #[must_use]
    pub fn new(entity_type: Arc<EntityType>) -> Self {
        Self {
            entity_type,
            parent: None,
            session: None,
            options: QueryOptions::default(),
        }
    }

    /// Query the entities linked from `parent` through the to-many
    /// navigation property `relation`. Inherits the parent's session.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownProperty`], [`ModelError::PropertyKind`]
    /// if `relation` is not to-many, or [`ModelError::UnknownType`] if its
    /// target type cannot be resolved.
    pub fn for_relation(parent: &Entity, relation: &str) -> Result<Self, ModelError> {
        let parent_type = parent.entity_type();
        let nav = match parent_type.property_or_err(relation)? {
            Property::ToMany(nav) => nav,
            other => {
                return Err(ModelError::PropertyKind {
                    entity_type: parent_type.name().to_string(),
                    property: other.name().to_string(),
                    expected: "a to-many navigation property",
                });
            }
        };
        let target = match (nav.target_type(), parent.session()) {
            (Some(target), _) => target,
            (None, Some(session)) => session.registry().entity_type_or_err(nav.target())?,
            (None, None) => return Err(ModelError::UnknownType(nav.target().to_string())),
        };
        Ok(Self {
            entity_type: target,
            parent: Some((Box::new(parent.with_only_pk()), nav.name().to_string())),
            session: parent.session().cloned(),
            options: QueryOptions::default(),
        })
    }

    #[must_use]
    pub fn with_session(mut self, session: Arc<dyn Session>) -> Self {
        self.session = Some(session);
        self
    }

    #[must_use]
    pub const fn entity_type(&self) -> &Arc<EntityType> {
        &self.entity_type
    }

    /// Service-relative path of the target collection.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::NoContainer`] or [`ModelError::MissingKey`] when
    /// no path can be built.
    pub fn path(&self) -> Result<String, ModelError> {
        match &self.parent {
            Some((parent, relation)) => Ok(format!("{}/{relation}", parent.path()?)),
            None => self
                .entity_type
                .container()
                .map(str::to_string)
                .ok_or_else(|| ModelError::NoContainer(self.entity_type.name().to_string())),
        }
    }

    /// The top-level option string, unencoded.
    #[must_use]
    pub fn query_string(&self) -> String {
        self.options.render(TOP_LEVEL_SEPARATOR)
    }

    /// Path plus percent-encoded options. Absolute when a session is bound.
    ///
    /// # Errors
    ///
    /// See [`path`](Self::path).
    pub fn url(&self) -> Result<String, ModelError> {
        let path = self.path()?;
        let mut url = match &self.session {
            Some(session) => session.url_for(&path),
            None => path,
        };
        let encoded = self.options.to_encoded();
        if !encoded.is_empty() {
            url.push('?');
            url.push_str(&encoded);
        }
        Ok(url)
    }

    /// The pub/sub topic for this query.
    ///
    /// `$select` is always included. `$expand` and `$filter` are only
    /// included when the server allows them over pub/sub; otherwise they are
    /// dropped. Paging and ordering options do not apply to topics.
    ///
    /// # Errors
    ///
    /// See [`path`](Self::path).
    pub fn topic(&self, capabilities: PubSubCapabilities) -> Result<String, ModelError> {
        let prefix = self.session.as_ref().map_or("", |s| s.topic_prefix());
        let mut topic = format!("{prefix}{}", self.path()?);

        let mut gated = QueryOptions {
            select: self.options.select.clone(),
            ..QueryOptions::default()
        };
        if capabilities.filter_allowed {
            gated.filter.clone_from(&self.options.filter);
        }
        if capabilities.expand_allowed {
            gated.expand.clone_from(&self.options.expand);
        }
        let options = gated.render(TOP_LEVEL_SEPARATOR);
        if !options.is_empty() {
            topic.push('?');
            topic.push_str(&options);
        }
        Ok(topic)
    }

    /// Fetch the first page into an entity set that can page onward.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NoSession`] without a session, and propagates
    /// transport, status and decode failures.
    pub fn list(&self) -> Result<EntitySet, ServiceError> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| ServiceError::NoSession(self.entity_type.name().to_string()))?;
        let url = self.url()?;
        let json = session.get_json(&url)?;
        let page = EntityDecoder::new(session.registry())
            .with_session(Arc::clone(session))
            .with_expand(self.options.expand.clone())
            .decode_page(&self.entity_type, &json)?;

        let mut set = EntitySet::new(Arc::clone(&self.entity_type))
            .with_session(Arc::clone(session))
            .with_initial_link(url)
            .with_count(page.count)
            .with_next_link(page.next_link);
        if let Some((parent, relation)) = &self.parent {
            set = set.with_parent((**parent).clone(), relation.clone());
        }
        for entity in page.entities {
            set.add(entity);
        }
        Ok(set)
    }

    /// Fetch the first matching entity, if any.
    ///
    /// # Errors
    ///
    /// Same as [`list`](Self::list).
    pub fn first(&self) -> Result<Option<Entity>, ServiceError> {
        let set = self.clone().top(1).list()?;
        Ok(set.entities().first().cloned())
    }
}

impl QueryBuilder for Query {
    fn options(&self) -> &QueryOptions {
        &self.options
    }

    fn options_mut(&mut self) -> &mut QueryOptions {
        &mut self.options
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("entity_type", &self.entity_type.name())
            .field("relation", &self.parent.as_ref().map(|(_, r)| r))
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
