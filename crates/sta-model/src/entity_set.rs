//! Entity sets and their paginating iterator.
//!
//! An [`EntitySet`] holds one buffered page of entities plus the server's
//! next link. Iterating walks the buffer and then fetches following pages
//! synchronously through the session until the next link runs out. Each
//! fetched page replaces the set's buffer and next link.
//!
//! A set is a restartable view. The first traversal reuses the buffered
//! page; every later traversal re-fetches from the initial link. A set
//! without a session replays its buffer instead.
//!
//! A failed page fetch ends the traversal early. The failure is logged at
//! `warn` and kept on the iterator for [`EntitySetIter::take_error`];
//! [`EntitySet::fetch_all`] returns it instead.

use std::fmt;
use std::sync::Arc;

use crate::entity::Entity;
use crate::entity_type::EntityType;
use crate::error::{ModelError, ServiceError};
use crate::json::EntityDecoder;
use crate::query::ExpandItem;
use crate::session::Session;

/// A page of entities of one type.
#[derive(Clone)]
pub struct EntitySet {
    entity_type: Arc<EntityType>,
    entities: Vec<Entity>,
    iterated: bool,
    count: Option<i64>,
    next_link: Option<String>,
    initial_link: Option<String>,
    parent: Option<(Box<Entity>, String)>,
    expand_item: Option<ExpandItem>,
    session: Option<Arc<dyn Session>>,
}

impl EntitySet {
    #[must_use]
    pub fn new(entity_type: Arc<EntityType>) -> Self {
        Self {
            entity_type,
            entities: Vec::new(),
            iterated: false,
            count: None,
            next_link: None,
            initial_link: None,
            parent: None,
            expand_item: None,
            session: None,
        }
    }

    /// Scope this set to the `relation` navigation property of `parent`.
    #[must_use]
    pub fn with_parent(mut self, parent: Entity, relation: impl Into<String>) -> Self {
        self.parent = Some((Box::new(parent), relation.into()));
        self
    }

    #[must_use]
    pub fn with_session(mut self, session: Arc<dyn Session>) -> Self {
        self.session = Some(session);
        self
    }

    /// Fix the link later traversals restart from, e.g. a query URL.
    #[must_use]
    pub fn with_initial_link(mut self, link: impl Into<String>) -> Self {
        self.initial_link = Some(link.into());
        self
    }

    #[must_use]
    pub fn with_next_link(mut self, next_link: Option<String>) -> Self {
        self.next_link = next_link;
        self
    }

    #[must_use]
    pub fn with_count(mut self, count: Option<i64>) -> Self {
        self.count = count;
        self
    }

    #[must_use]
    pub const fn entity_type(&self) -> &Arc<EntityType> {
        &self.entity_type
    }

    /// Append an entity to the buffered page.
    pub fn add(&mut self, mut entity: Entity) {
        if let Some(item) = &self.expand_item {
            entity.set_expand(item.nested().cloned());
        }
        self.entities.push(entity);
    }

    /// The buffered page.
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Total count reported by the server, when requested.
    #[must_use]
    pub const fn count(&self) -> Option<i64> {
        self.count
    }

    #[must_use]
    pub fn next_link(&self) -> Option<&str> {
        self.next_link.as_deref()
    }

    #[must_use]
    pub fn parent(&self) -> Option<(&Entity, &str)> {
        self.parent.as_ref().map(|(e, r)| (&**e, r.as_str()))
    }

    #[must_use]
    pub fn session(&self) -> Option<&Arc<dyn Session>> {
        self.session.as_ref()
    }

    #[must_use]
    pub const fn expand_item(&self) -> Option<&ExpandItem> {
        self.expand_item.as_ref()
    }

    /// Bind the expand item that scopes this set and hand its nested expand
    /// to every buffered entity.
    pub fn set_expand_item(&mut self, item: Option<ExpandItem>) {
        let nested = item.as_ref().and_then(ExpandItem::nested).cloned();
        for entity in &mut self.entities {
            entity.set_expand(nested.clone());
        }
        self.expand_item = item;
    }

    /// Whether a traversal has already started from the buffered page.
    #[must_use]
    pub const fn is_iterated(&self) -> bool {
        self.iterated
    }

    /// The service-relative link of the first page.
    ///
    /// An explicit initial link wins. Otherwise the path is the parent's path
    /// plus the relation, or the type's container, followed by the options of
    /// the expand item.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::NoContainer`] or [`ModelError::MissingKey`] when
    /// no path can be built.
    pub fn initial_link(&self) -> Result<String, ModelError> {
        if let Some(link) = &self.initial_link {
            return Ok(link.clone());
        }
        let mut link = match &self.parent {
            Some((parent, relation)) => format!("{}/{relation}", parent.path()?),
            None => self
                .entity_type
                .container()
                .ok_or_else(|| ModelError::NoContainer(self.entity_type.name().to_string()))?
                .to_string(),
        };
        if let Some(query) = self
            .expand_item
            .as_ref()
            .map(ExpandItem::to_encoded_query)
            .filter(|q| !q.is_empty())
        {
            link.push('?');
            link.push_str(&query);
        }
        Ok(link)
    }

    /// Start a traversal.
    ///
    /// The first call walks the buffered page and continues from the current
    /// next link. Later calls restart from [`initial_link`](Self::initial_link).
    pub fn iter(&mut self) -> EntitySetIter<'_> {
        let mut position = 0;
        let mut error = None;

        if self.iterated && self.session.is_some() {
            match self.initial_link() {
                Ok(link) => {
                    position = self.entities.len();
                    self.next_link = Some(link);
                }
                Err(e) => {
                    tracing::warn!(entity_type = %self.entity_type.name(), %e, "cannot restart entity set");
                    position = self.entities.len();
                    error = Some(e.into());
                }
            }
        }
        self.iterated = true;

        EntitySetIter {
            stopped: error.is_some(),
            set: self,
            position,
            fetches: 0,
            error,
        }
    }

    /// Walk every page and collect the entities.
    ///
    /// # Errors
    ///
    /// Returns the failure that ended the traversal early.
    pub fn fetch_all(&mut self) -> Result<Vec<Entity>, ServiceError> {
        let mut iter = self.iter();
        let entities: Vec<Entity> = iter.by_ref().collect();
        match iter.take_error() {
            Some(e) => Err(e),
            None => Ok(entities),
        }
    }

    fn fetch_page(&mut self, link: &str) -> Result<(), ServiceError> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| ServiceError::NoSession(self.entity_type.name().to_string()))?;
        let url = session.url_for(link);
        let json = session.get_json(&url)?;
        let nested = self.expand_item.as_ref().and_then(ExpandItem::nested).cloned();
        let page = EntityDecoder::new(session.registry())
            .with_session(Arc::clone(session))
            .with_expand(nested)
            .decode_page(&self.entity_type, &json)?;
        tracing::debug!(
            entity_type = %self.entity_type.name(),
            entities = page.entities.len(),
            has_next = page.next_link.is_some(),
            "fetched page"
        );
        self.entities = page.entities;
        self.next_link = page.next_link;
        if page.count.is_some() {
            self.count = page.count;
        }
        Ok(())
    }
}

impl fmt::Debug for EntitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySet")
            .field("entity_type", &self.entity_type.name())
            .field("entities", &self.entities)
            .field("count", &self.count)
            .field("next_link", &self.next_link)
            .field("relation", &self.parent.as_ref().map(|(_, r)| r))
            .finish_non_exhaustive()
    }
}

impl<'a> IntoIterator for &'a mut EntitySet {
    type Item = Entity;
    type IntoIter = EntitySetIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Walks an entity set across pages, advancing the set as it goes.
pub struct EntitySetIter<'a> {
    set: &'a mut EntitySet,
    position: usize,
    stopped: bool,
    fetches: usize,
    error: Option<ServiceError>,
}

impl EntitySetIter<'_> {
    /// Pages fetched by this iterator so far.
    #[must_use]
    pub const fn fetches(&self) -> usize {
        self.fetches
    }

    /// The failure that ended the traversal early, if any.
    pub fn take_error(&mut self) -> Option<ServiceError> {
        self.error.take()
    }
}

impl Iterator for EntitySetIter<'_> {
    type Item = Entity;

    fn next(&mut self) -> Option<Entity> {
        if self.stopped {
            return None;
        }
        loop {
            if let Some(entity) = self.set.entities.get(self.position) {
                self.position += 1;
                return Some(entity.clone());
            }
            let link = self.set.next_link.take()?;
            self.fetches += 1;
            if let Err(e) = self.set.fetch_page(&link) {
                tracing::warn!(
                    entity_type = %self.set.entity_type.name(),
                    %link,
                    %e,
                    "page fetch failed, ending iteration"
                );
                // Keep the link so the set still knows where it stopped.
                self.set.next_link = Some(link);
                self.stopped = true;
                self.error = Some(e);
                return None;
            }
            self.position = 0;
        }
    }
}

impl fmt::Debug for EntitySetIter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySetIter")
            .field("entity_type", &self.set.entity_type.name())
            .field("position", &self.position)
            .field("next_link", &self.set.next_link)
            .field("fetches", &self.fetches)
            .finish_non_exhaustive()
    }
}
