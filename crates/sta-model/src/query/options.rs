//! Query options and their two textual forms.
//!
//! At the top level of a request or topic, options are `name=value` pairs
//! joined with `&`. Inside an expand sub-expression the same options are
//! joined with `;`. Emission order is fixed:
//! `$skip`, `$top`, `$select`, `$filter`, `$orderby`, `$count`, `$expand`.

use super::expand::{Expand, ExpandItem};

/// Separator between top-level options.
pub const TOP_LEVEL_SEPARATOR: char = '&';
/// Separator between options nested inside an expand item.
pub const NESTED_SEPARATOR: char = ';';

/// The option set shared by queries and expand items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub count: Option<bool>,
    pub select: Vec<String>,
    pub filter: Option<String>,
    pub order_by: Option<String>,
    pub skip: Option<u64>,
    pub top: Option<u64>,
    pub expand: Option<Expand>,
}

impl QueryOptions {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs().is_empty()
    }

    /// `(name, value)` pairs in emission order.
    ///
    /// Expand values use the nested grammar regardless of where the pairs
    /// end up.
    #[must_use]
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(skip) = self.skip {
            pairs.push(("$skip", skip.to_string()));
        }
        if let Some(top) = self.top {
            pairs.push(("$top", top.to_string()));
        }
        if !self.select.is_empty() {
            pairs.push(("$select", self.select.join(",")));
        }
        if let Some(filter) = &self.filter {
            pairs.push(("$filter", filter.clone()));
        }
        if let Some(order_by) = &self.order_by {
            pairs.push(("$orderby", order_by.clone()));
        }
        if let Some(count) = self.count {
            pairs.push(("$count", count.to_string()));
        }
        if let Some(expand) = self.expand.as_ref().filter(|e| !e.is_empty()) {
            pairs.push(("$expand", expand.to_url()));
        }
        pairs
    }

    /// Render with the given separator, unencoded.
    #[must_use]
    pub fn render(&self, separator: char) -> String {
        join(self.pairs(), separator)
    }

    /// Top-level form with option names and values percent-encoded, ready
    /// to be appended after `?`.
    #[must_use]
    pub fn to_encoded(&self) -> String {
        encode(self.pairs())
    }

    /// Append an expand item, creating the expand if needed.
    pub fn add_expand_item(&mut self, item: ExpandItem) {
        self.expand.get_or_insert_with(Expand::default).push(item);
    }
}

pub(crate) fn join(pairs: Vec<(&'static str, String)>, separator: char) -> String {
    let mut out = String::new();
    for (name, value) in pairs {
        if !out.is_empty() {
            out.push(separator);
        }
        out.push_str(name);
        out.push('=');
        out.push_str(&value);
    }
    out
}

pub(crate) fn encode(pairs: Vec<(&'static str, String)>) -> String {
    pairs
        .into_iter()
        .map(|(name, value)| {
            format!(
                "{}={}",
                urlencoding::encode(name),
                urlencoding::encode(&value)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// The builder surface shared by everything that carries [`QueryOptions`].
pub trait QueryBuilder: Sized {
    fn options(&self) -> &QueryOptions;

    fn options_mut(&mut self) -> &mut QueryOptions;

    /// Restrict the returned properties.
    #[must_use]
    fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options_mut().select = fields.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    fn filter(mut self, expression: impl Into<String>) -> Self {
        self.options_mut().filter = Some(expression.into());
        self
    }

    #[must_use]
    fn top(mut self, top: u64) -> Self {
        self.options_mut().top = Some(top);
        self
    }

    #[must_use]
    fn skip(mut self, skip: u64) -> Self {
        self.options_mut().skip = Some(skip);
        self
    }

    #[must_use]
    fn order_by(mut self, expression: impl Into<String>) -> Self {
        self.options_mut().order_by = Some(expression.into());
        self
    }

    #[must_use]
    fn count(mut self, count: bool) -> Self {
        self.options_mut().count = Some(count);
        self
    }

    /// Replace the whole expand.
    #[must_use]
    fn expand(mut self, expand: Expand) -> Self {
        self.options_mut().expand = Some(expand);
        self
    }

    #[must_use]
    fn add_expand_item(mut self, item: ExpandItem) -> Self {
        self.options_mut().add_expand_item(item);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn emission_order_is_fixed() {
        let options = QueryOptions {
            count: Some(true),
            select: vec!["name".into(), "id".into()],
            filter: Some("id gt 3".into()),
            order_by: Some("name asc".into()),
            skip: Some(10),
            top: Some(5),
            expand: None,
        };
        assert_eq!(
            options.render(TOP_LEVEL_SEPARATOR),
            "$skip=10&$top=5&$select=name,id&$filter=id gt 3&$orderby=name asc&$count=true"
        );
        assert_eq!(
            options.render(NESTED_SEPARATOR),
            "$skip=10;$top=5;$select=name,id;$filter=id gt 3;$orderby=name asc;$count=true"
        );
    }

    #[test]
    fn empty_options_render_nothing() {
        let options = QueryOptions::default();
        assert!(options.is_empty());
        assert_eq!(options.render(TOP_LEVEL_SEPARATOR), "");
        assert_eq!(options.to_encoded(), "");
    }

    #[test]
    fn empty_expand_is_omitted() {
        let options = QueryOptions {
            top: Some(1),
            expand: Some(Expand::default()),
            ..QueryOptions::default()
        };
        assert_eq!(options.render(TOP_LEVEL_SEPARATOR), "$top=1");
    }

    #[test]
    fn encoded_form_escapes_names_and_values() {
        let options = QueryOptions {
            top: Some(2),
            filter: Some("name eq 'a b'".into()),
            ..QueryOptions::default()
        };
        assert_eq!(
            options.to_encoded(),
            "%24top=2&%24filter=name%20eq%20%27a%20b%27"
        );
    }
}
