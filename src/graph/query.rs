//! OData query options and URL construction
//!
//! Options are always emitted in the same order (`$select`, `$expand`,
//! `$filter`, `$orderby`, `$skip`, `$top`, `$count`, `$search`) so that a
//! given set of options always produces the same URL.

use super::request::Headers;
use crate::error::{GraphError, Result};
use indexmap::IndexSet;

/// Header that opts into advanced queries (`$count`, `$search`)
pub const CONSISTENCY_LEVEL_HEADER: &str = "ConsistencyLevel";
pub const PREFER_HEADER: &str = "Prefer";

/// Structured query intent for a single call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub select: IndexSet<String>,
    pub expand: IndexSet<String>,
    pub filter: Option<String>,
    pub order_by: Vec<String>,
    pub skip: Option<i64>,
    pub top: Option<i64>,
    /// Sent as `Prefer: odata.maxpagesize=<n>`, never in the query string
    pub max_page_size: Option<i64>,
    pub count: bool,
    pub search: Option<String>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add properties to `$select`; repeats are ignored
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Add relations to `$expand`; repeats are ignored
    pub fn expand<I, S>(mut self, relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expand.extend(relations.into_iter().map(Into::into));
        self
    }

    /// Set the `$filter` expression, replacing any earlier one
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Append an `$orderby` clause such as `displayName desc`
    pub fn order_by(mut self, clause: impl Into<String>) -> Self {
        self.order_by.push(clause.into());
        self
    }

    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn top(mut self, top: i64) -> Self {
        self.top = Some(top);
        self
    }

    /// Ask the server for pages of at most `size` rows
    pub fn max_page_size(mut self, size: i64) -> Self {
        self.max_page_size = Some(size);
        self
    }

    pub fn count(mut self, count: bool) -> Self {
        self.count = count;
        self
    }

    /// Set the `$search` text
    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// True when any of filter, orderBy, skip or top was supplied
    pub fn is_search_style(&self) -> bool {
        self.filter.as_deref().is_some_and(|f| !f.is_empty())
            || self.order_by.iter().any(|o| !o.is_empty())
            || self.skip.is_some()
            || self.top.is_some()
    }

    /// Reject values the service would never accept
    pub fn validate(&self) -> Result<()> {
        if let Some(skip) = self.skip {
            if skip < 0 {
                return Err(GraphError::invalid_argument(format!(
                    "$skip must be non-negative, got {}",
                    skip
                )));
            }
        }
        if let Some(top) = self.top {
            if top < 0 {
                return Err(GraphError::invalid_argument(format!(
                    "$top must be non-negative, got {}",
                    top
                )));
            }
        }
        if let Some(size) = self.max_page_size {
            if size <= 0 {
                return Err(GraphError::invalid_argument(format!(
                    "max page size must be positive, got {}",
                    size
                )));
            }
        }
        Ok(())
    }
}

/// Encode list elements one by one and join them with a literal comma
fn encode_list<'a>(items: impl IntoIterator<Item = &'a String>) -> Option<String> {
    let encoded: Vec<String> = items
        .into_iter()
        .filter(|item| !item.is_empty())
        .map(|item| urlencoding::encode(item).into_owned())
        .collect();

    if encoded.is_empty() {
        None
    } else {
        Some(encoded.join(","))
    }
}

fn encode_text(value: Option<&String>) -> Option<String> {
    value
        .filter(|v| !v.is_empty())
        .map(|v| urlencoding::encode(v).into_owned())
}

/// Encoded `(name, value)` pairs in canonical order. Names keep their `$`.
pub fn query_pairs(options: &QueryOptions) -> Result<Vec<(&'static str, String)>> {
    options.validate()?;

    let mut pairs = Vec::new();

    if let Some(select) = encode_list(&options.select) {
        pairs.push(("$select", select));
    }
    if let Some(expand) = encode_list(&options.expand) {
        pairs.push(("$expand", expand));
    }
    if let Some(filter) = encode_text(options.filter.as_ref()) {
        pairs.push(("$filter", filter));
    }
    if let Some(order_by) = encode_list(&options.order_by) {
        pairs.push(("$orderby", order_by));
    }
    if let Some(skip) = options.skip {
        pairs.push(("$skip", skip.to_string()));
    }
    if let Some(top) = options.top {
        pairs.push(("$top", top.to_string()));
    }
    if options.count {
        pairs.push(("$count", "true".to_string()));
    }
    if let Some(search) = encode_text(options.search.as_ref()) {
        pairs.push(("$search", search));
    }

    Ok(pairs)
}

/// Append the encoded query options to a resource path.
///
/// The path itself is not touched. If it already has a query string the
/// options are appended with `&`.
pub fn build_path(resource_path: &str, options: &QueryOptions) -> Result<String> {
    let pairs = query_pairs(options)?;
    if pairs.is_empty() {
        return Ok(resource_path.to_string());
    }

    let query = pairs
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("&");

    let separator = match resource_path.find('?') {
        None => "?",
        Some(idx) if idx + 1 == resource_path.len() || resource_path.ends_with('&') => "",
        Some(_) => "&",
    };

    Ok(format!("{}{}{}", resource_path, separator, query))
}

/// Headers implied by the options themselves
pub fn option_headers(options: &QueryOptions) -> Result<Headers> {
    options.validate()?;

    let mut headers = Headers::new();
    if let Some(size) = options.max_page_size {
        headers.append(PREFER_HEADER, format!("odata.maxpagesize={}", size));
    }
    if options.count || options.search.as_deref().is_some_and(|s| !s.is_empty()) {
        headers.append(CONSISTENCY_LEVEL_HEADER, "eventual");
    }
    Ok(headers)
}
