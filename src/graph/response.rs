//! Response classification and shaping
//!
//! [`interpret`] turns a response body into a [`ResponseEnvelope`].
//! [`shape`] then decides what the caller sees, based on the explicit
//! [`CallKind`] of the operation rather than on which options happened to
//! be set.

use super::query::QueryOptions;
use crate::error::{GraphError, Result};
use serde::Serialize;
use serde_json::{Map, Value};

pub const ODATA_CONTEXT: &str = "@odata.context";
pub const ODATA_COUNT: &str = "@odata.count";
pub const ODATA_NEXT_LINK: &str = "@odata.nextLink";
pub const VALUE: &str = "value";

/// What kind of operation produced a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Plain read or write; collection envelopes are kept
    Get,
    /// Filtered/ordered/windowed query; a single page collapses to its items
    Search,
    /// Follow-up on a next-link
    NextPage,
}

impl CallKind {
    /// Boundary adapter: decide the kind from the options a caller supplied
    pub fn for_options(options: &QueryOptions) -> Self {
        if options.is_search_style() {
            CallKind::Search
        } else {
            CallKind::Get
        }
    }
}

/// One page of a collection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionPage {
    pub items: Vec<Value>,
    pub count: Option<i64>,
    pub next_link: Option<String>,
}

impl CollectionPage {
    /// A page without a next-link ends the sequence
    pub fn is_terminal(&self) -> bool {
        self.next_link.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEnvelope {
    SingleResource(Map<String, Value>),
    CollectionPage(CollectionPage),
    RawScalar(Value),
}

/// Caller-visible result of one call
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Envelope(ResponseEnvelope),
    /// Bare rows of a single-page search result
    Items(Vec<Value>),
}

impl Output {
    /// JSON form for printing or handing to a shell
    pub fn to_json(&self) -> Value {
        match self {
            Output::Items(items) => Value::Array(items.clone()),
            Output::Envelope(ResponseEnvelope::RawScalar(value)) => value.clone(),
            Output::Envelope(ResponseEnvelope::SingleResource(fields)) => {
                Value::Object(fields.clone())
            }
            Output::Envelope(ResponseEnvelope::CollectionPage(page)) => {
                let mut map = Map::new();
                if let Some(count) = page.count {
                    map.insert(ODATA_COUNT.to_string(), Value::from(count));
                }
                if let Some(link) = &page.next_link {
                    map.insert(ODATA_NEXT_LINK.to_string(), Value::String(link.clone()));
                }
                map.insert(VALUE.to_string(), Value::Array(page.items.clone()));
                Value::Object(map)
            }
        }
    }

    pub fn page(&self) -> Option<&CollectionPage> {
        match self {
            Output::Envelope(ResponseEnvelope::CollectionPage(page)) => Some(page),
            _ => None,
        }
    }
}

/// Classify a response body
pub fn interpret(body: &str) -> Result<ResponseEnvelope> {
    if body.trim().is_empty() {
        return Ok(ResponseEnvelope::RawScalar(Value::Null));
    }

    let parsed: Value = serde_json::from_str(body)
        .map_err(|e| GraphError::malformed(format!("body is not valid JSON: {}", e)))?;

    let Value::Object(map) = parsed else {
        return Ok(ResponseEnvelope::RawScalar(parsed));
    };

    let has_context = map.contains_key(ODATA_CONTEXT);
    let has_count = map.contains_key(ODATA_COUNT);
    let has_next = map.contains_key(ODATA_NEXT_LINK);
    let value_is_array = map.get(VALUE).is_some_and(Value::is_array);

    if has_context && (has_count || has_next) {
        if !value_is_array {
            return Err(GraphError::malformed(
                "collection envelope has no `value` array",
            ));
        }
        return collection_page(map).map(ResponseEnvelope::CollectionPage);
    }

    // `{"@odata.context": "...#Edm.String", "value": "x"}` wraps a scalar
    if has_context && map.len() == 2 && map.contains_key(VALUE) && !value_is_array {
        let value = map.get(VALUE).cloned().unwrap_or(Value::Null);
        return Ok(ResponseEnvelope::RawScalar(value));
    }

    Ok(ResponseEnvelope::SingleResource(map))
}

fn collection_page(mut map: Map<String, Value>) -> Result<CollectionPage> {
    let count = match map.get(ODATA_COUNT) {
        None | Some(Value::Null) => None,
        Some(value) => Some(value.as_i64().ok_or_else(|| {
            GraphError::malformed(format!("{} is not an integer: {}", ODATA_COUNT, value))
        })?),
    };

    let next_link = match map.get(ODATA_NEXT_LINK) {
        None | Some(Value::Null) => None,
        Some(Value::String(link)) if link.is_empty() => None,
        Some(Value::String(link)) => Some(link.clone()),
        Some(value) => {
            return Err(GraphError::malformed(format!(
                "{} is not a URL string: {}",
                ODATA_NEXT_LINK, value
            )))
        }
    };

    let items = match map.remove(VALUE) {
        Some(Value::Array(items)) => items,
        _ => return Err(GraphError::malformed("collection envelope has no `value` array")),
    };

    Ok(CollectionPage {
        items,
        count,
        next_link,
    })
}

/// Read a follow-up response as a page.
///
/// The last page of an uncounted collection carries neither a count nor a
/// next-link and classifies as a plain object; it is still a page here.
pub fn into_page(envelope: ResponseEnvelope) -> Result<CollectionPage> {
    match envelope {
        ResponseEnvelope::CollectionPage(page) => Ok(page),
        ResponseEnvelope::SingleResource(map) if map.get(VALUE).is_some_and(Value::is_array) => {
            collection_page(map)
        }
        _ => Err(GraphError::malformed("next-link response is not a collection page")),
    }
}

/// Apply the collapse rule: a single-page search result is just its rows
pub fn shape(envelope: ResponseEnvelope, kind: CallKind) -> Output {
    match envelope {
        ResponseEnvelope::CollectionPage(page)
            if kind == CallKind::Search && page.is_terminal() =>
        {
            Output::Items(page.items)
        }
        other => Output::Envelope(other),
    }
}
