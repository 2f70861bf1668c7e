//! Request description types
//!
//! A [`RequestSpec`] is built once per call and never mutated after it has
//! been handed to the executor.

use super::content::Content;
use super::query::QueryOptions;
use crate::error::{GraphError, Result};
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// HTTP verbs the service accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            other => Err(GraphError::invalid_argument(format!(
                "unsupported HTTP method {:?}",
                other
            ))),
        }
    }
}

/// Normalized header set: name to ordered values.
///
/// Names are matched case-insensitively; the first spelling seen is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(IndexMap<String, Vec<String>>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    fn key_of(&self, name: &str) -> Option<String> {
        self.0
            .keys()
            .find(|k| k.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Add a value, keeping any values already present for `name`
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self.key_of(&name) {
            Some(key) => self.0.entry(key).or_default().push(value.into()),
            None => {
                self.0.insert(name, vec![value.into()]);
            }
        }
    }

    /// Values for `name`, matched case-insensitively
    pub fn get(&self, name: &str) -> Option<&Vec<String>> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of distinct header names
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    /// Merge `other` into `self`, appending values for shared names
    pub fn extend(&mut self, other: &Headers) {
        for (name, values) in other.iter() {
            for value in values {
                self.append(name.clone(), value.clone());
            }
        }
    }

    /// Adapter for the property-bag shape callers hand in: a JSON object
    /// whose values are scalars or arrays of scalars. Nulls are skipped.
    pub fn from_json(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(GraphError::invalid_argument(
                "headers must be a JSON object of name to value(s)",
            ));
        };

        let mut headers = Headers::new();
        for (name, value) in map {
            match value {
                Value::Null => {}
                Value::Array(items) => {
                    for item in items {
                        headers.append(name.clone(), scalar_header_value(name, item)?);
                    }
                }
                scalar => headers.append(name.clone(), scalar_header_value(name, scalar)?),
            }
        }
        Ok(headers)
    }

    /// Parse a `Name: value` line
    pub fn parse_line(line: &str) -> Result<(String, String)> {
        let Some((name, value)) = line.split_once(':') else {
            return Err(GraphError::invalid_argument(format!(
                "header {:?} is not of the form Name: value",
                line
            )));
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(GraphError::invalid_argument(format!(
                "header {:?} has an empty name",
                line
            )));
        }
        Ok((name.to_string(), value.trim().to_string()))
    }
}

fn scalar_header_value(name: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(GraphError::invalid_argument(format!(
            "header {:?} has a value that is not a string, number or bool",
            name
        ))),
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.append(name, value);
        }
        headers
    }
}

/// One call against the service
#[derive(Debug, Clone)]
pub struct RequestSpec {
    method: Method,
    resource_path: String,
    query: QueryOptions,
    headers: Headers,
    body: Option<Content>,
}

impl RequestSpec {
    pub fn new(method: Method, resource_path: impl Into<String>) -> Self {
        Self {
            method,
            resource_path: resource_path.into(),
            query: QueryOptions::default(),
            headers: Headers::new(),
            body: None,
        }
    }

    pub fn get(resource_path: impl Into<String>) -> Self {
        Self::new(Method::Get, resource_path)
    }

    pub fn with_query(mut self, query: QueryOptions) -> Self {
        self.query = query;
        self
    }

    /// Replace the caller headers
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: Content) -> Self {
        self.body = Some(body);
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn resource_path(&self) -> &str {
        &self.resource_path
    }

    pub fn query(&self) -> &QueryOptions {
        &self.query
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> Option<&Content> {
        self.body.as_ref()
    }
}
