//! Request construction, pagination and response shaping for Graph-style
//! OData services.

pub mod config;
pub mod error;
pub mod graph;

pub use error::{describe_error, GraphError, Result};
