//! Graph API request engine
//!
//! Every operation funnels through the same path: query options become a
//! resource URL, content becomes a body, the executor performs the call
//! with the current bearer token, and the interpreter classifies the JSON
//! envelope. Collection pages can then be continued with the paginator.
//!
//! # Module Structure
//!
//! - [`auth`] - Bearer token capability consumed by the executor
//! - [`query`] - OData query options and URL construction
//! - [`content`] - Request body serialization
//! - [`request`] - Request description, methods and header normalization
//! - [`http`] - HTTP execution against the configured base address
//! - [`response`] - Envelope classification and result shaping
//! - [`paginator`] - Next-link pagination
//! - [`client`] - Facade exposing the verbs
//!
//! # Example
//!
//! ```ignore
//! use graphverb::graph::{AuthContext, GraphClient, QueryOptions};
//! use graphverb::config::GraphSettings;
//!
//! async fn example() -> graphverb::Result<()> {
//!     let client = GraphClient::new(GraphSettings::default(), AuthContext::static_token("t"))?;
//!     let users = client
//!         .list_all("users", QueryOptions::new().select(["id", "displayName"]))
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod content;
pub mod http;
pub mod paginator;
pub mod query;
pub mod request;
pub mod response;

pub use auth::{
    AccessToken, AuthContext, CachingProvider, EnvToken, StaticToken, TokenProvider,
};
pub use client::{GraphClient, SettingsHandle};
pub use content::{Content, PreparedBody};
pub use http::{GraphHttpClient, RawResponse};
pub use paginator::Paginator;
pub use query::QueryOptions;
pub use request::{Headers, Method, RequestSpec};
pub use response::{CallKind, CollectionPage, Output, ResponseEnvelope};
