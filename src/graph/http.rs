//! HTTP request execution
//!
//! Turns a [`RequestSpec`] into one HTTP exchange. Everything that can be
//! rejected locally is rejected before the token is fetched or a byte is
//! sent.

use super::auth::AuthContext;
use super::content::{self, PreparedBody};
use super::query;
use super::request::{Headers, RequestSpec};
use crate::config::{GraphSettings, USER_AGENT};
use crate::error::{GraphError, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

pub const CLIENT_REQUEST_ID_HEADER: &str = "client-request-id";

/// Truncate a response body and strip control characters before logging
fn sanitize_for_log(body: &str) -> String {
    let total = body.chars().count();
    let truncated: String = if total > MAX_LOG_BODY_LENGTH {
        let head: String = body.chars().take(MAX_LOG_BODY_LENGTH).collect();
        format!("{}... [truncated, {} bytes total]", head, body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Resolve a resource path against the base address.
///
/// Absolute URLs (server-issued next-links) are returned untouched.
/// Relative paths are joined with exactly one slash.
pub fn resolve_url(base_address: &str, resource_path: &str) -> String {
    let lower = resource_path
        .get(..8)
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| resource_path.to_ascii_lowercase());
    if lower.starts_with("https://") || lower.starts_with("http://") {
        return resource_path.to_string();
    }

    format!(
        "{}/{}",
        base_address.trim_end_matches('/'),
        resource_path.trim_start_matches('/')
    )
}

/// Status and raw body of a successful exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// A request that passed local validation and is ready to send
#[derive(Debug)]
struct PreparedRequest {
    url: String,
    headers: HeaderMap,
    body: Option<PreparedBody>,
}

/// HTTP client wrapper for Graph API calls
#[derive(Clone)]
pub struct GraphHttpClient {
    client: Client,
}

impl GraphHttpClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;

        Ok(Self { client })
    }

    /// Perform one call.
    ///
    /// Fails with `Api` for status >= 400 (body preserved verbatim),
    /// `Transport` for network failures and `Cancelled` if `cancel` fires
    /// first. Nothing is retried.
    pub async fn execute(
        &self,
        spec: &RequestSpec,
        settings: &GraphSettings,
        auth: &AuthContext,
        cancel: &CancellationToken,
    ) -> Result<RawResponse> {
        if cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }

        let prepared = prepare(spec, settings)?;

        // Read the token as late as possible so a concurrent refresh is seen.
        let token = auth.current_token().await?;

        let mut headers = prepared.headers;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| GraphError::Auth("token contains invalid header characters".to_string()))?;
        headers.insert(AUTHORIZATION, bearer);

        tracing::debug!("{} {}", spec.method(), prepared.url);

        let mut request = self
            .client
            .request(spec.method().to_reqwest(), &prepared.url)
            .headers(headers);
        if let Some(body) = prepared.body {
            request = request.body(body.bytes);
        }

        let exchange = async {
            let response = request.send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            Ok::<_, GraphError>(RawResponse { status, body })
        };

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("{} {} cancelled", spec.method(), prepared.url);
                return Err(GraphError::Cancelled);
            }
            result = exchange => result?,
        };

        if response.status >= 400 {
            tracing::error!(
                "API error: {} - {}",
                response.status,
                sanitize_for_log(&response.body)
            );
            return Err(GraphError::Api {
                status: response.status,
                body: response.body,
            });
        }

        Ok(response)
    }
}

/// Validate and assemble everything except the credential
fn prepare(spec: &RequestSpec, settings: &GraphSettings) -> Result<PreparedRequest> {
    if spec.headers().contains(AUTHORIZATION.as_str()) {
        return Err(GraphError::invalid_argument(
            "the Authorization header is supplied by the auth context and cannot be overridden",
        ));
    }

    let path = query::build_path(spec.resource_path(), spec.query())?;
    let url = resolve_url(&settings.base_address(), &path);

    let body = match spec.body() {
        Some(content) => content::serialize(content)?,
        None => None,
    };

    let mut merged = query::option_headers(spec.query())?;
    merged.extend(spec.headers());

    if !merged.contains(CLIENT_REQUEST_ID_HEADER) {
        merged.append(CLIENT_REQUEST_ID_HEADER, Uuid::new_v4().to_string());
    }
    if !merged.contains(reqwest::header::USER_AGENT.as_str()) {
        merged.append(reqwest::header::USER_AGENT.as_str(), settings.user_agent.clone());
    }
    if let Some(content_type) = body.as_ref().and_then(|b| b.content_type.as_deref()) {
        if !merged.contains(CONTENT_TYPE.as_str()) {
            merged.append(CONTENT_TYPE.as_str(), content_type);
        }
    }

    Ok(PreparedRequest {
        url,
        headers: to_header_map(&merged)?,
        body,
    })
}

fn to_header_map(headers: &Headers) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, values) in headers.iter() {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| GraphError::invalid_argument(format!("invalid header name {:?}", name)))?;
        for value in values {
            let header_value = HeaderValue::from_str(value).map_err(|_| {
                GraphError::invalid_argument(format!("invalid value for header {:?}", name))
            })?;
            map.append(header_name.clone(), header_value);
        }
    }
    Ok(map)
}
