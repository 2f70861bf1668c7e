//! Integration tests for the Graph client using wiremock
//!
//! These tests run the full request path (query building, execution,
//! interpretation and pagination) against a mocked service.

use graphverb::config::GraphSettings;
use graphverb::graph::{
    AuthContext, CallKind, Content, GraphClient, Method, Output, QueryOptions, RequestSpec,
    ResponseEnvelope,
};
use graphverb::GraphError;
use serde_json::{json, Value};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{
    bearer_token, body_bytes, body_json, header, header_exists, method, path, query_param,
    query_param_is_missing,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> GraphClient {
    let settings = GraphSettings::new(&server.uri(), "v1.0").expect("valid settings");
    GraphClient::new(settings, AuthContext::static_token("test-token")).expect("client")
}

fn rows(range: std::ops::Range<usize>) -> Vec<Value> {
    range.map(|i| json!({ "id": i })).collect()
}

async fn request_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .map(|requests| requests.len())
        .unwrap_or(0)
}

mod request_tests {
    use super::*;

    /// Test GET sends the bearer token and a client request id
    #[tokio::test]
    async fn test_get_single_resource_with_bearer_token() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1.0/me"))
            .and(bearer_token("test-token"))
            .and(header_exists("client-request-id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "@odata.context": "https://graph/v1.0/$metadata#users/$entity",
                "id": "42",
                "displayName": "Megan"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let output = assert_ok!(client.get("me", QueryOptions::new()).await);

        let Output::Envelope(ResponseEnvelope::SingleResource(fields)) = output else {
            panic!("expected a single resource, got {:?}", output);
        };
        assert_eq!(fields["displayName"], "Megan");
    }

    /// Test query options are encoded in canonical order
    #[tokio::test]
    async fn test_query_options_are_encoded_in_order() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1.0/users"))
            .and(query_param("$select", "id,displayName"))
            .and(query_param("$filter", "startswith(displayName,'A')"))
            .and(query_param("$top", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "@odata.context": "c",
                "@odata.count": 1,
                "value": [{"id": "1"}]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let options = QueryOptions::new()
            .top(5)
            .filter("startswith(displayName,'A')")
            .select(["id", "displayName"]);
        assert_ok!(client.search("users", options).await);

        let requests = server.received_requests().await.expect("recording enabled");
        assert_eq!(
            requests[0].url.query(),
            Some("$select=id,displayName&$filter=startswith%28displayName%2C%27A%27%29&$top=5")
        );
    }

    /// Test count/search/page size add their request headers
    #[tokio::test]
    async fn test_option_headers_are_sent() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1.0/groups"))
            .and(header("Prefer", "odata.maxpagesize=2"))
            .and(header("ConsistencyLevel", "eventual"))
            .and(query_param("$count", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "@odata.context": "c",
                "@odata.count": 0,
                "value": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let options = QueryOptions::new().max_page_size(2).count(true);
        assert_ok!(client.get("groups", options).await);
    }

    /// Test POST with structured content sends a JSON body
    #[tokio::test]
    async fn test_post_structured_body_as_json() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1.0/groups"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({"displayName": "Bing"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "g-1",
                "displayName": "Bing"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let output = assert_ok!(
            client
                .create("groups", Content::json(json!({"displayName": "Bing"})))
                .await
        );
        assert_eq!(output.to_json()["id"], "g-1");
    }

    /// Test prebuilt content is sent unchanged with its content type
    #[tokio::test]
    async fn test_prebuilt_body_is_sent_byte_for_byte() {
        let server = MockServer::start().await;
        let payload = vec![0x89u8, b'P', b'N', b'G', 0, 255];

        Mock::given(method("PUT"))
            .and(path("/v1.0/me/photo/$value"))
            .and(header("content-type", "image/png"))
            .and(body_bytes(payload.clone()))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let output = assert_ok!(
            client
                .replace(
                    "me/photo/$value",
                    Content::prebuilt(payload.clone(), Some("image/png"))
                )
                .await
        );
        assert_eq!(output, Output::Envelope(ResponseEnvelope::RawScalar(Value::Null)));
    }

    /// Test 204 with no body yields a null result
    #[tokio::test]
    async fn test_delete_with_empty_response() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/v1.0/groups/g-1"))
            .and(bearer_token("test-token"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let output = assert_ok!(client.delete("/groups/g-1").await);
        assert_eq!(output.to_json(), Value::Null);
    }

    /// Test a caller Authorization header is refused before sending
    #[tokio::test]
    async fn test_caller_authorization_header_is_rejected() {
        let server = MockServer::start().await;

        let client = client_for(&server);
        let spec = RequestSpec::get("me").with_header("Authorization", "Bearer someone-else");
        let err = assert_err!(client.invoke(&spec, CallKind::Get).await);

        assert!(matches!(err, GraphError::InvalidArgument(_)));
        assert_eq!(request_count(&server).await, 0);
    }

    /// Test replacing settings redirects later calls
    #[tokio::test]
    async fn test_replaced_settings_apply_to_later_calls() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/beta/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "b"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let beta = GraphSettings::new(&server.uri(), "beta").unwrap();
        client.replace_settings(beta).await;

        let output = assert_ok!(client.get("me", QueryOptions::new()).await);
        assert_eq!(output.to_json()["id"], "b");
    }
}

mod response_tests {
    use super::*;

    const TWO_ROWS: &str =
        r#"{"@odata.context":"c","@odata.count":2,"value":[{"id":1},{"id":2}]}"#;

    async fn mount_two_rows(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/v1.0/users"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(TWO_ROWS, "application/json"),
            )
            .mount(server)
            .await;
    }

    /// Test a single-page search returns bare items
    #[tokio::test]
    async fn test_single_page_search_collapses_to_items() {
        let server = MockServer::start().await;
        mount_two_rows(&server).await;

        let client = client_for(&server);
        let output = assert_ok!(
            client
                .search("users", QueryOptions::new().filter("id ge 1"))
                .await
        );

        assert_eq!(output, Output::Items(vec![json!({"id": 1}), json!({"id": 2})]));
    }

    /// Test a plain collection GET keeps the envelope
    #[tokio::test]
    async fn test_non_search_collection_keeps_envelope() {
        let server = MockServer::start().await;
        mount_two_rows(&server).await;

        let client = client_for(&server);
        let output = assert_ok!(client.get("users", QueryOptions::new()).await);

        let page = output.page().expect("envelope retained");
        assert_eq!(page.count, Some(2));
        assert_eq!(page.items.len(), 2);
    }

    /// Test 404 response keeps the service body untouched
    #[tokio::test]
    async fn test_404_preserves_body_verbatim() {
        let server = MockServer::start().await;
        let body = r#"{"error":{"message":"not found"}}"#;

        Mock::given(method("GET"))
            .and(path("/v1.0/users/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_raw(body, "application/json"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = assert_err!(client.get("users/missing", QueryOptions::new()).await);

        match err {
            GraphError::Api { status, body: text } => {
                assert_eq!(status, 404);
                assert_eq!(text, body);
            }
            other => panic!("expected an API error, got {:?}", other),
        }
    }

    /// Test 429 surfaces once without a retry
    #[tokio::test]
    async fn test_rate_limit_is_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1.0/users"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = assert_err!(client.get("users", QueryOptions::new()).await);
        assert_eq!(err.status(), Some(429));
    }

    /// Test a collection envelope without value is malformed
    #[tokio::test]
    async fn test_envelope_without_value_is_malformed() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1.0/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "@odata.context": "c",
                "@odata.count": 3
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = assert_err!(client.get("users", QueryOptions::new()).await);
        assert!(matches!(err, GraphError::MalformedResponse(_)));
    }

    /// Test a negative top fails without a request
    #[tokio::test]
    async fn test_negative_top_fails_before_network() {
        let server = MockServer::start().await;

        let client = client_for(&server);
        let err = assert_err!(client.search("users", QueryOptions::new().top(-1)).await);

        assert!(matches!(err, GraphError::InvalidArgument(_)));
        assert_eq!(request_count(&server).await, 0);
    }

    /// Test a refused connection is a transport error
    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let settings = GraphSettings::new("http://127.0.0.1:1", "v1.0").unwrap();
        let client = GraphClient::new(settings, AuthContext::static_token("t")).unwrap();

        let err = assert_err!(client.get("me", QueryOptions::new()).await);
        assert!(matches!(err, GraphError::Transport(_)));
    }
}

mod pagination_tests {
    use super::*;
    use futures::TryStreamExt;

    /// Three pages of 10, 10 and 5 rows; the last page has no next-link
    async fn mount_three_pages(server: &MockServer) {
        let base = format!("{}/v1.0/users", server.uri());

        Mock::given(method("GET"))
            .and(path("/v1.0/users"))
            .and(query_param_is_missing("$skiptoken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "@odata.context": "c",
                "@odata.nextLink": format!("{}?$skiptoken=p2", base),
                "value": rows(0..10)
            })))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1.0/users"))
            .and(query_param("$skiptoken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "@odata.context": "c",
                "@odata.nextLink": format!("{}?$skiptoken=p3", base),
                "value": rows(10..20)
            })))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1.0/users"))
            .and(query_param("$skiptoken", "p3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "@odata.context": "c",
                "value": rows(20..25)
            })))
            .mount(server)
            .await;
    }

    /// Test three pages are concatenated in fetch order
    #[tokio::test]
    async fn test_fetch_all_concatenates_in_fetch_order() {
        let server = MockServer::start().await;
        mount_three_pages(&server).await;

        let client = client_for(&server);
        let items = assert_ok!(client.list_all("users", QueryOptions::new()).await);

        assert_eq!(items.len(), 25);
        assert_eq!(items, rows(0..25));
        assert_eq!(request_count(&server).await, 3);
    }

    /// Test caller headers reach the first page when paging a full spec
    #[tokio::test]
    async fn test_invoke_all_sends_caller_headers_on_first_page() {
        let server = MockServer::start().await;
        let base = format!("{}/v1.0/groups", server.uri());

        Mock::given(method("GET"))
            .and(path("/v1.0/groups"))
            .and(query_param_is_missing("$skiptoken"))
            .and(header("X-Tenant", "contoso"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "@odata.context": "c",
                "@odata.nextLink": format!("{}?$skiptoken=p2", base),
                "value": rows(0..2)
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1.0/groups"))
            .and(query_param("$skiptoken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "@odata.context": "c",
                "value": rows(2..3)
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let spec = RequestSpec::get("groups").with_header("X-Tenant", "contoso");
        let items = assert_ok!(client.invoke_all(&spec).await);
        assert_eq!(items, rows(0..3));

        let requests = server.received_requests().await.unwrap();
        assert!(!requests[1].headers.contains_key("x-tenant"));
    }

    /// Test paging a non-GET spec is refused without a request
    #[tokio::test]
    async fn test_invoke_all_rejects_non_get() {
        let server = MockServer::start().await;
        let client = client_for(&server);

        let spec = RequestSpec::new(Method::Post, "groups").with_body(Content::json(json!({})));
        let err = assert_err!(client.invoke_all(&spec).await);
        assert!(matches!(err, GraphError::InvalidArgument(_)));
        assert_eq!(request_count(&server).await, 0);
    }

    /// Test the next-link is replayed without added options
    #[tokio::test]
    async fn test_next_replays_link_verbatim() {
        let server = MockServer::start().await;
        let link = format!(
            "{}/v1.0/users?%24skiptoken=X%2BY%3D%3D&$top=3",
            server.uri()
        );

        Mock::given(method("GET"))
            .and(path("/v1.0/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "@odata.context": "c",
                "value": [{"id": "last"}]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let first = graphverb::graph::CollectionPage {
            items: vec![],
            count: None,
            next_link: Some(link),
        };

        let page = assert_ok!(client.next_page(&first).await).expect("a following page");
        assert!(page.is_terminal());
        assert_eq!(page.items, vec![json!({"id": "last"})]);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method.as_str(), "GET");
        assert_eq!(requests[0].url.query(), Some("%24skiptoken=X%2BY%3D%3D&$top=3"));
        assert!(!requests[0].headers.contains_key("consistencylevel"));
        assert!(!requests[0].headers.contains_key("prefer"));
    }

    /// Test a relative next-link resolves against the base address
    #[tokio::test]
    async fn test_relative_next_link_resolves_against_base() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1.0/users"))
            .and(query_param("$skiptoken", "r"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "@odata.context": "c",
                "value": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let first = graphverb::graph::CollectionPage {
            items: vec![],
            count: None,
            next_link: Some("users?$skiptoken=r".to_string()),
        };
        assert_ok!(client.next_page(&first).await);
    }

    /// Test a terminal page ends pagination without a request
    #[tokio::test]
    async fn test_terminal_page_issues_no_request() {
        let server = MockServer::start().await;

        let client = client_for(&server);
        let last = graphverb::graph::CollectionPage {
            items: rows(0..3),
            count: Some(3),
            next_link: None,
        };

        assert_eq!(assert_ok!(client.next_page(&last).await), None);
        let mut pager = client.pages(&last);
        assert!(pager.is_done());
        assert_eq!(assert_ok!(pager.next().await), None);
        assert_eq!(request_count(&server).await, 0);
    }

    /// Test the page stream yields the remaining pages
    #[tokio::test]
    async fn test_pages_stream_yields_remaining_pages() {
        let server = MockServer::start().await;
        mount_three_pages(&server).await;

        let client = client_for(&server);
        let first = assert_ok!(client.get("users", QueryOptions::new()).await);
        let first = first.page().cloned().expect("first page is an envelope");

        let pages: Vec<_> = assert_ok!(client.pages(&first).into_stream().try_collect().await);
        let sizes: Vec<usize> = pages.iter().map(|p| p.items.len()).collect();
        assert_eq!(sizes, vec![10, 5]);
    }

    /// Test a failed page fails fetch_all and can be retried by hand
    #[tokio::test]
    async fn test_failed_page_fails_fetch_all_and_cursor_can_retry() {
        let server = MockServer::start().await;
        let base = format!("{}/v1.0/users", server.uri());

        Mock::given(method("GET"))
            .and(path("/v1.0/users"))
            .and(query_param("$skiptoken", "p2"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .up_to_n_times(2)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1.0/users"))
            .and(query_param("$skiptoken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "@odata.context": "c",
                "value": rows(10..12)
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let first = graphverb::graph::CollectionPage {
            items: rows(0..10),
            count: None,
            next_link: Some(format!("{}?$skiptoken=p2", base)),
        };

        let err = assert_err!(client.fetch_all(first.clone()).await);
        assert_eq!(err.status(), Some(503));

        let mut pager = client.pages(&first);
        let err = assert_err!(pager.next().await);
        assert_eq!(err.status(), Some(503));
        assert!(!pager.is_done());

        let page = assert_ok!(pager.next().await).expect("retried page");
        assert_eq!(page.items, rows(10..12));
        assert_eq!(pager.pages_fetched(), 1);
        assert!(pager.is_done());
    }

    /// Test a next page that is not a collection is malformed
    #[tokio::test]
    async fn test_non_collection_next_page_is_malformed() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1.0/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "x"})))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let first = graphverb::graph::CollectionPage {
            items: vec![],
            count: None,
            next_link: Some("users?$skiptoken=z".to_string()),
        };
        let err = assert_err!(client.next_page(&first).await);
        assert!(matches!(err, GraphError::MalformedResponse(_)));
    }
}

mod cancellation_tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    /// Test cancelling before send makes no request
    #[tokio::test]
    async fn test_cancelled_before_send_makes_no_request() {
        let server = MockServer::start().await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let client = client_for(&server).with_cancellation(cancel);

        let err = assert_err!(client.get("me", QueryOptions::new()).await);
        assert!(matches!(err, GraphError::Cancelled));
        assert_eq!(request_count(&server).await, 0);
    }

    /// Test cancelling an in-flight request
    #[tokio::test]
    async fn test_cancel_in_flight_request() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1.0/me"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"id": "slow"}))
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let client = client_for(&server).with_cancellation(cancel.clone());

        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });

        let spec = RequestSpec::new(Method::Get, "me");
        let err = assert_err!(client.invoke(&spec, CallKind::Get).await);
        assert!(matches!(err, GraphError::Cancelled));
        trigger.await.unwrap();
    }
}
