//! Integration tests for resource models using wiremock
//!
//! These tests run the CRUD engine and query cache against mocked
//! endpoints, checking error discrimination, pagination handling and cache
//! invalidation after writes.

use chronicle::api::{AcceptLanguage, ApiClient, ApiError, BearerToken, RetryPolicy};
use chronicle::cache::{CacheKey, QueryParams, QueryStatus};
use chronicle::resource::models::{Event, EventCategory};
use chronicle::resource::{ResourceContext, ResourceDescriptor};
use serde_json::{json, Value};
use wiremock::matchers::{bearer_token, body_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn context(server: &MockServer) -> ResourceContext {
    let client = ApiClient::new(&format!("{}/api/", server.uri()))
        .expect("client should build")
        .with_decorator(BearerToken::new("test-token"))
        .with_decorator(AcceptLanguage::new("ko-KR"));
    ResourceContext::new(client).with_retry(RetryPolicy::none())
}

fn event_json(id: i64, title: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "description": "",
        "event_type": "RAID",
        "category": 2,
        "game_world": null,
        "starts_at": "2024-05-01T18:00:00Z",
        "ends_at": null,
        "is_active": true
    })
}

/// Test module for read operations
mod read_tests {
    use super::*;

    /// Test list with an enveloped response and injected headers
    #[tokio::test]
    async fn test_list_envelope_with_headers() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/journal/events/"))
            .and(query_param("is_active", "true"))
            .and(bearer_token("test-token"))
            .and(header("accept-language", "ko-KR"))
            .and(header_exists("x-request-id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 2,
                "next": null,
                "previous": null,
                "results": [event_json(1, "Raid Night"), event_json(2, "Siege")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let events = context(&server).model::<Event>().unwrap();
        let params = QueryParams::new().with("is_active", true);
        let items = events.list(&params).await.expect("list should succeed");

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Raid Night");
        assert_eq!(items[1].id, 2);
    }

    /// Test list with a bare array response
    #[tokio::test]
    async fn test_list_bare_array() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/journal/event-categories/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1, "name": "Raids", "slug": "raids", "color": "#aa3333"}
            ])))
            .mount(&server)
            .await;

        let categories = context(&server).model::<EventCategory>().unwrap();
        let page = categories.list_page(&QueryParams::new()).await.unwrap();

        assert_eq!(page.results[0].name, "Raids");
        assert_eq!(page.count, Some(1));
        assert!(page.next.is_none());
    }

    /// Test that list_all follows next links
    #[tokio::test]
    async fn test_list_all_follows_next_links() {
        let server = MockServer::start().await;
        let next = format!("{}/api/journal/events/?page=2", server.uri());

        Mock::given(method("GET"))
            .and(path("/api/journal/events/"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 3,
                "next": null,
                "results": [event_json(3, "Third")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/journal/events/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 3,
                "next": next,
                "results": [event_json(1, "First"), event_json(2, "Second")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let events = context(&server).model::<Event>().unwrap();
        let all = events.list_all(&QueryParams::new()).await.unwrap();

        let ids: Vec<i64> = all.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    /// Test 404 on a single item is NotFound, not a generic HTTP error
    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/journal/events/999/"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"detail": "Not found."})),
            )
            .mount(&server)
            .await;

        let events = context(&server).model::<Event>().unwrap();
        let err = events.get(999).await.unwrap_err();

        assert!(err.is_not_found(), "expected NotFound, got {:?}", err);
    }

    /// Test 403 on a list is an HTTP error carrying the status
    #[tokio::test]
    async fn test_forbidden_list_is_http_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/journal/activity-logs/"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_json(json!({"detail": "You do not have permission."})),
            )
            .mount(&server)
            .await;

        let logs = context(&server).model_by_name::<Value>("activity-log").unwrap();
        let err = logs.list(&QueryParams::new()).await.unwrap_err();

        assert!(matches!(err, ApiError::Http { status: 403, .. }));
        assert!(!err.is_retryable());
    }

    /// Test a response that does not match the declared type fails the read
    #[tokio::test]
    async fn test_shape_mismatch_is_decode_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/journal/events/5/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "five",
                "title": 12
            })))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/journal/events/5/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(event_json(5, "Fixed")))
            .expect(1)
            .mount(&server)
            .await;

        let ctx = context(&server);
        let events = ctx.model::<Event>().unwrap();
        let err = events.get(5).await.unwrap_err();

        assert!(matches!(err, ApiError::Decode(_)));
        let key = CacheKey::item("event", 5);
        assert_eq!(ctx.cache().status(&key), QueryStatus::Errored);

        // The rejected payload is not served again
        assert_eq!(events.get(5).await.unwrap().title, "Fixed");
        assert_eq!(ctx.cache().status(&key), QueryStatus::Resolved);
    }

    /// Test list_all follows next links that leave the collection path
    #[tokio::test]
    async fn test_list_all_follows_absolute_next_url() {
        let server = MockServer::start().await;
        let next = format!("{}/api/journal/events/cursor/?cursor=abc", server.uri());

        Mock::given(method("GET"))
            .and(path("/api/journal/events/cursor/"))
            .and(query_param("cursor", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "next": null,
                "results": [event_json(2, "Second")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/journal/events/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "next": next,
                "results": [event_json(1, "First")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let events = context(&server).model::<Event>().unwrap();
        let all = events.list_all(&QueryParams::new()).await.unwrap();

        let titles: Vec<&str> = all.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Second"]);
    }

    /// Test transport failure is a network error
    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        let client = ApiClient::new("http://127.0.0.1:9/api/").unwrap();
        let ctx = ResourceContext::new(client).with_retry(RetryPolicy::none());
        let events = ctx.model::<Event>().unwrap();

        let err = events.list(&QueryParams::new()).await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)), "got {:?}", err);
        assert!(err.is_retryable());
    }

    /// Test 5xx reads are retried
    #[tokio::test]
    async fn test_server_error_is_retried() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/news/"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/news/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let retry = RetryPolicy {
            max_retries: 2,
            base_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(5),
        };
        let ctx = context(&server).with_retry(retry);
        let news = ctx.model_by_name::<Value>("news").unwrap();

        let items = news.list(&QueryParams::new()).await.unwrap();
        assert!(items.is_empty());
    }

    /// Test concurrent reads of one key reach the server once
    #[tokio::test]
    async fn test_concurrent_reads_are_deduplicated() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/journal/events/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([event_json(1, "Only")]))
                    .set_delay(std::time::Duration::from_millis(50)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let events = context(&server).model::<Event>().unwrap();
        let params = QueryParams::new();
        let reads = (0..8).map(|_| events.list(&params));
        let results = futures::future::join_all(reads).await;

        for result in results {
            assert_eq!(result.unwrap()[0].title, "Only");
        }
    }
}

/// Test module for write operations
mod write_tests {
    use super::*;

    /// Test create returns the server's instance and get returns equal data
    #[tokio::test]
    async fn test_create_then_get_round_trip() {
        let server = MockServer::start().await;
        let created = event_json(10, "Harvest Festival");

        Mock::given(method("POST"))
            .and(path("/api/journal/events/"))
            .and(body_json(json!({"title": "Harvest Festival", "event_type": "RAID"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(&created))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/journal/events/10/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&created))
            .mount(&server)
            .await;

        let events = context(&server).model::<Event>().unwrap();
        let made = events
            .create(&json!({"title": "Harvest Festival", "event_type": "RAID"}))
            .await
            .unwrap();
        let fetched = events.get(made.id).await.unwrap();

        assert_eq!(made, fetched);
    }

    /// Test field-level rejection surfaces as a validation error
    #[tokio::test]
    async fn test_create_validation_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/journal/events/"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "title": ["This field is required."],
                "starts_at": ["Datetime has wrong format."]
            })))
            .mount(&server)
            .await;

        let events = context(&server).model::<Event>().unwrap();
        let err = events.create(&json!({"event_type": "RAID"})).await.unwrap_err();

        let fields = err.field_errors().expect("expected a validation error");
        let keys: Vec<&str> = fields.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["starts_at", "title"]);
    }

    /// Test rejected fields named like error metadata still surface as fields
    #[tokio::test]
    async fn test_validation_on_status_and_code_fields() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/journal/events/"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "status": ["\"X\" is not a valid choice."],
                "code": ["This field must be unique."]
            })))
            .mount(&server)
            .await;

        let events = context(&server).model::<Event>().unwrap();
        let err = events
            .create(&json!({"title": "Raid", "status": "X", "code": "R1"}))
            .await
            .unwrap_err();

        let fields = err.field_errors().expect("expected a validation error");
        let keys: Vec<&str> = fields.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["code", "status"]);
        assert_eq!(fields["code"], vec!["This field must be unique."]);
    }

    /// Test resources with a dedicated create URL post there
    #[tokio::test]
    async fn test_create_uses_create_url() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/journal/multimedia/upload/"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": 4,
                "title": "Banner",
                "file": "https://cdn.example.com/banner.png",
                "content_type": "image/png",
                "uploaded_at": "2024-05-01T10:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let media = context(&server)
            .model::<chronicle::resource::models::Multimedia>()
            .unwrap();
        let item = media.create(&json!({"title": "Banner"})).await.unwrap();
        assert_eq!(item.content_type, "image/png");
    }

    /// Test update invalidates cached reads of the resource
    #[tokio::test]
    async fn test_update_invalidates_cached_reads() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/journal/events/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([event_json(1, "Old")])))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("PATCH"))
            .and(path("/api/journal/events/1/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(event_json(1, "New")))
            .expect(1)
            .mount(&server)
            .await;

        let events = context(&server).model::<Event>().unwrap();
        let params = QueryParams::new();
        assert_eq!(events.list(&params).await.unwrap()[0].title, "Old");
        // Served from cache
        assert_eq!(events.list(&params).await.unwrap()[0].title, "Old");

        Mock::given(method("GET"))
            .and(path("/api/journal/events/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([event_json(1, "New")])))
            .expect(1)
            .mount(&server)
            .await;

        events.update(1, &json!({"title": "New"})).await.unwrap();
        assert_eq!(events.list(&params).await.unwrap()[0].title, "New");
    }

    /// Test create invalidates cached reads of the resource
    #[tokio::test]
    async fn test_create_invalidates_cached_reads() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/news/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/api/news/"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"id": 9, "title": "Patch notes"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let news = context(&server).model_by_name::<Value>("news").unwrap();
        let params = QueryParams::new();
        assert!(news.list(&params).await.unwrap().is_empty());
        assert!(news.list(&params).await.unwrap().is_empty());

        Mock::given(method("GET"))
            .and(path("/api/news/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"id": 9, "title": "Patch notes"}])),
            )
            .expect(1)
            .mount(&server)
            .await;

        news.create(&json!({"title": "Patch notes"})).await.unwrap();
        let items = news.list(&params).await.unwrap();
        assert_eq!(items[0]["id"], 9);
    }

    /// Test delete invalidates cached reads of the resource
    #[tokio::test]
    async fn test_delete_invalidates_cached_reads() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/journal/events/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([event_json(1, "Doomed"), event_json(2, "Kept")])),
            )
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("DELETE"))
            .and(path("/api/journal/events/1/"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let events = context(&server).model::<Event>().unwrap();
        let params = QueryParams::new();
        assert_eq!(events.list(&params).await.unwrap().len(), 2);
        assert_eq!(events.list(&params).await.unwrap().len(), 2);

        Mock::given(method("GET"))
            .and(path("/api/journal/events/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([event_json(2, "Kept")])))
            .expect(1)
            .mount(&server)
            .await;

        events.delete(1).await.unwrap();
        let remaining = events.list(&params).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, 2);
    }

    /// Test update on a missing item is NotFound
    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/api/journal/events/77/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let events = context(&server).model::<Event>().unwrap();
        let err = events.update(77, &json!({"title": "x"})).await.unwrap_err();
        assert!(err.is_not_found());
    }

    /// Test delete with an empty 204 body
    #[tokio::test]
    async fn test_delete_no_content() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/api/news/3/"))
            .and(bearer_token("test-token"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let news = context(&server).model_by_name::<Value>("news").unwrap();
        news.delete(3).await.expect("delete should succeed");
    }

    /// Test put-declared resources update with PUT
    #[tokio::test]
    async fn test_custom_descriptor_update_method() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/api/guilds/8/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 8, "name": "Wolves"})))
            .expect(1)
            .mount(&server)
            .await;

        let descriptor = ResourceDescriptor::new("guild", "guilds/")
            .with_update_method(chronicle::resource::UpdateMethod::Put);
        let guilds = context(&server).model_for::<Value>(descriptor);
        let updated = guilds.update(8, &json!({"name": "Wolves"})).await.unwrap();
        assert_eq!(updated["name"], "Wolves");
    }
}

/// Test module for display names
mod display_tests {
    use super::*;

    #[tokio::test]
    async fn test_label_resolution_after_choices_load() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/journal/events/choices/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"value": "RAID", "display_name": "Raid"},
                {"value": "SIEGE", "display_name": "Castle Siege"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let ctx = context(&server);
        let names = ctx.display_names();
        assert_eq!(names.resolve("event", "SIEGE"), None);

        let choices = ctx.model::<Event>().unwrap().choices().await.unwrap();
        assert_eq!(choices.len(), 2);

        assert_eq!(names.resolve("event", "SIEGE").as_deref(), Some("Castle Siege"));
        assert_eq!(names.resolve("event", "UNKNOWN_CODE"), None);
    }

    #[tokio::test]
    async fn test_choices_without_url_is_missing_url() {
        let server = MockServer::start().await;
        let ctx = context(&server);

        let err = ctx
            .model::<EventCategory>()
            .unwrap()
            .choices()
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::MissingUrl { .. }));
    }

    #[tokio::test]
    async fn test_named_url_fetch() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/journal/multimedia/content-types/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(["image/png", "video/mp4"])))
            .expect(1)
            .mount(&server)
            .await;

        let media = context(&server).model_by_name::<Value>("multimedia").unwrap();
        let types: Vec<String> = media
            .fetch_named("content_types", &QueryParams::new())
            .await
            .unwrap();
        assert_eq!(types, vec!["image/png", "video/mp4"]);
    }
}
