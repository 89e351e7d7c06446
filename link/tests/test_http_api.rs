//! REST collaborator and refresh endpoint against a mock HTTP server.

mod common;

use common::make_jwt;
use notify_link::{
    CredentialStore, HttpNotificationApi, MemoryCredentialStore, NotificationApi, NotificationId,
    NotificationStore, NotifyLinkError, RefreshCoordinator, SessionCredentials, SessionStatus,
    SessionTokenProvider, StaticTokenProvider,
};
use serde_json::json;
use std::sync::Arc;
use wiremock::{
    matchers::{body_json, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

const LIST_PATH: &str = "/api/notifications/notifications/";

fn sample_list() -> serde_json::Value {
    json!([
        {
            "id": 2,
            "notification_type": "application_approved",
            "title": "Application approved",
            "message": "Your application to Rust 101 was approved",
            "is_read": false,
            "created_at": "2025-04-02T10:00:00Z",
            "application_id": 11,
            "formation_id": 3,
            "formation_title": "Rust 101"
        },
        {
            "id": 1,
            "notification_type": "application_submitted",
            "title": "Application submitted",
            "message": "We received your application",
            "is_read": true,
            "created_at": "2025-04-01T10:00:00Z",
            "read_at": "2025-04-01T11:00:00Z"
        }
    ])
}

fn static_api(server: &MockServer, token: &str) -> HttpNotificationApi {
    let coordinator = Arc::new(RefreshCoordinator::new(Arc::new(StaticTokenProvider::new(token))));
    HttpNotificationApi::new(&server.uri(), reqwest::Client::new(), coordinator)
}

fn session_api(
    server: &MockServer,
    access: &str,
    refresh: &str,
) -> (HttpNotificationApi, Arc<MemoryCredentialStore>, Arc<RefreshCoordinator>) {
    let store = Arc::new(MemoryCredentialStore::with_credentials(SessionCredentials::new(
        access, refresh,
    )));
    let http = reqwest::Client::new();
    let provider = SessionTokenProvider::for_base_url(store.clone(), http.clone(), &server.uri());
    let coordinator = Arc::new(RefreshCoordinator::new(Arc::new(provider)));
    let api = HttpNotificationApi::new(&server.uri(), http, Arc::clone(&coordinator));
    (api, store, coordinator)
}

#[tokio::test]
async fn test_list_sends_bearer_and_parses_array() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sample_list()))
        .expect(1)
        .mount(&server)
        .await;

    let list = static_api(&server, "tok").list_notifications().await.unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].id, 2.into());
    assert_eq!(list[0].formation_title.as_deref(), Some("Rust 101"));
    assert!(list[1].is_read);
    assert!(list[1].read_at.is_some());
}

#[tokio::test]
async fn test_unread_count_and_mark_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}unread_count/", LIST_PATH)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unread_count": 4})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}2/mark_as_read/", LIST_PATH)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 2,
            "notification_type": "application_approved",
            "title": "Application approved",
            "message": "ok",
            "is_read": true,
            "created_at": "2025-04-02T10:00:00Z",
            "read_at": "2025-04-02T12:00:00Z"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}mark_all_as_read/", LIST_PATH)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "4 notifications marked as read",
            "count": 4
        })))
        .mount(&server)
        .await;

    let api = static_api(&server, "tok");
    assert_eq!(api.unread_count().await.unwrap(), 4);

    let confirmed = api.mark_as_read(&2.into()).await.unwrap();
    assert!(confirmed.is_read);
    assert!(confirmed.read_at.is_some());

    let response = api.mark_all_as_read().await.unwrap();
    assert_eq!(response.count, 4);
}

#[tokio::test]
async fn test_error_statuses_map_to_typed_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}99/mark_as_read/", LIST_PATH)))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({"detail": "No Notification matches the given query."})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let api = static_api(&server, "tok");
    match api.mark_as_read(&99.into()).await {
        Err(NotifyLinkError::NotFound(message)) => {
            assert_eq!(message, "No Notification matches the given query.")
        },
        other => panic!("expected NotFound, got {:?}", other),
    }
    match api.list_notifications().await {
        Err(NotifyLinkError::ServerError {
            status_code,
            message,
        }) => {
            assert_eq!(status_code, 503);
            assert_eq!(message, "maintenance");
        },
        other => panic!("expected ServerError, got {:?}", other),
    }
}

#[tokio::test]
async fn test_paginated_listing_follows_next_pages() {
    let server = MockServer::start().await;
    let entry = |id: i64, application: i64| {
        json!({
            "id": id,
            "notification_type": "application_submitted",
            "title": format!("Application {}", id),
            "message": "We received your application",
            "is_read": false,
            "created_at": "2025-04-01T10:00:00Z",
            "application": application
        })
    };
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 3,
            "next": null,
            "previous": format!("{}{}", server.uri(), LIST_PATH),
            "results": [entry(1, 10)]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 3,
            "next": format!("{}{}?page=2", server.uri(), LIST_PATH),
            "previous": null,
            "results": [entry(3, 30), entry(2, 20)]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let list = static_api(&server, "tok").list_notifications().await.unwrap();
    let ids: Vec<_> = list.iter().map(|n| n.id.clone()).collect();
    assert_eq!(ids, vec![3.into(), 2.into(), 1.into()]);
    assert_eq!(list[2].application_id, Some(10));
}

#[tokio::test]
async fn test_paginated_listing_seeds_the_store() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 2,
            "next": null,
            "previous": null,
            "results": sample_list()
        })))
        .mount(&server)
        .await;

    let store = NotificationStore::new(Arc::new(static_api(&server, "tok")));
    store.load_baseline().await.unwrap();
    assert_eq!(store.notifications().len(), 2);
    assert_eq!(store.unread_count(), 1);
}

#[tokio::test]
async fn test_text_ids_are_encoded_as_one_path_segment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}a%2Fb%3Fc/mark_as_read/", LIST_PATH)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "a/b?c",
            "notification_type": "system",
            "title": "Maintenance",
            "message": "ok",
            "is_read": true,
            "created_at": "2025-04-02T10:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let id = NotificationId::from("a/b?c");
    let confirmed = static_api(&server, "tok").mark_as_read(&id).await.unwrap();
    assert_eq!(confirmed.id, id);
}

#[tokio::test]
async fn test_401_refreshes_rotates_and_retries_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(header("authorization", "Bearer old-access"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "detail": "Given token not valid for any token type",
            "code": "token_not_valid"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .and(body_json(json!({"refresh": "refresh-1"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access": "new-access", "refresh": "refresh-2"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(header("authorization", "Bearer new-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let (api, store, coordinator) = session_api(&server, "old-access", "refresh-1");
    assert!(api.list_notifications().await.unwrap().is_empty());

    let saved = store.load().unwrap().unwrap();
    assert_eq!(saved.access_token, "new-access");
    assert_eq!(saved.refresh_token, "refresh-2");
    assert_eq!(coordinator.refresh_count(), 1);
    assert_eq!(coordinator.session_status(), SessionStatus::Active);
}

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(header("authorization", "Bearer old-access"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access": "new-access"}))
                .set_delay(std::time::Duration::from_millis(50)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(header("authorization", "Bearer new-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let (api, store, coordinator) = session_api(&server, "old-access", "refresh-1");
    let (a, b, c) = tokio::join!(
        api.list_notifications(),
        api.list_notifications(),
        api.list_notifications()
    );
    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(coordinator.refresh_count(), 1);

    // Refresh token kept when the server does not rotate it.
    assert_eq!(store.load().unwrap().unwrap().refresh_token, "refresh-1");
}

#[tokio::test]
async fn test_rejected_refresh_expires_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "detail": "Token is blacklisted",
            "code": "token_not_valid"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (api, store, coordinator) = session_api(&server, "old-access", "refresh-1");
    let err = api.list_notifications().await.unwrap_err();
    assert!(matches!(err, NotifyLinkError::SessionExpired(_)));
    assert_eq!(coordinator.session_status(), SessionStatus::Expired);
    assert!(store.load().unwrap().is_none());
}

#[tokio::test]
async fn test_expiring_jwt_is_refreshed_before_use() {
    let server = MockServer::start().await;
    let fresh = make_jwt(chrono::Utc::now().timestamp() + 3600);
    Mock::given(method("POST"))
        .and(path("/api/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": fresh})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(header("authorization", format!("Bearer {}", fresh).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let expiring = make_jwt(chrono::Utc::now().timestamp() + 5);
    let (api, _store, coordinator) = session_api(&server, &expiring, "refresh-1");
    api.list_notifications().await.unwrap();
    assert_eq!(coordinator.refresh_count(), 1);
}
