// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Calendar sync tests.
//!
//! These tests verify that:
//! 1. `/sync` rejects callers without a verified identity token
//! 2. Unconnected users get `not_connected` without any provider call
//! 3. Connected users get projected events for the next week
//! 4. Preflight and error responses carry the fixed CORS headers

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use common::{FakeGoogleBehavior, FAKE_REFRESH_TOKEN};
use tower::ServiceExt;
use trip_calendar::models::CalendarCredential;
use trip_calendar::services::{kms, KmsService};
use trip_calendar::AppState;

mod common;

fn sync_request(auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri("/sync");
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder.body(Body::empty()).unwrap()
}

async fn connect_user(state: &AppState, user_id: &str) {
    let encrypted = kms::encrypt_refresh_token(&KmsService::new_mock(), FAKE_REFRESH_TOKEN, user_id)
        .await
        .unwrap();
    state
        .db
        .set_credential(&CalendarCredential {
            user_id: user_id.to_string(),
            refresh_token_encrypted: encrypted,
            connected_at: "2026-10-01T00:00:00Z".to_string(),
            scopes: vec![],
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_sync_requires_bearer_token() {
    let (app, _state, google) = common::create_test_app_with_google(FakeGoogleBehavior::default()).await;

    for auth in [None, Some("Basic dXNlcjpwYXNz"), Some("Bearer ")] {
        let response = app.clone().oneshot(sync_request(auth)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "auth: {:?}", auth);
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "http://localhost:5173"
        );
        let body = common::body_json(response).await;
        assert_eq!(body["error"], "unauthorized");
    }

    assert_eq!(google.log.token_calls(), 0);
}

#[tokio::test]
async fn test_sync_rejects_unverifiable_token() {
    let (app, state) = common::create_test_app();
    let forged = common::create_test_jwt("user-1", b"some-other-key");

    let response = app
        .clone()
        .oneshot(sync_request(Some(&format!("Bearer {}", forged))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = common::body_json(response).await;
    assert_eq!(body["error"], "invalid_token");

    // An empty subject never identifies a user.
    let anonymous = common::create_test_jwt("", &common::identity_key(&state.config));
    let response = app
        .oneshot(sync_request(Some(&format!("Bearer {}", anonymous))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sync_not_connected_makes_no_provider_call() {
    let (app, state, google) = common::create_test_app_with_google(FakeGoogleBehavior::default()).await;
    let token = common::create_test_jwt("user-1", &common::identity_key(&state.config));

    let response = app
        .oneshot(sync_request(Some(&format!("Bearer {}", token))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = common::body_json(response).await;
    assert_eq!(body["error"], "not_connected");
    assert_eq!(google.log.token_calls(), 0);
    assert_eq!(google.log.events_calls(), 0);
}

#[tokio::test]
async fn test_sync_returns_projected_events() {
    let behavior = FakeGoogleBehavior {
        events: serde_json::json!([
            {
                "id": "evt-1",
                "status": "confirmed",
                "summary": "Flight to Lisbon",
                "location": "SFO",
                "start": { "dateTime": "2026-10-20T08:00:00-07:00", "timeZone": "America/Los_Angeles" },
                "end": { "dateTime": "2026-10-20T20:00:00+01:00" },
                "attendees": [{ "email": "someone@example.com" }]
            },
            {
                "id": "evt-2",
                "start": { "date": "2026-10-22" },
                "end": { "date": "2026-10-23" }
            }
        ]),
        ..Default::default()
    };
    let (app, state, google) = common::create_test_app_with_google(behavior).await;
    connect_user(&state, "user-1").await;
    let token = common::create_test_jwt("user-1", &common::identity_key(&state.config));

    let response = app
        .oneshot(sync_request(Some(&format!("Bearer {}", token))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(
        body,
        serde_json::json!({
            "trips": [
                {
                    "id": "evt-1",
                    "summary": "Flight to Lisbon",
                    "location": "SFO",
                    "start": { "dateTime": "2026-10-20T08:00:00-07:00", "timeZone": "America/Los_Angeles" },
                    "end": { "dateTime": "2026-10-20T20:00:00+01:00" }
                },
                {
                    "id": "evt-2",
                    "start": { "date": "2026-10-22" },
                    "end": { "date": "2026-10-23" }
                }
            ]
        })
    );

    let form = google.log.last_token_form().unwrap();
    assert_eq!(form["grant_type"], "refresh_token");
    assert_eq!(form["refresh_token"], FAKE_REFRESH_TOKEN);

    let query = google.log.last_events_query().unwrap();
    assert_eq!(query["singleEvents"], "true");
    assert_eq!(query["orderBy"], "startTime");
    let time_min = chrono::DateTime::parse_from_rfc3339(&query["timeMin"]).unwrap();
    let time_max = chrono::DateTime::parse_from_rfc3339(&query["timeMax"]).unwrap();
    assert_eq!(time_max - time_min, chrono::Duration::days(7));
}

#[tokio::test]
async fn test_sync_refresh_failure_is_upstream_error() {
    let behavior = FakeGoogleBehavior {
        token_status: StatusCode::BAD_REQUEST,
        ..Default::default()
    };
    let (app, state, google) = common::create_test_app_with_google(behavior).await;
    connect_user(&state, "user-1").await;
    let token = common::create_test_jwt("user-1", &common::identity_key(&state.config));

    let response = app
        .oneshot(sync_request(Some(&format!("Bearer {}", token))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = common::body_json(response).await;
    assert_eq!(body["error"], "upstream_error");
    assert_eq!(google.log.events_calls(), 0);
}

#[tokio::test]
async fn test_sync_preflight() {
    let (app, _state, google) = common::create_test_app_with_google(FakeGoogleBehavior::default()).await;

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/sync")
                .header(header::ORIGIN, "http://localhost:5173")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let headers = response.headers();
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "http://localhost:5173"
    );
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_HEADERS).unwrap(),
        "Authorization,Content-Type"
    );
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_METHODS).unwrap(),
        "GET,OPTIONS"
    );

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(body.is_empty());
    assert_eq!(google.log.token_calls(), 0);
}

#[tokio::test]
async fn test_disconnect_removes_credential() {
    let (app, state) = common::create_test_app();
    connect_user(&state, "user-1").await;
    let token = common::create_test_jwt("user-1", &common::identity_key(&state.config));

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri("/sync")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    assert!(state.db.get_credential("user-1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_sync_single_event_without_location() {
    let behavior = FakeGoogleBehavior {
        events: serde_json::json!([{
            "id": "e1",
            "summary": "Museum",
            "start": { "dateTime": "2026-10-21T10:00:00Z" },
            "end": { "dateTime": "2026-10-21T12:00:00Z" }
        }]),
        ..Default::default()
    };
    let (app, state, _google) = common::create_test_app_with_google(behavior).await;
    connect_user(&state, "user-1").await;
    let token = common::create_test_jwt("user-1", &common::identity_key(&state.config));

    let response = app
        .oneshot(sync_request(Some(&format!("Bearer {}", token))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    let event = &body["trips"][0];
    assert_eq!(body["trips"].as_array().unwrap().len(), 1);
    assert_eq!(event["id"], "e1");
    assert_eq!(event["summary"], "Museum");
    assert!(event.get("location").is_none());
}

#[tokio::test]
async fn test_sync_calendar_failure_is_upstream_error() {
    let behavior = FakeGoogleBehavior {
        events_status: StatusCode::SERVICE_UNAVAILABLE,
        ..Default::default()
    };
    let (app, state, google) = common::create_test_app_with_google(behavior).await;
    connect_user(&state, "user-1").await;
    let token = common::create_test_jwt("user-1", &common::identity_key(&state.config));

    let response = app
        .oneshot(sync_request(Some(&format!("Bearer {}", token))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "http://localhost:5173"
    );
    let body = common::body_json(response).await;
    assert_eq!(body["error"], "upstream_error");
    assert!(!body.to_string().contains("backend error"));
    assert_eq!(google.log.events_calls(), 1);
}

#[tokio::test]
async fn test_sync_follows_event_pages() {
    let events: Vec<serde_json::Value> = (1..=5)
        .map(|i| serde_json::json!({ "id": format!("evt-{}", i), "summary": format!("Stop {}", i) }))
        .collect();
    let behavior = FakeGoogleBehavior {
        events: serde_json::Value::Array(events),
        events_page_size: Some(2),
        ..Default::default()
    };
    let (app, state, google) = common::create_test_app_with_google(behavior).await;
    connect_user(&state, "user-1").await;
    let token = common::create_test_jwt("user-1", &common::identity_key(&state.config));

    let response = app
        .oneshot(sync_request(Some(&format!("Bearer {}", token))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    let ids: Vec<&str> = body["trips"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["evt-1", "evt-2", "evt-3", "evt-4", "evt-5"]);

    // Three pages; later pages keep the same window and carry the token.
    assert_eq!(google.log.events_calls(), 3);
    let last = google.log.last_events_query().unwrap();
    assert_eq!(last["pageToken"], "4");
    assert_eq!(last["singleEvents"], "true");
}

#[tokio::test]
async fn test_sync_stops_at_page_limit() {
    let events: Vec<serde_json::Value> = (0..15)
        .map(|i| serde_json::json!({ "id": format!("evt-{:02}", i) }))
        .collect();
    let behavior = FakeGoogleBehavior {
        events: serde_json::Value::Array(events),
        events_page_size: Some(1),
        ..Default::default()
    };
    let (app, state, google) = common::create_test_app_with_google(behavior).await;
    connect_user(&state, "user-1").await;
    let token = common::create_test_jwt("user-1", &common::identity_key(&state.config));

    let response = app
        .oneshot(sync_request(Some(&format!("Bearer {}", token))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["trips"].as_array().unwrap().len(), 10);
    assert_eq!(google.log.events_calls(), 10);
}

#[tokio::test]
async fn test_sync_unsupported_method_requires_identity_first() {
    let (app, state) = common::create_test_app();
    let token = common::create_test_jwt("user-1", &common::identity_key(&state.config));

    let put = |auth: Option<String>| {
        let mut builder = Request::builder().method(Method::PUT).uri("/sync");
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        builder.body(Body::empty()).unwrap()
    };

    let response = app.clone().oneshot(put(None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(put(Some(format!("Bearer {}", token))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_some());
}
