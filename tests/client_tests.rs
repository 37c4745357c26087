//! Integration tests for the interceptor pipeline and response normalization.

mod common;

use std::sync::{Arc, Mutex};

use common::ScriptedTransport;
use serde::Deserialize;
use tradeboard_client::interceptors::{on_error, on_request, on_response};
use tradeboard_client::{
    ApiError, ApiResponse, ErrorAction, ErrorKind, Method, RawResponse, RequestOptions,
};

// ============================================================================
// Interceptors
// ============================================================================

#[tokio::test]
async fn test_request_interceptors_run_in_registration_order() {
    let transport = ScriptedTransport::new();
    let client = common::client(&transport);

    client.add_request_interceptor(on_request(|mut config| async move {
        config.set_header("x-trace", "first");
        Ok(config)
    }));
    client.add_request_interceptor(on_request(|mut config| async move {
        let previous = config.header("x-trace").unwrap_or_default().to_string();
        config.set_header("x-trace", format!("{previous},second"));
        Ok(config)
    }));

    client.get("/positions").await.unwrap();

    assert_eq!(
        transport.api_requests()[0].header("x-trace"),
        Some("first,second")
    );
}

#[tokio::test]
async fn test_request_interceptor_sees_authorization() {
    let transport = ScriptedTransport::new();
    let client = common::client(&transport);
    let token = common::jwt_expiring_in(3600);
    client
        .login(&tradeboard_client::TokenPair::new(token.clone(), "refresh"))
        .unwrap();

    let seen = Arc::new(Mutex::new(None));
    client.add_request_interceptor(on_request({
        let seen = Arc::clone(&seen);
        move |config| {
            *seen.lock().unwrap() = config.bearer_token().map(str::to_string);
            async move { Ok(config) }
        }
    }));

    client.get("/positions").await.unwrap();
    assert_eq!(seen.lock().unwrap().as_deref(), Some(token.as_str()));
}

#[tokio::test]
async fn test_request_interceptor_rejection_skips_network() {
    let transport = ScriptedTransport::new();
    let client = common::client(&transport);

    client.add_request_interceptor(on_request(|_config| async move {
        Err(ApiError::new(ErrorKind::Validation, "Market closed"))
    }));

    let err = client.get("/orders").await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(err.message, "Market closed");
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn test_response_interceptor_transforms_data() {
    let transport = ScriptedTransport::new();
    let client = common::client(&transport);

    client.add_response_interceptor(on_response(|mut response: ApiResponse| async move {
        let inner = response.data.take();
        response.data = serde_json::json!({ "wrapped": inner });
        Ok(response)
    }));

    let data = client.get("/positions").await.unwrap();
    assert_eq!(data["wrapped"]["method"], "GET");
}

#[tokio::test]
async fn test_error_interceptor_observes_and_propagates() {
    let transport = ScriptedTransport::new();
    transport.push_status(404);
    let client = common::client(&transport);

    let observed = Arc::new(Mutex::new(Vec::new()));
    client.add_error_interceptor(on_error({
        let observed = Arc::clone(&observed);
        move |err, config| {
            observed
                .lock()
                .unwrap()
                .push((err.kind, config.url.clone()));
            async move { ErrorAction::Propagate }
        }
    }));

    let err = client.get("/instruments/XYZ").await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(
        *observed.lock().unwrap(),
        vec![(
            ErrorKind::NotFound,
            "https://api.test.local/v1/instruments/XYZ".to_string()
        )]
    );
}

#[tokio::test]
async fn test_error_interceptor_recovery_result() {
    let transport = ScriptedTransport::new();
    transport.push_status(501);
    let client = common::client(&transport);

    client.add_error_interceptor(on_error(|err, _config| async move {
        if err.kind == ErrorKind::Server {
            ErrorAction::Recover(ApiResponse {
                status: 200,
                ok: true,
                data: serde_json::json!({ "cached": true }),
                headers: Default::default(),
            })
        } else {
            ErrorAction::Propagate
        }
    }));

    let data = client.get("/portfolio").await.unwrap();
    assert_eq!(data, serde_json::json!({ "cached": true }));
}

#[tokio::test]
async fn test_removed_interceptor_no_longer_runs() {
    let transport = ScriptedTransport::new();
    let client = common::client(&transport);

    let id = client.add_request_interceptor(on_request(|mut config| async move {
        config.set_header("x-debug", "1");
        Ok(config)
    }));
    client.get("/a").await.unwrap();

    assert!(client.remove_interceptor(id));
    assert!(!client.remove_interceptor(id));
    client.get("/b").await.unwrap();

    let api = transport.api_requests();
    assert_eq!(api[0].header("x-debug"), Some("1"));
    assert_eq!(api[1].header("x-debug"), None);
}

// ============================================================================
// Normalization
// ============================================================================

#[tokio::test]
async fn test_status_to_error_kind() {
    let cases = [
        (400, ErrorKind::Validation),
        (403, ErrorKind::Authorization),
        (404, ErrorKind::NotFound),
        (409, ErrorKind::Conflict),
        (500, ErrorKind::Server),
        (418, ErrorKind::Unknown),
    ];

    for (status, kind) in cases {
        let transport = ScriptedTransport::new();
        transport.push_status(status);
        let mut config = common::config();
        config.max_retries = 0;
        let client = common::builder(config, &transport).build().unwrap();

        let err = client.get("/x").await.unwrap_err();
        assert_eq!(err.kind, kind, "status {status}");
        assert_eq!(err.status, Some(status));
        assert_eq!(err.message, format!("Request failed with status {status}"));
    }
}

#[tokio::test]
async fn test_validation_error_keeps_field_details() {
    let transport = ScriptedTransport::new();
    transport.push(Ok(RawResponse::new(422).with_json(&serde_json::json!({
        "message": "Order rejected",
        "errors": { "quantity": "must be positive" }
    }))));
    let client = common::client(&transport);

    let err = client
        .post("/orders", &serde_json::json!({ "quantity": -1 }))
        .await
        .unwrap_err();

    // 422 is outside the mapped set
    assert_eq!(err.kind, ErrorKind::Unknown);
    assert_eq!(err.message, "Order rejected");
    assert_eq!(
        err.field_errors().unwrap()["quantity"],
        serde_json::json!("must be positive")
    );
}

#[tokio::test]
async fn test_success_bodies() {
    let transport = ScriptedTransport::new();
    transport.push(Ok(RawResponse::new(204)));
    transport.push(Ok(RawResponse::new(200).with_text("pong")));
    let client = common::client(&transport);

    assert_eq!(client.delete("/alerts/4").await.unwrap(), serde_json::Value::Null);
    assert_eq!(client.get("/ping").await.unwrap(), serde_json::json!("pong"));
}

#[tokio::test]
async fn test_full_response_and_typed_data() {
    #[derive(Debug, Deserialize)]
    struct Echo {
        url: String,
        method: String,
    }

    let transport = ScriptedTransport::new();
    let client = common::client(&transport);

    let options = RequestOptions::builder()
        .method(Method::Get)
        .query(vec![("symbol".to_string(), "BTC-USD".to_string())])
        .build();
    let response = client.request("/candles", options).await.unwrap();
    assert_eq!(response.status, 200);
    assert!(response.ok);
    assert_eq!(
        response.headers.get("content-type").map(String::as_str),
        Some("application/json")
    );
    assert_eq!(
        transport.api_requests()[0].query,
        vec![("symbol".to_string(), "BTC-USD".to_string())]
    );

    let echo: Echo = client.get_json("/candles").await.unwrap();
    assert_eq!(echo.url, "https://api.test.local/v1/candles");
    assert_eq!(echo.method, "GET");
}
