//! Shared fixtures for integration tests: a scripted in-process transport
//! and JWT helpers.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tradeboard_client::{
    ApiClient, ApiClientBuilder, ClientConfig, MemoryStore, RawResponse, RequestConfig, Transport,
    TransportError,
};

pub const BASE_URL: &str = "https://api.test.local/v1";
pub const REFRESH_URL: &str = "https://api.test.local/v1/auth/refresh";

type Reply = Result<RawResponse, TransportError>;

/// In-process API double
///
/// - the refresh endpoint answers with `refresh_reply` after `refresh_delay`
/// - other calls pop a queued reply if one is scripted
/// - otherwise they succeed when the bearer matches `valid_token` (or no
///   token is required) and answer 401 when it does not
pub struct ScriptedTransport {
    sent: Mutex<Vec<RequestConfig>>,
    queued: Mutex<VecDeque<Reply>>,
    valid_token: Mutex<Option<String>>,
    refresh_reply: Mutex<Reply>,
    refresh_delay: Mutex<Duration>,
    refresh_calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            queued: Mutex::new(VecDeque::new()),
            valid_token: Mutex::new(None),
            refresh_reply: Mutex::new(Err(TransportError::new("refresh not scripted"))),
            refresh_delay: Mutex::new(Duration::ZERO),
            refresh_calls: AtomicUsize::new(0),
        })
    }

    /// Only accept API calls carrying this bearer token
    pub fn require_token(&self, token: &str) {
        *self.valid_token.lock().unwrap() = Some(token.to_string());
    }

    /// Answer the refresh endpoint with these tokens
    pub fn refresh_returns(&self, access: &str, refresh: Option<&str>) {
        let mut body = serde_json::json!({ "access_token": access });
        if let Some(refresh) = refresh {
            body["refresh_token"] = serde_json::json!(refresh);
        }
        *self.refresh_reply.lock().unwrap() = Ok(RawResponse::new(200).with_json(&body));
    }

    /// Answer the refresh endpoint with a rejection
    pub fn refresh_rejects(&self, status: u16) {
        *self.refresh_reply.lock().unwrap() = Ok(RawResponse::new(status)
            .with_json(&serde_json::json!({ "message": "Refresh token expired" })));
    }

    pub fn refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock().unwrap() = delay;
    }

    /// Script the next API reply, bypassing the token check
    pub fn push(&self, reply: Reply) {
        self.queued.lock().unwrap().push_back(reply);
    }

    pub fn push_status(&self, status: u16) {
        self.push(Ok(RawResponse::new(status)));
    }

    pub fn push_failure(&self, status: Option<u16>) {
        let err = match status {
            Some(status) => TransportError::with_status(status, format!("upstream {status}")),
            None => TransportError::new("connection reset"),
        };
        self.push(Err(err));
    }

    pub fn sent(&self) -> Vec<RequestConfig> {
        self.sent.lock().unwrap().clone()
    }

    /// Requests sent to anything but the refresh endpoint
    pub fn api_requests(&self) -> Vec<RequestConfig> {
        self.sent()
            .into_iter()
            .filter(|r| r.url != REFRESH_URL)
            .collect()
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn answer(&self, request: &RequestConfig) -> Reply {
        if let Some(reply) = self.queued.lock().unwrap().pop_front() {
            return reply;
        }
        let accepted = match self.valid_token.lock().unwrap().as_deref() {
            Some(valid) => request.bearer_token() == Some(valid),
            None => true,
        };
        if accepted {
            Ok(RawResponse::new(200).with_json(&serde_json::json!({
                "url": request.url,
                "method": request.method.as_str(),
            })))
        } else {
            Ok(RawResponse::new(401).with_json(&serde_json::json!({ "detail": "Token expired" })))
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &RequestConfig) -> Reply {
        self.sent.lock().unwrap().push(request.clone());

        if request.url == REFRESH_URL {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.refresh_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            return self.refresh_reply.lock().unwrap().clone();
        }

        // let concurrent callers interleave like they would on a real socket
        tokio::task::yield_now().await;
        self.answer(request)
    }
}

/// Route client logs to the test harness (`RUST_LOG=tradeboard_client=debug`)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn config() -> ClientConfig {
    ClientConfig::builder().base_url(BASE_URL).build()
}

pub fn builder(config: ClientConfig, transport: &Arc<ScriptedTransport>) -> ApiClientBuilder {
    ApiClient::builder(config)
        .transport(Arc::clone(transport) as Arc<dyn Transport>)
        .storage(Arc::new(MemoryStore::new()))
}

pub fn client(transport: &Arc<ScriptedTransport>) -> ApiClient {
    init_tracing();
    builder(config(), transport).build().unwrap()
}

/// Unsigned JWT whose `exp` is `secs` from now
pub fn jwt_expiring_in(secs: i64) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::json!({ "sub": "trader-1", "exp": now + secs })
            .to_string()
            .as_bytes(),
    );
    format!("{header}.{payload}.signature")
}
