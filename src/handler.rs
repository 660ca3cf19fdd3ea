use bytes::{BufMut, Bytes, BytesMut};
use rand::seq::SliceRandom;
use serde::Deserialize;
use std::time::Instant;
use tracing::{info, warn};

use crate::forwarder::{ForwardError, Forwarder};
use crate::resolver::{as_millis_f64, NotFound, ServiceResolver};

/// Prefix written before the forwarded body on success.
pub const RESPONSE_PREFIX: &str = "Response from service:\n";

#[derive(Debug)]
pub enum InvokeError {
    InvalidJson(String),
    InvalidTimestamp(String),
    NotFound(NotFound),
    Forward(ForwardError),
}

impl std::fmt::Display for InvokeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvokeError::InvalidJson(e) => write!(f, "invalid JSON: {}", e),
            InvokeError::InvalidTimestamp(v) => write!(f, "invalid timestamp: '{}'", v),
            InvokeError::NotFound(e) => write!(f, "{}", e),
            InvokeError::Forward(e) => write!(f, "failed to call target: {}", e),
        }
    }
}

impl std::error::Error for InvokeError {}

impl InvokeError {
    /// HTTP status the front end should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            InvokeError::InvalidJson(_) | InvokeError::InvalidTimestamp(_) => 400,
            InvokeError::NotFound(_) => 404,
            InvokeError::Forward(_) => 500,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InvokePayload {
    #[serde(default)]
    message: Option<String>,
}

/// Extract the originating timestamp (epoch millis) from an invoke body.
pub fn parse_timestamp(body: &[u8]) -> Result<i64, InvokeError> {
    let payload: InvokePayload =
        serde_json::from_slice(body).map_err(|e| InvokeError::InvalidJson(e.to_string()))?;
    let message = payload.message.unwrap_or_default();
    message
        .parse::<i64>()
        .map_err(|_| InvokeError::InvalidTimestamp(message))
}

/// Pick the identifier to invoke when the request does not name one.
/// Uniform over `targets` when more than one is configured.
pub fn pick_target(targets: &[String]) -> Option<&str> {
    match targets {
        [] => None,
        [only] => Some(only.as_str()),
        many => many.choose(&mut rand::thread_rng()).map(String::as_str),
    }
}

/// Validate the request, resolve `id`, call the service and build the body.
///
/// Nothing is resolved if the payload is malformed.
#[tracing::instrument(name = "invoke", skip(body, resolver, forwarder))]
pub async fn handle_invoke(
    id: &str,
    body: &[u8],
    resolver: &ServiceResolver,
    forwarder: &dyn Forwarder,
) -> Result<Bytes, InvokeError> {
    let sent_at_ms = parse_timestamp(body).inspect_err(|e| {
        warn!(error = %e, "rejecting invoke request");
    })?;

    let record = resolver.resolve(id).await.map_err(InvokeError::NotFound)?;

    let start = Instant::now();
    let forwarded = forwarder.forward(&record.address).await.map_err(|e| {
        warn!(
            address = %record.address,
            error = %e,
            elapsed_ms = as_millis_f64(start.elapsed()),
            "service invocation failed"
        );
        InvokeError::Forward(e)
    })?;
    info!(
        address = %record.address,
        status = forwarded.status,
        elapsed_ms = as_millis_f64(start.elapsed()),
        "service invoked"
    );

    let total_ms = chrono::Utc::now()
        .timestamp_millis()
        .saturating_sub(sent_at_ms);
    info!(total_ms, "total latency");

    let mut out = BytesMut::with_capacity(RESPONSE_PREFIX.len() + forwarded.body.len());
    out.put_slice(RESPONSE_PREFIX.as_bytes());
    out.put_slice(&forwarded.body);
    Ok(out.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forwarder::Forwarded;
    use crate::record::ServiceRecord;
    use crate::registry::{MemoryStore, ResolutionCache};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StubForwarder {
        calls: AtomicUsize,
        fail: bool,
    }

    impl StubForwarder {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait::async_trait]
    impl Forwarder for StubForwarder {
        async fn forward(&self, address: &str) -> Result<Forwarded, ForwardError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ForwardError::Status(502));
            }
            Ok(Forwarded {
                status: 200,
                body: Bytes::from(format!("hi from {}", address)),
            })
        }
    }

    fn resolver() -> (ServiceResolver, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::with_records([ServiceRecord::new(
            "hello",
            "hello-world",
            "http://svc:9000",
        )]));
        let resolver = ServiceResolver::new(Arc::new(ResolutionCache::default()), store.clone());
        (resolver, store)
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(
            parse_timestamp(br#"{"message": "1700000000000"}"#).unwrap(),
            1_700_000_000_000
        );
        assert!(matches!(
            parse_timestamp(br#"{"message": "not-a-number"}"#),
            Err(InvokeError::InvalidTimestamp(_))
        ));
        assert!(matches!(
            parse_timestamp(br#"{"message": " 123 "}"#),
            Err(InvokeError::InvalidTimestamp(_))
        ));
        assert!(matches!(
            parse_timestamp(br#"{"message": "123\n"}"#),
            Err(InvokeError::InvalidTimestamp(_))
        ));
        assert!(matches!(
            parse_timestamp(br#"{}"#),
            Err(InvokeError::InvalidTimestamp(_))
        ));
        assert!(matches!(
            parse_timestamp(b"{not json"),
            Err(InvokeError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(InvokeError::InvalidJson(String::new()).status_code(), 400);
        assert_eq!(
            InvokeError::NotFound(NotFound { id: "x".into() }).status_code(),
            404
        );
        assert_eq!(
            InvokeError::Forward(ForwardError::Timeout).status_code(),
            500
        );
    }

    #[test]
    fn test_pick_target() {
        assert_eq!(pick_target(&[]), None);
        assert_eq!(pick_target(&["hello".to_string()]), Some("hello"));

        let targets: Vec<String> = (0..10).map(|i| format!("hello{}", i)).collect();
        for _ in 0..20 {
            let picked = pick_target(&targets).unwrap();
            assert!(targets.iter().any(|t| t == picked));
        }
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let (resolver, _) = resolver();
        let forwarder = StubForwarder::new(false);

        let body = handle_invoke("hello", br#"{"message": "0"}"#, &resolver, &forwarder)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.starts_with("Response from service:"));
        assert!(text.ends_with("hi from http://svc:9000"));
    }

    #[tokio::test]
    async fn test_extreme_timestamps_still_invoke() {
        let (resolver, _) = resolver();
        let forwarder = StubForwarder::new(false);

        for message in ["-9223372036854775808", "9223372036854775807"] {
            let body = format!(r#"{{"message": "{}"}}"#, message);
            let out = handle_invoke("hello", body.as_bytes(), &resolver, &forwarder)
                .await
                .unwrap();
            assert!(out.starts_with(RESPONSE_PREFIX.as_bytes()));
        }
        assert_eq!(forwarder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_padded_timestamp_is_400() {
        let (resolver, store) = resolver();
        let forwarder = StubForwarder::new(false);

        let result = handle_invoke("hello", br#"{"message": " 123 "}"#, &resolver, &forwarder).await;
        assert!(matches!(result, Err(InvokeError::InvalidTimestamp(_))));
        assert_eq!(store.find_calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_input_skips_resolution() {
        let (resolver, store) = resolver();
        let forwarder = StubForwarder::new(false);

        let result = handle_invoke(
            "hello",
            br#"{"message": "not-a-number"}"#,
            &resolver,
            &forwarder,
        )
        .await;

        assert_eq!(result.unwrap_err().status_code(), 400);
        assert_eq!(store.find_calls(), 0);
        assert!(resolver.cache().is_empty());
        assert_eq!(forwarder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_service_is_404() {
        let (resolver, _) = resolver();
        let forwarder = StubForwarder::new(false);

        let result = handle_invoke("ghost", br#"{"message": "1"}"#, &resolver, &forwarder).await;
        assert_eq!(result.unwrap_err().status_code(), 404);
        assert_eq!(forwarder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_forward_failure_is_500() {
        let (resolver, _) = resolver();
        let forwarder = StubForwarder::new(true);

        let result = handle_invoke("hello", br#"{"message": "1"}"#, &resolver, &forwarder).await;
        assert_eq!(result.unwrap_err().status_code(), 500);
    }
}
