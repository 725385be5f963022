//! `nexus::http` - the resilient client, as scripts see it

use crate::error::CapabilityError;
use crate::namespace::{Args, Namespace};
use crate::registry::{Capability, ModuleKind};
use nexus_net::{HttpClient, HttpRequestSpec, HttpResponse};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub struct NetworkCapability {
    client: Arc<HttpClient>,
}

impl NetworkCapability {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }
}

impl Capability for NetworkCapability {
    fn key(&self) -> &str {
        ModuleKind::Network.key()
    }

    fn register(&self, namespace: &mut Namespace) {
        let module = namespace.module(self.key());

        let client = self.client.clone();
        module.function("request", 1..=1, move |args| {
            let spec: HttpRequestSpec = serde_json::from_value(args.value(0).clone())
                .map_err(|e| args.invalid(format!("invalid request spec: {}", e)))?;
            respond(client.request(&spec)?)
        });

        let client = self.client.clone();
        module.function("get", 1..=1, move |args| {
            respond(client.get(&args.string(0)?)?)
        });

        let client = self.client.clone();
        module.function("post", 1..=2, move |args| {
            let body = body_text(args)?;
            respond(client.post(&args.string(0)?, &body)?)
        });

        let client = self.client.clone();
        module.function("setTimeout", 1..=1, move |args| {
            client.set_timeout(Duration::from_millis(args.u64(0)?));
            Ok(Value::Null)
        });

        let client = self.client.clone();
        module.function("setRetries", 1..=1, move |args| {
            let retries = u32::try_from(args.u64(0)?)
                .map_err(|_| args.invalid("retry count too large"))?;
            client.set_retries(retries);
            Ok(Value::Null)
        });
    }
}

/// Strings are sent as-is, anything else as JSON
fn body_text(args: &Args<'_>) -> Result<String, CapabilityError> {
    Ok(match args.value(1) {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

fn respond(response: HttpResponse) -> Result<Value, CapabilityError> {
    serde_json::to_value(response).map_err(|e| CapabilityError::invalid("nexus::http", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_net::{
        ClientSettings, PreparedRequest, RetryPolicy, Sleeper, Transport, TransportError,
    };
    use serde_json::json;
    use std::io::Write;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use url::Url;

    struct NoSleep;

    impl Sleeper for NoSleep {
        fn sleep(&self, _: Duration) {}
    }

    /// Echoes the request back as the body; `/down` always refuses
    #[derive(Default)]
    struct Echo {
        attempts: AtomicU32,
        timeouts: Mutex<Vec<Duration>>,
    }

    impl Transport for Echo {
        fn send(
            &self,
            request: &PreparedRequest,
            timeout: Duration,
        ) -> Result<HttpResponse, TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.timeouts.lock().unwrap().push(timeout);
            if request.url.path() == "/down" {
                return Err(TransportError::Connection("refused".into()));
            }
            let content_type = request
                .headers
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            Ok(HttpResponse {
                status: if request.url.path() == "/missing" { 404 } else { 200 },
                body: json!({
                    "method": request.method.as_str(),
                    "contentType": content_type,
                    "body": request.body,
                })
                .to_string(),
            })
        }

        fn stream(&self, _: &Url, _: Duration, _: &mut dyn Write) -> Result<(u16, u64), TransportError> {
            Ok((200, 0))
        }
    }

    fn http() -> (Arc<Echo>, Namespace) {
        let transport = Arc::new(Echo::default());
        let client = HttpClient::with_transport(
            transport.clone(),
            Arc::new(NoSleep),
            ClientSettings {
                timeout: Duration::from_secs(30),
                retry: RetryPolicy::new(3, Duration::from_millis(1)),
            },
        );
        let mut ns = Namespace::new();
        NetworkCapability::new(Arc::new(client)).register(&mut ns);
        (transport, ns)
    }

    fn call(ns: &Namespace, name: &str, args: &[Value]) -> Result<Value, CapabilityError> {
        ns.resolve("http", name).unwrap().call(args)
    }

    #[test]
    fn test_get_returns_status_and_body() {
        let (_t, ns) = http();
        let resp = call(&ns, "get", &[json!("http://api.test/x")]).unwrap();
        assert_eq!(resp["status"], 200);
        let body: Value = serde_json::from_str(resp["body"].as_str().unwrap()).unwrap();
        assert_eq!(body["method"], "GET");
    }

    #[test]
    fn test_error_status_is_a_response() {
        let (t, ns) = http();
        let resp = call(&ns, "get", &[json!("http://api.test/missing")]).unwrap();
        assert_eq!(resp["status"], 404);
        assert_eq!(t.attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_post_map_body_is_json() {
        let (_t, ns) = http();
        let resp = call(&ns, "post", &[json!("http://api.test/p"), json!({ "a": 1 })]).unwrap();
        let body: Value = serde_json::from_str(resp["body"].as_str().unwrap()).unwrap();
        assert_eq!(body["method"], "POST");
        assert_eq!(body["contentType"], "application/json");
        assert_eq!(body["body"], "{\"a\":1}");
    }

    #[test]
    fn test_request_spec() {
        let (t, ns) = http();
        let spec = json!({
            "method": "PUT",
            "url": "http://api.test/r",
            "headers": { "Content-Type": "text/plain" },
            "body": "raw",
            "timeout": 250
        });
        let resp = call(&ns, "request", &[spec]).unwrap();
        let body: Value = serde_json::from_str(resp["body"].as_str().unwrap()).unwrap();
        assert_eq!(body["method"], "PUT");
        assert_eq!(body["contentType"], "text/plain");
        assert_eq!(*t.timeouts.lock().unwrap(), vec![Duration::from_millis(250)]);
    }

    #[test]
    fn test_invalid_spec_is_fault_without_attempts() {
        let (t, ns) = http();
        let err = call(&ns, "request", &[json!({ "method": "GET" })]).unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidArgument { .. }));

        let err = call(&ns, "request", &[json!({ "url": "not a url" })]).unwrap_err();
        assert!(matches!(err, CapabilityError::Net(_)));
        assert_eq!(t.attempts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_set_retries_and_timeout() {
        let (t, ns) = http();
        call(&ns, "setRetries", &[json!(1)]).unwrap();
        call(&ns, "setTimeout", &[json!(1500)]).unwrap();

        let err = call(&ns, "get", &[json!("http://api.test/down")]).unwrap_err();
        match err {
            CapabilityError::Net(net) => assert_eq!(net.attempts(), Some(2)),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(
            *t.timeouts.lock().unwrap(),
            vec![Duration::from_millis(1500); 2]
        );
    }
}
