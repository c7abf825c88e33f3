use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{ApiError, TransportKind};

use super::{ApiRequest, RequestType, Transport};

/// Canned outcome of a scripted request.
#[derive(Debug, Clone)]
pub enum MockReply {
    Json(serde_json::Value),
    Fail(ApiError),
}

/// Matches a request by type, and optionally by host and parameter values.
#[derive(Debug, Clone)]
pub struct MockRule {
    request_type: RequestType,
    host: Option<String>,
    params: Vec<(&'static str, String)>,
    reply: MockReply,
}

impl MockRule {
    pub fn new(request_type: RequestType, reply: MockReply) -> Self {
        Self {
            request_type,
            host: None,
            params: Vec::new(),
            reply,
        }
    }

    pub fn json(request_type: RequestType, value: serde_json::Value) -> Self {
        Self::new(request_type, MockReply::Json(value))
    }

    pub fn fail(request_type: RequestType, err: ApiError) -> Self {
        Self::new(request_type, MockReply::Fail(err))
    }

    pub fn on_host(mut self, host: &str) -> Self {
        self.host = Some(host.to_owned());
        self
    }

    pub fn with_param(mut self, key: &'static str, value: impl ToString) -> Self {
        self.params.push((key, value.to_string()));
        self
    }

    fn matches(&self, host: &str, request: &ApiRequest) -> bool {
        self.request_type == request.request_type
            && self.host.as_deref().map_or(true, |h| h == host)
            && self
                .params
                .iter()
                .all(|(k, v)| request.param_value(k) == Some(v.as_str()))
    }
}

/// One recorded call.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub host: String,
    pub request_type: RequestType,
    pub params: Vec<(&'static str, String)>,
}

impl MockCall {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A scripted node backend for testing.
///
/// Rules added later take precedence over earlier ones, so a test can
/// change a node's answers mid-run. Unscripted requests fail with a
/// refused connection, which is how an unreachable node looks.
#[derive(Default)]
pub struct MockTransport {
    rules: Mutex<Vec<MockRule>>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockTransport {
    pub fn builder() -> MockTransportBuilder {
        MockTransportBuilder { rules: Vec::new() }
    }

    pub fn add(&self, rule: MockRule) {
        self.rules.lock().expect("mock rules lock").push(rule);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().expect("mock calls lock").clone()
    }

    pub fn calls_for(&self, request_type: RequestType) -> Vec<MockCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.request_type == request_type)
            .collect()
    }

    pub fn calls_to(&self, host: &str) -> Vec<MockCall> {
        self.calls().into_iter().filter(|c| c.host == host).collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().expect("mock calls lock").clear();
    }
}

pub struct MockTransportBuilder {
    rules: Vec<MockRule>,
}

impl MockTransportBuilder {
    pub fn rule(mut self, rule: MockRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Report `height` from `getBlockchainStatus` on `host`.
    pub fn height(self, host: &str, height: u64) -> Self {
        self.rule(
            MockRule::json(
                RequestType::GetBlockchainStatus,
                serde_json::json!({ "numberOfBlocks": height }),
            )
            .on_host(host),
        )
    }

    pub fn build(self) -> MockTransport {
        MockTransport {
            rules: Mutex::new(self.rules),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(
        &self,
        host: &str,
        request: &ApiRequest,
    ) -> Result<serde_json::Value, ApiError> {
        self.calls.lock().expect("mock calls lock").push(MockCall {
            host: host.to_owned(),
            request_type: request.request_type,
            params: request.params.clone(),
        });

        let reply = self
            .rules
            .lock()
            .expect("mock rules lock")
            .iter()
            .rev()
            .find(|rule| rule.matches(host, request))
            .map(|rule| rule.reply.clone());

        match reply {
            Some(MockReply::Json(value)) => Ok(value),
            Some(MockReply::Fail(err)) => Err(err),
            None => Err(ApiError::transport(
                TransportKind::ConnectionRefused,
                format!("no script for {} on {host}", request.request_type),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn later_rules_take_precedence() {
        let mock = MockTransport::builder()
            .rule(MockRule::json(
                RequestType::GetAccount,
                serde_json::json!({ "balanceNQT": "1" }),
            ))
            .build();
        mock.add(
            MockRule::json(RequestType::GetAccount, serde_json::json!({ "balanceNQT": "2" }))
                .with_param("account", "42"),
        );

        let req = ApiRequest::new(RequestType::GetAccount).param("account", "42");
        let value = mock.execute("http://a", &req).await.expect("scripted");
        assert_eq!(value["balanceNQT"], "2");

        let other = ApiRequest::new(RequestType::GetAccount).param("account", "7");
        let value = mock.execute("http://a", &other).await.expect("scripted");
        assert_eq!(value["balanceNQT"], "1");
        assert_eq!(mock.calls_for(RequestType::GetAccount).len(), 2);
    }

    #[tokio::test]
    async fn unscripted_request_is_refused() {
        let mock = MockTransport::builder().height("http://a", 10).build();
        let req = ApiRequest::new(RequestType::GetBlockchainStatus);
        let err = mock.execute("http://b", &req).await.expect_err("no rule for b");
        assert!(matches!(
            err,
            ApiError::Transport {
                kind: TransportKind::ConnectionRefused,
                ..
            }
        ));
        assert_eq!(mock.calls_to("http://b").len(), 1);
    }
}
