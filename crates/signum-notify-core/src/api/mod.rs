//! Signum node HTTP API abstraction layer.
//!
//! Defines the [`Transport`] trait (one request against one node), the
//! request description ([`ApiRequest`]), and provides the `reqwest`
//! implementation ([`HttpTransport`]) plus a scripted test mock
//! (`mock::MockTransport`).

mod http_adapter;
#[cfg(test)]
pub mod mock;
pub mod scrub;

pub use http_adapter::HttpTransport;
pub(crate) use http_adapter::parse_host;

use async_trait::async_trait;

use crate::error::ApiError;

/// Path of the node's JSON API.
pub const API_PATH: &str = "/burst";

/// Default transaction deadline, in minutes.
pub const DEFAULT_DEADLINE: u32 = 1440;

const SECRET_PARAM: &str = "secretPhrase";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
        }
    }
}

// ==============================================================================
// Request Types
// ==============================================================================

/// The `requestType` values this crate issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestType {
    GetBlockchainStatus,
    GetMiningInfo,
    GetAccount,
    GetAccountId,
    GetAccountTransactions,
    GetAccountBlocks,
    GetBlock,
    GetTransaction,
    GetRewardRecipient,
    SuggestFee,
    SendMoney,
    SendMoneyMulti,
    SendMoneyMultiSame,
    SendMessage,
    ReadMessage,
    SetRewardRecipient,
    AddCommitment,
    RemoveCommitment,
    SetAccountInfo,
}

impl RequestType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetBlockchainStatus => "getBlockchainStatus",
            Self::GetMiningInfo => "getMiningInfo",
            Self::GetAccount => "getAccount",
            Self::GetAccountId => "getAccountId",
            Self::GetAccountTransactions => "getAccountTransactions",
            Self::GetAccountBlocks => "getAccountBlocks",
            Self::GetBlock => "getBlock",
            Self::GetTransaction => "getTransaction",
            Self::GetRewardRecipient => "getRewardRecipient",
            Self::SuggestFee => "suggestFee",
            Self::SendMoney => "sendMoney",
            Self::SendMoneyMulti => "sendMoneyMulti",
            Self::SendMoneyMultiSame => "sendMoneyMultiSame",
            Self::SendMessage => "sendMessage",
            Self::ReadMessage => "readMessage",
            Self::SetRewardRecipient => "setRewardRecipient",
            Self::AddCommitment => "addCommitment",
            Self::RemoveCommitment => "removeCommitment",
            Self::SetAccountInfo => "setAccountInfo",
        }
    }

    /// Transaction-creating requests go out as POST; everything else is a GET.
    pub fn method(self) -> HttpMethod {
        match self {
            Self::SendMoney
            | Self::SendMoneyMulti
            | Self::SendMoneyMultiSame
            | Self::SendMessage
            | Self::SetRewardRecipient
            | Self::AddCommitment
            | Self::RemoveCommitment
            | Self::SetAccountInfo => HttpMethod::Post,
            _ => HttpMethod::Get,
        }
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==============================================================================
// Request Description
// ==============================================================================

/// One node API call: method, path and query parameters.
///
/// All parameters travel in the query string, secrets included; that is
/// how the node API accepts them. `Debug` output masks the secret.
#[derive(Clone)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub request_type: RequestType,
    pub path: &'static str,
    pub params: Vec<(&'static str, String)>,
}

impl ApiRequest {
    pub fn new(request_type: RequestType) -> Self {
        Self {
            method: request_type.method(),
            request_type,
            path: API_PATH,
            params: Vec::new(),
        }
    }

    pub fn param(mut self, key: &'static str, value: impl ToString) -> Self {
        self.params.push((key, value.to_string()));
        self
    }

    pub fn opt_param<V: ToString>(self, key: &'static str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.param(key, value),
            None => self,
        }
    }

    /// Value of the first parameter named `key`.
    pub fn param_value(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Full query string pairs, `requestType` first.
    pub fn query_pairs(&self) -> Vec<(&str, &str)> {
        let mut pairs = Vec::with_capacity(self.params.len() + 1);
        pairs.push(("requestType", self.request_type.as_str()));
        pairs.extend(self.params.iter().map(|(k, v)| (*k, v.as_str())));
        pairs
    }
}

impl std::fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let params: Vec<(&str, &str)> = self
            .params
            .iter()
            .map(|(k, v)| {
                if *k == SECRET_PARAM {
                    (*k, "***")
                } else {
                    (*k, v.as_str())
                }
            })
            .collect();
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("request_type", &self.request_type)
            .field("path", &self.path)
            .field("params", &params)
            .finish_non_exhaustive()
    }
}

// ==============================================================================
// Transport
// ==============================================================================

/// Executes one request against one node host.
///
/// Implementations return the decoded JSON body, or an [`ApiError`]:
/// `Domain` when the body carries `errorCode` / `errorDescription`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        host: &str,
        request: &ApiRequest,
    ) -> Result<serde_json::Value, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_are_posts() {
        assert_eq!(RequestType::SendMoney.method(), HttpMethod::Post);
        assert_eq!(RequestType::SetAccountInfo.method(), HttpMethod::Post);
        assert_eq!(RequestType::GetAccount.method(), HttpMethod::Get);
        assert_eq!(RequestType::ReadMessage.method(), HttpMethod::Get);
    }

    #[test]
    fn query_pairs_lead_with_request_type() {
        let req = ApiRequest::new(RequestType::GetAccount)
            .param("account", "123")
            .opt_param("getCommittedAmount", Some(true))
            .opt_param::<u32>("missing", None);
        assert_eq!(
            req.query_pairs(),
            vec![
                ("requestType", "getAccount"),
                ("account", "123"),
                ("getCommittedAmount", "true"),
            ]
        );
    }

    #[test]
    fn debug_masks_secret_phrase() {
        let req = ApiRequest::new(RequestType::SendMoney)
            .param("recipient", "1")
            .param(SECRET_PARAM, "correct horse battery staple");
        let rendered = format!("{req:?}");
        assert!(!rendered.contains("horse"));
        assert!(rendered.contains("***"));
    }
}
