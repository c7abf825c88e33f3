use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use reqwest::{header, Method};
use tracing::{debug, trace};

use crate::api::scrub::scrub_secrets;
use crate::api::{ApiRequest, HttpMethod, Transport};
use crate::error::{ApiError, CoreError};

use super::protocol::{parse_envelope, transport_error};

/// Signum node API client over HTTP(S).
///
/// Stateless apart from the connection pool and the optional per-host rate
/// limiter; the node host is chosen per call by the upstream pool.
pub struct HttpTransport {
    client: reqwest::Client,
    limiter: Option<DefaultKeyedRateLimiter<String>>,
    next_id: AtomicU64,
}

impl HttpTransport {
    /// Build a transport whose every request (connect and TLS handshake
    /// included) is bounded by `request_timeout`.
    ///
    /// If `requests_per_second` is set, calls are rate-limited per node
    /// host.
    pub fn new(
        request_timeout: Duration,
        requests_per_second: Option<u32>,
    ) -> Result<Self, CoreError> {
        if request_timeout.is_zero() {
            return Err(CoreError::Config(
                "request timeout must be greater than zero".to_owned(),
            ));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .timeout(request_timeout)
            .pool_max_idle_per_host(8)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| CoreError::Config(format!("build HTTP client: {}", e.without_url())))?;

        let limiter = match requests_per_second {
            None => None,
            Some(limit) => {
                let limit = NonZeroU32::new(limit).ok_or_else(|| {
                    CoreError::Config("requests_per_second must be at least 1".to_owned())
                })?;
                Some(RateLimiter::keyed(Quota::per_second(limit)))
            }
        };

        Ok(Self {
            client,
            limiter,
            next_id: AtomicU64::new(1),
        })
    }

    async fn wait_for_rate_limit(&self, host: &str) {
        if let Some(limiter) = &self.limiter {
            limiter.until_key_ready(&host.to_owned()).await;
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        host: &str,
        request: &ApiRequest,
    ) -> Result<serde_json::Value, ApiError> {
        self.wait_for_rate_limit(host).await;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let url = format!("{}{}", host.trim_end_matches('/'), request.path);
        debug!(
            api.id = id,
            api.host = host,
            api.method = %request.method,
            api.request_type = %request.request_type,
            api.params = request.params.len(),
            "api call"
        );

        let method = match request.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        };
        let response = self
            .client
            .request(method, &url)
            .header(header::ACCEPT, "application/json")
            .query(&request.query_pairs())
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        debug!(api.id = id, %status, body_len = body.len(), "api response");
        trace!(api.id = id, body = %scrub_secrets(&body), "api response body");

        if !status.is_success() {
            return Err(ApiError::HttpStatus(status.as_u16()));
        }
        parse_envelope(&body)
    }
}
