//! Ranked pool of equivalent Signum API nodes.
//!
//! The pool probes every configured host with `getBlockchainStatus`, ranks
//! the reachable ones by freshness and latency, and swaps the ranked list in
//! atomically. Requests walk the list in order and fail over per
//! [`ApiError::allows_failover`].

use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::api::scrub::scrub_secrets;
use crate::api::{parse_host, ApiRequest, RequestType, Transport};
use crate::error::{ApiError, CoreError};
use crate::types::BlockchainStatus;

/// Height lag still considered in sync with the freshest node.
const HEIGHT_TOLERANCE: u64 = 1;

// ==============================================================================
// Upstream
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    pub host: String,
    pub observed_height: u64,
    pub observed_latency: Duration,
    pub last_probe_at: Option<Instant>,
}

impl Upstream {
    fn unprobed(host: String) -> Self {
        Self {
            host,
            observed_height: 0,
            observed_latency: Duration::ZERO,
            last_probe_at: None,
        }
    }
}

/// Order upstreams for dispatch.
///
/// Every upstream within [`HEIGHT_TOLERANCE`] of the highest observed height
/// comes first, fastest first. The lagging rest follow by height descending,
/// then latency ascending.
pub fn rank_upstreams(upstreams: &mut [Upstream]) {
    let Some(max) = upstreams.iter().map(|u| u.observed_height).max() else {
        return;
    };
    let floor = max.saturating_sub(HEIGHT_TOLERANCE);

    upstreams.sort_by(|a, b| {
        let a_synced = a.observed_height >= floor;
        let b_synced = b.observed_height >= floor;
        b_synced
            .cmp(&a_synced)
            .then_with(|| {
                if a_synced {
                    Ordering::Equal
                } else {
                    b.observed_height.cmp(&a.observed_height)
                }
            })
            .then_with(|| a.observed_latency.cmp(&b.observed_latency))
    });
}

// ==============================================================================
// Spread Policy
// ==============================================================================

/// How the ranked list is perturbed before each request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpreadPolicy {
    /// Shuffle the faster half, leave the slower half in rank order.
    #[default]
    FirstHalf,
    /// Strict rank order.
    Keep,
    /// Shuffle the whole list.
    Full,
}

impl FromStr for SpreadPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first-half" => Ok(Self::FirstHalf),
            "keep" => Ok(Self::Keep),
            "full" => Ok(Self::Full),
            other => Err(CoreError::Config(format!(
                "unknown spread policy `{other}`; expected first-half, keep or full"
            ))),
        }
    }
}

impl std::fmt::Display for SpreadPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FirstHalf => write!(f, "first-half"),
            Self::Keep => write!(f, "keep"),
            Self::Full => write!(f, "full"),
        }
    }
}

// ==============================================================================
// Pool
// ==============================================================================

pub struct UpstreamPool {
    hosts: Vec<String>,
    transport: Arc<dyn Transport>,
    upstreams: RwLock<Arc<[Upstream]>>,
    spread: SpreadPolicy,
    rng: Mutex<StdRng>,
}

impl UpstreamPool {
    /// Create a pool over `hosts`, initially in configured order.
    ///
    /// `rng_seed` fixes the dispatch shuffle; `None` seeds from entropy.
    pub fn new(
        hosts: &[String],
        transport: Arc<dyn Transport>,
        spread: SpreadPolicy,
        rng_seed: Option<u64>,
    ) -> Result<Self, CoreError> {
        if hosts.is_empty() {
            return Err(CoreError::Config("at least one API host is required".to_owned()));
        }
        let hosts = hosts
            .iter()
            .map(|h| parse_host(h))
            .collect::<Result<Vec<_>, _>>()?;
        let initial: Arc<[Upstream]> = hosts.iter().cloned().map(Upstream::unprobed).collect();
        let rng = match rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            hosts,
            transport,
            upstreams: RwLock::new(initial),
            spread,
            rng: Mutex::new(rng),
        })
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// The current ranked list.
    pub async fn snapshot(&self) -> Arc<[Upstream]> {
        self.upstreams.read().await.clone()
    }

    /// Probe every configured host and swap in the re-ranked list.
    ///
    /// Returns the number of reachable upstreams. When none answer, the
    /// previous list is kept and 0 is returned.
    pub async fn rebuild(&self) -> usize {
        let started = Instant::now();
        let probes = join_all(self.hosts.iter().map(|host| self.probe(host))).await;
        let mut ranked: Vec<Upstream> = probes.into_iter().flatten().collect();

        if ranked.is_empty() {
            error!(hosts = self.hosts.len(), "could not rebuild upstream pool, keeping previous list");
            return 0;
        }

        rank_upstreams(&mut ranked);
        let reachable = ranked.len();
        let best = ranked[0].host.clone();
        *self.upstreams.write().await = ranked.into();
        info!(
            reachable,
            configured = self.hosts.len(),
            best = %best,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "upstream pool rebuilt"
        );
        reachable
    }

    async fn probe(&self, host: &str) -> Option<Upstream> {
        let request = ApiRequest::new(RequestType::GetBlockchainStatus);
        let started = Instant::now();
        let status = self
            .transport
            .execute(host, &request)
            .await
            .and_then(|value| decode::<BlockchainStatus>(request.request_type, value));

        match status {
            Ok(status) => {
                let latency = started.elapsed();
                debug!(
                    upstream = host,
                    height = status.number_of_blocks,
                    latency_ms = latency.as_millis() as u64,
                    "upstream probed"
                );
                Some(Upstream {
                    host: host.to_owned(),
                    observed_height: status.number_of_blocks,
                    observed_latency: latency,
                    last_probe_at: Some(Instant::now()),
                })
            }
            Err(err) => {
                warn!(upstream = host, error = %err, "upstream probe failed");
                None
            }
        }
    }

    /// Snapshot hosts in the order this request will try them.
    fn dispatch_order(&self, snapshot: &[Upstream]) -> Vec<String> {
        let mut hosts: Vec<String> = snapshot.iter().map(|u| u.host.clone()).collect();
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        match self.spread {
            SpreadPolicy::Keep => {}
            SpreadPolicy::FirstHalf => {
                let half = hosts.len() / 2;
                hosts[..half].shuffle(&mut *rng);
            }
            SpreadPolicy::Full => hosts.shuffle(&mut *rng),
        }
        hosts
    }

    /// Execute `request` against the ranked upstreams and decode the reply.
    pub async fn execute<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, CoreError> {
        let snapshot = self.snapshot().await;
        if snapshot.is_empty() {
            return Err(CoreError::NoUpstreams);
        }

        let mut last_error = None;
        for host in self.dispatch_order(&snapshot) {
            let attempt = self
                .transport
                .execute(&host, request)
                .await
                .and_then(|value| decode::<T>(request.request_type, value));

            match attempt {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(
                        upstream = %host,
                        api.request_type = %request.request_type,
                        error = %err,
                        "upstream request failed"
                    );
                    if !err.allows_failover(request.method) {
                        return Err(CoreError::Api(err));
                    }
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(source) => Err(CoreError::Exhausted {
                request_type: request.request_type.as_str(),
                source,
            }),
            None => Err(CoreError::NoUpstreams),
        }
    }
}

fn decode<T: DeserializeOwned>(
    request_type: RequestType,
    value: serde_json::Value,
) -> Result<T, ApiError> {
    T::deserialize(&value).map_err(|e| {
        debug!(
            api.request_type = %request_type,
            body = %scrub_secrets(&value.to_string()),
            "undecodable {request_type} payload"
        );
        ApiError::decode(format!("decode {request_type} response: {e}"))
    })
}
