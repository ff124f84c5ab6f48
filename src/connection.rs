//! Ranked endpoint pool with per-endpoint health and rate-limit tracking.
//!
//! Responsibilities:
//! - Keep an [`EndpointRecord`] per configured RPC endpoint (success/error
//!   counters, cooldown window), mutated on every connection attempt.
//! - Select a live endpoint: skip cooled-down entries, rank the rest by
//!   `success_count - 2*error_count`, liveness-probe in order with a cheap
//!   slot read under a short timeout.
//! - When everything is cooling down, sleep until the soonest release and
//!   try again; a full probe sweep with no survivor is fatal for the caller.
//! - Provide the retrying blockhash accessor used by transaction building
//!   (3 attempts, endpoint switch on rate limit, linear backoff otherwise).
//!
//! The pool is an injected, explicitly-owned object; flows receive it by
//! handle and there is no process-wide singleton.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{commitment_config::CommitmentConfig, hash::Hash};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::retry::{Backoff, RetryDirective, RetryPolicy};

const RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(60);
const FAILURE_COOLDOWN: Duration = Duration::from_secs(10);
const BLOCKHASH_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("no healthy RPC endpoint available")]
    NoEndpointAvailable,
    #[error("rate limited by {url}")]
    RateLimited { url: String },
    #[error("endpoint {url} failed: {message}")]
    Endpoint { url: String, message: String },
    #[error("blockhash fetch failed after {attempts} attempts: {message}")]
    BlockhashFetch { attempts: u32, message: String },
}

/// Health ledger for one endpoint. Never persisted across restarts.
#[derive(Debug, Clone)]
pub struct EndpointRecord {
    pub url: String,
    pub last_used: Option<Instant>,
    pub error_count: u32,
    pub success_count: u32,
    pub rate_limit_until: Option<Instant>,
}

impl EndpointRecord {
    fn new(url: String) -> Self {
        Self {
            url,
            last_used: None,
            error_count: 0,
            success_count: 0,
            rate_limit_until: None,
        }
    }

    fn score(&self) -> i64 {
        self.success_count as i64 - 2 * self.error_count as i64
    }

    fn cooling_down(&self, now: Instant) -> bool {
        self.rate_limit_until.is_some_and(|until| until > now)
    }
}

/// Eligible endpoints in probe order: cooled-down entries excluded, the rest
/// ranked by score descending.
fn select_order(records: &[EndpointRecord], now: Instant) -> Vec<String> {
    let mut eligible: Vec<&EndpointRecord> =
        records.iter().filter(|r| !r.cooling_down(now)).collect();
    eligible.sort_by_key(|r| std::cmp::Reverse(r.score()));
    eligible.into_iter().map(|r| r.url.clone()).collect()
}

/// Time until the soonest cooldown expires, when every endpoint is cooling.
fn next_release(records: &[EndpointRecord], now: Instant) -> Option<Duration> {
    records
        .iter()
        .filter_map(|r| r.rate_limit_until)
        .map(|until| until.saturating_duration_since(now))
        .min()
}

/// A rate-limit signal must be distinguishable from a generic failure; the
/// cooldown and retry behavior differ.
pub fn is_rate_limit_message(message: &str) -> bool {
    message.contains("429") || message.contains("Too Many Requests")
}

pub struct ConnectionPool {
    records: Mutex<Vec<EndpointRecord>>,
    clients: Mutex<HashMap<String, Arc<RpcClient>>>,
    probe_timeout: Duration,
}

impl ConnectionPool {
    pub fn new(endpoints: Vec<String>, probe_timeout: Duration) -> Self {
        let records = endpoints.into_iter().map(EndpointRecord::new).collect();
        Self {
            records: Mutex::new(records),
            clients: Mutex::new(HashMap::new()),
            probe_timeout,
        }
    }

    async fn client_for(&self, url: &str) -> Arc<RpcClient> {
        let mut cache = self.clients.lock().await;
        if let Some(client) = cache.get(url) {
            return Arc::clone(client);
        }
        let client = Arc::new(RpcClient::new_with_commitment(
            url.to_string(),
            CommitmentConfig::confirmed(),
        ));
        cache.insert(url.to_string(), Arc::clone(&client));
        client
    }

    /// Record a successful attempt: bump successes, decay the error count.
    pub async fn note_success(&self, url: &str) {
        let mut records = self.records.lock().await;
        if let Some(r) = records.iter_mut().find(|r| r.url == url) {
            r.success_count += 1;
            r.error_count = r.error_count.saturating_sub(1);
            r.last_used = Some(Instant::now());
        }
    }

    /// Record a failed attempt and start the matching cooldown window.
    pub async fn note_failure(&self, url: &str, rate_limited: bool) {
        let cooldown = if rate_limited {
            RATE_LIMIT_COOLDOWN
        } else {
            FAILURE_COOLDOWN
        };
        let mut records = self.records.lock().await;
        if let Some(r) = records.iter_mut().find(|r| r.url == url) {
            r.error_count += 1;
            r.rate_limit_until = Some(Instant::now() + cooldown);
        }
    }

    pub async fn snapshot(&self) -> Vec<EndpointRecord> {
        self.records.lock().await.clone()
    }

    /// Select and probe a live endpoint. Sleeps through a global cooldown;
    /// fails with [`ConnectionError::NoEndpointAvailable`] only when a full
    /// probe sweep leaves nothing alive.
    pub async fn healthy_client(&self) -> Result<(String, Arc<RpcClient>), ConnectionError> {
        loop {
            let now = Instant::now();
            let (order, wait) = {
                let records = self.records.lock().await;
                (select_order(&records, now), next_release(&records, now))
            };

            if order.is_empty() {
                match wait {
                    Some(d) => {
                        info!(wait_secs = d.as_secs(), "all endpoints cooling down; waiting");
                        sleep(d).await;
                        continue;
                    }
                    None => return Err(ConnectionError::NoEndpointAvailable),
                }
            }

            for url in order {
                let client = self.client_for(&url).await;
                debug!(%url, "probing endpoint");
                match timeout(self.probe_timeout, client.get_slot()).await {
                    Ok(Ok(slot)) => {
                        self.note_success(&url).await;
                        debug!(%url, slot, "endpoint live");
                        return Ok((url, client));
                    }
                    Ok(Err(e)) => {
                        let message = e.to_string();
                        let rate_limited = is_rate_limit_message(&message);
                        warn!(%url, rate_limited, error = %message, "endpoint probe failed");
                        self.note_failure(&url, rate_limited).await;
                    }
                    Err(_) => {
                        warn!(%url, timeout_ms = self.probe_timeout.as_millis() as u64, "endpoint probe timed out");
                        self.note_failure(&url, false).await;
                    }
                }
            }

            return Err(ConnectionError::NoEndpointAvailable);
        }
    }

    /// Retrying accessor for the latest network checkpoint: up to 3 attempts,
    /// switching endpoint immediately on a rate-limit signal and backing off
    /// `1s * attempt` otherwise.
    pub async fn latest_blockhash(&self) -> Result<Hash, ConnectionError> {
        let policy = RetryPolicy::new(
            BLOCKHASH_ATTEMPTS,
            Backoff::Linear {
                base: Duration::from_secs(1),
            },
        );
        policy
            .run(
                |attempt| async move {
                    debug!(attempt, "fetching latest blockhash");
                    let (url, client) = self.healthy_client().await?;
                    match client.get_latest_blockhash().await {
                        Ok(hash) => Ok(hash),
                        Err(e) => {
                            let message = e.to_string();
                            let rate_limited = is_rate_limit_message(&message);
                            self.note_failure(&url, rate_limited).await;
                            if rate_limited {
                                Err(ConnectionError::RateLimited { url })
                            } else {
                                Err(ConnectionError::Endpoint { url, message })
                            }
                        }
                    }
                },
                |e| match e {
                    ConnectionError::NoEndpointAvailable => RetryDirective::Halt,
                    ConnectionError::RateLimited { .. } => RetryDirective::Immediate,
                    _ => RetryDirective::Backoff,
                },
            )
            .await
            .map_err(|e| match e {
                ConnectionError::NoEndpointAvailable => ConnectionError::NoEndpointAvailable,
                other => ConnectionError::BlockhashFetch {
                    attempts: BLOCKHASH_ATTEMPTS,
                    message: other.to_string(),
                },
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str, success: u32, errors: u32, limited_for: Option<Duration>) -> EndpointRecord {
        EndpointRecord {
            url: url.to_string(),
            last_used: None,
            error_count: errors,
            success_count: success,
            rate_limit_until: limited_for.map(|d| Instant::now() + d),
        }
    }

    #[test]
    fn rate_limited_endpoint_never_selected() {
        let now = Instant::now();
        let records = vec![
            record("http://a", 100, 0, Some(Duration::from_secs(30))),
            record("http://b", 1, 0, None),
            record("http://c", 0, 0, None),
        ];
        let order = select_order(&records, now);
        assert_eq!(order, vec!["http://b", "http://c"]);
        assert!(!order.contains(&"http://a".to_string()));
    }

    #[test]
    fn ranking_penalizes_errors_twice() {
        let now = Instant::now();
        let records = vec![
            record("http://a", 4, 2, None), // score 0
            record("http://b", 3, 0, None), // score 3
            record("http://c", 5, 1, None), // score 3, stable order after b
        ];
        let order = select_order(&records, now);
        assert_eq!(order[2], "http://a");
    }

    #[test]
    fn all_limited_waits_for_soonest_release() {
        let now = Instant::now();
        let records = vec![
            record("http://a", 0, 1, Some(Duration::from_secs(40))),
            record("http://b", 0, 1, Some(Duration::from_secs(7))),
            record("http://c", 0, 1, Some(Duration::from_secs(25))),
        ];
        assert!(select_order(&records, now).is_empty());
        let wait = next_release(&records, now).unwrap();
        assert!(wait <= Duration::from_secs(7));
        assert!(wait > Duration::from_secs(6));
    }

    #[test]
    fn expired_cooldown_becomes_eligible() {
        let mut r = record("http://a", 0, 1, None);
        r.rate_limit_until = Some(Instant::now() - Duration::from_secs(1));
        assert!(!r.cooling_down(Instant::now()));
        assert_eq!(select_order(&[r], Instant::now()).len(), 1);
    }

    #[test]
    fn rate_limit_signal_detection() {
        assert!(is_rate_limit_message("HTTP status client error (429)"));
        assert!(is_rate_limit_message("Too Many Requests"));
        assert!(!is_rate_limit_message("connection refused"));
    }

    #[tokio::test]
    async fn failure_bookkeeping_sets_cooldown() {
        let pool = ConnectionPool::new(
            vec!["http://a".to_string()],
            Duration::from_millis(10),
        );
        pool.note_failure("http://a", true).await;
        let snap = pool.snapshot().await;
        assert_eq!(snap[0].error_count, 1);
        assert!(snap[0].cooling_down(Instant::now()));
        // rate-limit cooldown is the long one
        let until = snap[0].rate_limit_until.unwrap();
        assert!(until > Instant::now() + Duration::from_secs(50));

        pool.note_success("http://a").await;
        let snap = pool.snapshot().await;
        assert_eq!(snap[0].error_count, 0);
        assert_eq!(snap[0].success_count, 1);
    }

    #[tokio::test]
    async fn empty_pool_is_fatal() {
        let pool = ConnectionPool::new(vec![], Duration::from_millis(10));
        assert!(matches!(
            pool.healthy_client().await,
            Err(ConnectionError::NoEndpointAvailable)
        ));
    }
}
