//! Admission control for abuse-prone, unauthenticated endpoints
//!
//! A fixed-window counter decides whether a request keyed by some identity
//! is admitted. The password-reset gate combines two independent windows:
//! one keyed by the client address and one keyed by the target e-mail.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use common::cache::RedisPool;
use serde::Deserialize;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, warn};

use crate::error::ApiError;

/// Retry hint sent when no axis reports a positive wait
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Largest body buffered while extracting the target identity
const MAX_BODY_BYTES: usize = 100 * 1024;

/// Limit and window length of a fixed-window counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    pub limit: u32,
    pub window: Duration,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            limit: 5,
            window: Duration::from_secs(15 * 60),
        }
    }
}

/// Result of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admitted,
    Rejected { retry_after_secs: u64 },
}

impl Decision {
    pub fn is_admitted(self) -> bool {
        matches!(self, Decision::Admitted)
    }

    fn retry_after_secs(self) -> u64 {
        match self {
            Decision::Admitted => 0,
            Decision::Rejected { retry_after_secs } => retry_after_secs,
        }
    }

    /// Combine two independent decisions; rejected if either rejects
    pub fn combine(self, other: Decision) -> Decision {
        if self.is_admitted() && other.is_admitted() {
            return Decision::Admitted;
        }
        let retry = self.retry_after_secs().max(other.retry_after_secs());
        Decision::Rejected {
            retry_after_secs: if retry == 0 {
                DEFAULT_RETRY_AFTER_SECS
            } else {
                retry
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window counters keyed by identity
#[derive(Debug)]
pub struct FixedWindow {
    policy: WindowPolicy,
    entries: HashMap<String, WindowEntry>,
}

impl FixedWindow {
    pub fn new(policy: WindowPolicy) -> Self {
        Self {
            policy,
            entries: HashMap::new(),
        }
    }

    /// Record one hit for `key` at `now`
    ///
    /// A rejected hit leaves the entry untouched, so blocked callers do not
    /// push their own window further out.
    pub fn check(&mut self, key: &str, now: Instant) -> Decision {
        match self.entries.get_mut(key) {
            Some(entry) if now <= entry.reset_at => {
                if entry.count >= self.policy.limit {
                    return Decision::Rejected {
                        retry_after_secs: ceil_secs(entry.reset_at - now),
                    };
                }
                entry.count += 1;
                Decision::Admitted
            }
            _ => {
                self.entries.insert(
                    key.to_string(),
                    WindowEntry {
                        count: 1,
                        reset_at: now + self.policy.window,
                    },
                );
                Decision::Admitted
            }
        }
    }

    /// Drop entries whose window has passed, returning how many were removed
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now <= entry.reset_at);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn ceil_secs(remaining: Duration) -> u64 {
    u64::try_from(remaining.as_millis().div_ceil(1000)).unwrap_or(u64::MAX)
}

/// Backing store for one admission axis
#[async_trait]
pub trait AdmissionStore: Send + Sync {
    /// Record one hit for `key`; never fails
    async fn check(&self, key: &str) -> Decision;

    /// Forget expired windows, returning how many were removed
    async fn sweep_expired(&self) -> usize {
        0
    }
}

/// In-process store; counts are per replica
#[derive(Debug)]
pub struct MemoryWindowStore {
    window: Mutex<FixedWindow>,
}

impl MemoryWindowStore {
    pub fn new(policy: WindowPolicy) -> Self {
        Self {
            window: Mutex::new(FixedWindow::new(policy)),
        }
    }

    /// Check at an explicit instant
    pub fn check_at(&self, key: &str, now: Instant) -> Decision {
        match self.window.lock() {
            Ok(mut window) => window.check(key, now),
            Err(poisoned) => poisoned.into_inner().check(key, now),
        }
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        match self.window.lock() {
            Ok(mut window) => window.sweep(now),
            Err(poisoned) => poisoned.into_inner().sweep(now),
        }
    }
}

#[async_trait]
impl AdmissionStore for MemoryWindowStore {
    async fn check(&self, key: &str) -> Decision {
        self.check_at(key, Instant::now())
    }

    async fn sweep_expired(&self) -> usize {
        self.sweep_at(Instant::now())
    }
}

/// Store shared between replicas through Redis
///
/// Redis expires the windows itself, so there is nothing to sweep.
#[derive(Clone)]
pub struct RedisWindowStore {
    pool: RedisPool,
    policy: WindowPolicy,
    prefix: &'static str,
}

impl RedisWindowStore {
    pub fn new(pool: RedisPool, policy: WindowPolicy, prefix: &'static str) -> Self {
        Self {
            pool,
            policy,
            prefix,
        }
    }
}

#[async_trait]
impl AdmissionStore for RedisWindowStore {
    async fn check(&self, key: &str) -> Decision {
        let window_ms = u64::try_from(self.policy.window.as_millis()).unwrap_or(u64::MAX);
        let redis_key = format!("admission:{}:{}", self.prefix, key);

        match self
            .pool
            .fixed_window_hit(&redis_key, self.policy.limit, window_ms)
            .await
        {
            Ok(hit) if hit.admitted => Decision::Admitted,
            Ok(hit) => Decision::Rejected {
                retry_after_secs: ceil_secs(Duration::from_millis(hit.remaining_ms)),
            },
            Err(e) => {
                warn!("Admission store unavailable, admitting request: {}", e);
                Decision::Admitted
            }
        }
    }
}

/// How an absent target e-mail is counted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyTargetPolicy {
    /// Skip the e-mail axis; only the client address is limited
    #[default]
    Admit,
    /// Count every empty e-mail against one shared key
    Shared,
}

/// Two-axis gate in front of the password-reset request endpoint
#[derive(Clone)]
pub struct PasswordResetGate {
    by_client: Arc<dyn AdmissionStore>,
    by_target: Arc<dyn AdmissionStore>,
    empty_target: EmptyTargetPolicy,
}

impl PasswordResetGate {
    pub fn new(
        by_client: Arc<dyn AdmissionStore>,
        by_target: Arc<dyn AdmissionStore>,
        empty_target: EmptyTargetPolicy,
    ) -> Self {
        Self {
            by_client,
            by_target,
            empty_target,
        }
    }

    /// Gate backed by two in-process stores sharing one policy
    pub fn in_memory(policy: WindowPolicy, empty_target: EmptyTargetPolicy) -> Self {
        Self::new(
            Arc::new(MemoryWindowStore::new(policy)),
            Arc::new(MemoryWindowStore::new(policy)),
            empty_target,
        )
    }

    /// Gate backed by Redis so every replica shares the same windows
    pub fn redis(pool: RedisPool, policy: WindowPolicy, empty_target: EmptyTargetPolicy) -> Self {
        Self::new(
            Arc::new(RedisWindowStore::new(pool.clone(), policy, "reset-ip")),
            Arc::new(RedisWindowStore::new(pool, policy, "reset-email")),
            empty_target,
        )
    }

    /// Check both axes; each axis records the hit independently
    pub async fn check(&self, client: &str, target: &str) -> Decision {
        let by_client = self.by_client.check(client).await;
        let by_target = if target.is_empty() && self.empty_target == EmptyTargetPolicy::Admit {
            Decision::Admitted
        } else {
            self.by_target.check(target).await
        };
        by_client.combine(by_target)
    }

    pub async fn sweep_expired(&self) -> usize {
        self.by_client.sweep_expired().await + self.by_target.sweep_expired().await
    }

    /// Schedule the periodic sweep of expired windows
    ///
    /// The returned scheduler must be kept alive for the job to keep running.
    pub async fn schedule_sweep(&self, every: Duration) -> Result<JobScheduler> {
        let scheduler = JobScheduler::new().await?;
        let gate = self.clone();

        let job = Job::new_repeated_async(every, move |_uuid, _lock| {
            let gate = gate.clone();
            Box::pin(async move {
                let removed = gate.sweep_expired().await;
                if removed > 0 {
                    debug!("Swept {} expired admission windows", removed);
                }
            })
        })?;

        scheduler.add(job).await?;
        scheduler.start().await?;
        Ok(scheduler)
    }
}

/// Client identity: first `X-Forwarded-For` hop, else peer address
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    match (forwarded, peer) {
        (Some(hop), _) => hop.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => "unknown".to_string(),
    }
}

#[derive(Deserialize)]
struct TargetBody {
    email: Option<serde_json::Value>,
}

/// Target identity: the lowercased `email` field of a JSON body, or empty
pub fn target_identity(body: &[u8]) -> String {
    serde_json::from_slice::<TargetBody>(body)
        .ok()
        .and_then(|body| body.email)
        .and_then(|email| email.as_str().map(str::to_lowercase))
        .unwrap_or_default()
}

/// Middleware applying the password-reset gate
///
/// The body is buffered to read the target e-mail and handed on unchanged.
pub async fn rate_limit_password_reset(
    State(gate): State<PasswordResetGate>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let bytes: Bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to buffer password reset request body: {}", e);
            return ApiError::BadRequest("Invalid payload".to_string()).into_response();
        }
    };

    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_identity(&parts.headers, peer);
    let target = target_identity(&bytes);

    if let Decision::Rejected { retry_after_secs } = gate.check(&client, &target).await {
        warn!("Password reset request from {} rejected", client);
        return ApiError::TooManyRequests { retry_after_secs }.into_response();
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn policy() -> WindowPolicy {
        WindowPolicy::default()
    }

    #[test]
    fn test_sixth_hit_in_window_is_rejected() {
        let mut window = FixedWindow::new(policy());
        let t0 = Instant::now();

        for i in 0..5 {
            assert_eq!(
                window.check("1.2.3.4", t0 + Duration::from_secs(i * 10)),
                Decision::Admitted
            );
        }
        assert_eq!(
            window.check("1.2.3.4", t0 + Duration::from_secs(60)),
            Decision::Rejected {
                retry_after_secs: 840
            }
        );
    }

    #[test]
    fn test_rejection_does_not_extend_window() {
        let limit = 3;
        let mut window = FixedWindow::new(WindowPolicy {
            limit,
            window: Duration::from_secs(10),
        });
        let t0 = Instant::now();

        for _ in 0..limit {
            assert!(window.check("k", t0).is_admitted());
        }
        for s in 1..=10 {
            assert!(!window.check("k", t0 + Duration::from_secs(s)).is_admitted());
        }

        // A fresh window counts from one, not from the rejected attempts
        let reopened = t0 + Duration::from_millis(10_001);
        for _ in 0..limit {
            assert!(window.check("k", reopened).is_admitted());
        }
        assert!(matches!(
            window.check("k", reopened),
            Decision::Rejected { .. }
        ));
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let mut window = FixedWindow::new(WindowPolicy {
            limit: 1,
            window: Duration::from_secs(10),
        });
        let t0 = Instant::now();

        window.check("k", t0);
        assert_eq!(
            window.check("k", t0 + Duration::from_millis(8_500)),
            Decision::Rejected {
                retry_after_secs: 2
            }
        );
        assert_eq!(
            window.check("k", t0 + Duration::from_secs(10)),
            Decision::Rejected {
                retry_after_secs: 0
            }
        );
    }

    #[test]
    fn test_keys_are_independent() {
        let mut window = FixedWindow::new(WindowPolicy {
            limit: 2,
            window: Duration::from_secs(60),
        });
        let now = Instant::now();

        assert!(window.check("a", now).is_admitted());
        assert!(window.check("a", now).is_admitted());
        assert!(!window.check("a", now).is_admitted());
        assert!(window.check("b", now).is_admitted());
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn test_sweep_removes_only_expired_entries() {
        let mut window = FixedWindow::new(WindowPolicy {
            limit: 5,
            window: Duration::from_secs(60),
        });
        let t0 = Instant::now();

        window.check("old", t0);
        window.check("new", t0 + Duration::from_secs(30));

        assert_eq!(window.sweep(t0 + Duration::from_secs(61)), 1);
        assert_eq!(window.len(), 1);
        assert!(!window.is_empty());
    }

    #[test]
    fn test_combine_uses_longest_wait_or_default() {
        let a = Decision::Rejected {
            retry_after_secs: 30,
        };
        let b = Decision::Rejected {
            retry_after_secs: 90,
        };
        assert_eq!(
            a.combine(b),
            Decision::Rejected {
                retry_after_secs: 90
            }
        );
        assert_eq!(
            Decision::Admitted.combine(Decision::Rejected {
                retry_after_secs: 0
            }),
            Decision::Rejected {
                retry_after_secs: 60
            }
        );
        assert_eq!(
            Decision::Admitted.combine(Decision::Admitted),
            Decision::Admitted
        );
    }

    #[tokio::test]
    async fn test_gate_limits_each_axis() {
        let gate = PasswordResetGate::in_memory(
            WindowPolicy {
                limit: 2,
                window: Duration::from_secs(60),
            },
            EmptyTargetPolicy::Admit,
        );

        // Rotating addresses still hit the e-mail axis.
        assert!(gate.check("10.0.0.1", "a@x.com").await.is_admitted());
        assert!(gate.check("10.0.0.2", "a@x.com").await.is_admitted());
        assert!(!gate.check("10.0.0.3", "a@x.com").await.is_admitted());

        // Rotating e-mails still hit the address axis.
        assert!(gate.check("10.0.0.9", "b@x.com").await.is_admitted());
        assert!(gate.check("10.0.0.9", "c@x.com").await.is_admitted());
        assert!(!gate.check("10.0.0.9", "d@x.com").await.is_admitted());
    }

    #[tokio::test]
    async fn test_empty_target_policy() {
        let window = WindowPolicy {
            limit: 1,
            window: Duration::from_secs(60),
        };

        let admit = PasswordResetGate::in_memory(window, EmptyTargetPolicy::Admit);
        assert!(admit.check("10.0.0.1", "").await.is_admitted());
        assert!(admit.check("10.0.0.2", "").await.is_admitted());

        let shared = PasswordResetGate::in_memory(window, EmptyTargetPolicy::Shared);
        assert!(shared.check("10.0.0.1", "").await.is_admitted());
        assert!(!shared.check("10.0.0.2", "").await.is_admitted());
    }

    #[tokio::test]
    async fn test_gate_sweeps_both_axes() {
        let gate = PasswordResetGate::in_memory(
            WindowPolicy {
                limit: 5,
                window: Duration::from_millis(1),
            },
            EmptyTargetPolicy::Admit,
        );
        gate.check("10.0.0.1", "a@x.com").await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(gate.sweep_expired().await, 2);
    }

    #[test]
    fn test_client_identity() {
        let peer: SocketAddr = "192.168.1.7:51000".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_identity(&headers, Some(peer)), "192.168.1.7");
        assert_eq!(client_identity(&headers, None), "unknown");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static(" 203.0.113.9 , 10.0.0.1"),
        );
        assert_eq!(client_identity(&headers, Some(peer)), "203.0.113.9");
    }

    #[test]
    fn test_target_identity() {
        assert_eq!(target_identity(br#"{"email":"Jane@X.COM"}"#), "jane@x.com");
        assert_eq!(target_identity(br#"{"email":42}"#), "");
        assert_eq!(target_identity(br#"{}"#), "");
        assert_eq!(target_identity(b"not json"), "");
    }
}
