// ===============================
// src/supervisor.rs
// ===============================
//
// Connection supervisor:
// - satu-satunya yang boleh mengganti link hidup (connect / reconnect / close)
// - state machine: Disconnected -> Connecting -> Connected <-> Reconnecting -> Closed
// - Closed itu terminal, tidak ada transisi keluar
//
// Reconnect (TCP saja): tunggu `delay`, dial, kalau gagal delay *= 2 (maks
// reconnect_max_delay), sampai max_reconnect_attempts. Semua wait bisa dibatalkan.
//
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{Config, RECONNECT_CHECK_INTERVAL};
use crate::domain::{ConnState, ReconnectEvent};
use crate::error::{ClientError, TransportError};
use crate::stats::Stats;
use crate::transport::Link;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub min: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self { min: cfg.reconnect_min_delay, max: cfg.reconnect_max_delay }
    }

    pub fn next(&self, cur: Duration) -> Duration {
        cur.saturating_mul(2).min(self.max)
    }
}

#[derive(Debug)]
pub enum RetryOutcome<T> {
    Connected { attempt: u32, value: T },
    Cancelled,
    Exhausted,
}

/// Sleep-then-dial loop. `on_failure(attempt, err, waited)` runs after every
/// failed dial; `waited` is the delay that preceded that attempt.
pub async fn retry_with_backoff<T, E, F, Fut, H>(
    policy: BackoffPolicy,
    max_attempts: u32,
    cancel: &CancellationToken,
    mut dial: F,
    mut on_failure: H,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    H: FnMut(u32, E, Duration),
{
    let mut delay = policy.min;
    for attempt in 1..=max_attempts {
        tokio::select! {
            _ = cancel.cancelled() => return RetryOutcome::Cancelled,
            _ = sleep(delay) => {}
        }
        let res = tokio::select! {
            _ = cancel.cancelled() => return RetryOutcome::Cancelled,
            r = dial(attempt) => r,
        };
        match res {
            Ok(value) => return RetryOutcome::Connected { attempt, value },
            Err(e) => {
                on_failure(attempt, e, delay);
                delay = policy.next(delay);
            }
        }
    }
    RetryOutcome::Exhausted
}

pub struct Supervisor {
    cfg: Config,
    state: AtomicU8,
    link: RwLock<Option<Arc<Link>>>,
    stats: Arc<Stats>,
    cancel: CancellationToken,
}

impl Supervisor {
    pub fn new(cfg: Config, stats: Arc<Stats>, cancel: CancellationToken) -> Self {
        Self {
            cfg,
            state: AtomicU8::new(ConnState::Disconnected as u8),
            link: RwLock::new(None),
            stats,
            cancel,
        }
    }

    pub fn config(&self) -> &Config { &self.cfg }

    pub fn state(&self) -> ConnState {
        ConnState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns false if the supervisor is already Closed.
    fn set_state(&self, next: ConnState) -> bool {
        let mut cur = self.state.load(Ordering::Acquire);
        loop {
            if cur == ConnState::Closed as u8 {
                return false;
            }
            match self.state.compare_exchange_weak(cur, next as u8, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return true,
                Err(actual) => cur = actual,
            }
        }
    }

    /// Snapshot of the live link slot. Loops re-fetch this every iteration.
    pub fn current(&self) -> Option<Arc<Link>> {
        self.link.read().clone()
    }

    fn live(&self) -> Option<Arc<Link>> {
        self.current().filter(|l| l.is_connected())
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnState::Connected && self.live().is_some()
    }

    pub fn remote_address(&self) -> Option<String> {
        self.current().map(|l| l.remote_address())
    }

    /// First dial. On failure the state falls back to Disconnected.
    pub async fn connect_initial(&self) -> Result<(), ClientError> {
        if !self.set_state(ConnState::Connecting) {
            return Err(ClientError::Closed);
        }
        match Link::dial(&self.cfg).await {
            Ok(link) => {
                self.install(Arc::new(link)).await?;
                info!(addr = %self.cfg.address, transport = self.cfg.transport.as_str(), "connected");
                Ok(())
            }
            Err(e) => {
                self.set_state(ConnState::Disconnected);
                warn!(addr = %self.cfg.address, ?e, "connect failed");
                Err(e.into())
            }
        }
    }

    async fn install(&self, link: Arc<Link>) -> Result<(), ClientError> {
        let old = self.link.write().replace(link);
        if let Some(old) = old {
            old.close().await;
        }
        if !self.set_state(ConnState::Connected) {
            // close() raced us; guard dropped before the await
            let taken = self.link.write().take();
            if let Some(l) = taken {
                l.close().await;
            }
            return Err(ClientError::Closed);
        }
        Ok(())
    }

    /// Bounded reconnect sequence. `Ok(attempt)` on success; `Err(Closed)` if
    /// cancelled; `Err(MaxReconnects)` once the budget is spent, after which the
    /// supervisor is Closed.
    pub async fn reconnect(
        &self,
        errors: &mpsc::Sender<ClientError>,
        reconnects: &mpsc::Sender<ReconnectEvent>,
    ) -> Result<u32, ClientError> {
        if !self.set_state(ConnState::Reconnecting) {
            return Err(ClientError::Closed);
        }
        let old = self.link.write().take();
        if let Some(old) = old {
            old.close().await;
        }

        let max = self.cfg.max_reconnect_attempts;
        let outcome = retry_with_backoff(
            BackoffPolicy::from_config(&self.cfg),
            max,
            &self.cancel,
            |_| Link::dial(&self.cfg),
            |attempt, source: TransportError, waited| {
                warn!(attempt, ?waited, error = %source, "reconnect attempt failed");
                self.stats.inc_errors();
                let _ = errors.try_send(ClientError::ReconnectFailed { attempt, source });
            },
        )
        .await;

        match outcome {
            RetryOutcome::Connected { attempt, value } => {
                self.install(Arc::new(value)).await?;
                self.stats.inc_reconnects();
                let _ = reconnects.try_send(ReconnectEvent { attempt });
                info!(attempt, addr = %self.cfg.address, "reconnected");
                Ok(attempt)
            }
            RetryOutcome::Cancelled => Err(ClientError::Closed),
            RetryOutcome::Exhausted => {
                self.set_state(ConnState::Closed);
                warn!(max, "giving up reconnecting");
                Err(ClientError::MaxReconnects(max))
            }
        }
    }

    /// Poll every RECONNECT_CHECK_INTERVAL for a live link, at most
    /// max_reconnect_attempts times.
    pub async fn wait_for_link(&self) -> Option<Arc<Link>> {
        let mut tick = interval(RECONNECT_CHECK_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        for _ in 0..self.cfg.max_reconnect_attempts {
            if let Some(link) = self.live() {
                return Some(link);
            }
            if self.state() == ConnState::Closed {
                return None;
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                _ = tick.tick() => {}
            }
        }
        None
    }

    /// Terminal: marks Closed and releases the link.
    pub async fn shutdown(&self) {
        self.state.store(ConnState::Closed as u8, Ordering::Release);
        let old = self.link.write().take();
        if let Some(old) = old {
            old.close().await;
        }
    }
}
