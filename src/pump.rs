// ===============================
// src/pump.rs
// ===============================
//
// Duplex message pump: dua task per client.
// - read_loop  : decode -> fan-out ke channel per jenis event (try_send, tidak pernah blok)
// - write_loop : outbound queue -> encode -> write + flush per command
// Keduanya hanya berbagi: cancel token, supervisor (link hidup), dan Stats.
//
// Urutan: dalam satu channel, event keluar persis sesuai urutan di wire.
// Antar channel tidak ada jaminan urutan.
//
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{FATAL_REPORT_WAIT, MAX_CONSECUTIVE_ERRORS, MAX_MESSAGE_BATCH, RECONNECT_CHANNEL_CAPACITY};
use crate::domain::{Ack, BookUpdate, CancelAck, Command, Event, ReconnectEvent, Trade};
use crate::error::{ClientError, TransportError};
use crate::stats::Stats;
use crate::supervisor::Supervisor;

/// Sending halves of the output channels, owned by the pump.
#[derive(Clone)]
pub struct Outputs {
    acks: mpsc::Sender<Ack>,
    trades: mpsc::Sender<Trade>,
    book_updates: mpsc::Sender<BookUpdate>,
    cancel_acks: mpsc::Sender<CancelAck>,
    errors: mpsc::Sender<ClientError>,
    reconnects: mpsc::Sender<ReconnectEvent>,
}

/// Receiving halves handed to the caller. Each closes exactly once, after
/// the client is closed and both loops have exited.
#[derive(Debug)]
pub struct ClientChannels {
    pub acks: mpsc::Receiver<Ack>,
    pub trades: mpsc::Receiver<Trade>,
    pub book_updates: mpsc::Receiver<BookUpdate>,
    pub cancel_acks: mpsc::Receiver<CancelAck>,
    pub errors: mpsc::Receiver<ClientError>,
    pub reconnects: mpsc::Receiver<ReconnectEvent>,
}

/// Every event/error channel gets `capacity`; reconnect events get a fixed 16.
pub fn channels(capacity: usize) -> (Outputs, ClientChannels) {
    let (acks_tx, acks) = mpsc::channel(capacity);
    let (trades_tx, trades) = mpsc::channel(capacity);
    let (book_tx, book_updates) = mpsc::channel(capacity);
    let (cancel_tx, cancel_acks) = mpsc::channel(capacity);
    let (errors_tx, errors) = mpsc::channel(capacity);
    let (reconn_tx, reconnects) = mpsc::channel(RECONNECT_CHANNEL_CAPACITY);
    (
        Outputs {
            acks: acks_tx,
            trades: trades_tx,
            book_updates: book_tx,
            cancel_acks: cancel_tx,
            errors: errors_tx,
            reconnects: reconn_tx,
        },
        ClientChannels { acks, trades, book_updates, cancel_acks, errors, reconnects },
    )
}

impl Outputs {
    /// Non-blocking fan-out of one decoded event.
    pub fn dispatch(&self, ev: Event, stats: &Stats) {
        match ev {
            Event::Ack(a) => self.offer(&self.acks, a, "acks", stats),
            Event::Trade(t) => self.offer(&self.trades, t, "trades", stats),
            Event::BookUpdate(b) => self.offer(&self.book_updates, b, "book_updates", stats),
            Event::CancelAck(c) => self.offer(&self.cancel_acks, c, "cancel_acks", stats),
        }
    }

    fn offer<T>(&self, tx: &mpsc::Sender<T>, item: T, channel: &'static str, stats: &Stats) {
        match tx.try_send(item) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                stats.inc_dropped();
                debug!(channel, "output channel full, event dropped");
                self.report(ClientError::ChannelFull { channel });
            }
            // caller dropped the receiver
            Err(TrySendError::Closed(_)) => stats.inc_dropped(),
        }
    }

    /// Best effort: a full error channel loses the error.
    pub fn report(&self, err: ClientError) {
        let _ = self.errors.try_send(err);
    }

    /// Terminal errors wait for room, up to FATAL_REPORT_WAIT or cancellation.
    pub async fn report_fatal(&self, err: ClientError, cancel: &CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => {}
            res = timeout(FATAL_REPORT_WAIT, self.errors.send(err)) => {
                if !matches!(res, Ok(Ok(()))) {
                    warn!("fatal error not delivered, error channel full or closed");
                }
            }
        }
    }

    pub fn errors(&self) -> &mpsc::Sender<ClientError> { &self.errors }
    pub fn reconnects(&self) -> &mpsc::Sender<ReconnectEvent> { &self.reconnects }
}

/// Inbound half. Runs until cancelled, until a failure cannot be recovered
/// (reconnect disabled), or until a fatal error.
pub async fn read_loop(sup: Arc<Supervisor>, out: Outputs, stats: Arc<Stats>, cancel: CancellationToken) {
    let reconnect = sup.config().reconnect_enabled();
    let mut consecutive: u32 = 0;
    let mut batch: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        // re-fetch each iteration: the link may have been swapped by a reconnect
        let link = match sup.current().filter(|l| l.is_connected()) {
            Some(l) => l,
            None => match sup.wait_for_link().await {
                Some(l) => l,
                None => {
                    debug!("no live link, read loop stopping");
                    break;
                }
            },
        };

        let res = tokio::select! {
            _ = cancel.cancelled() => break,
            r = link.read_event() => r,
        };

        let err = match res {
            Ok(Some(ev)) => {
                consecutive = 0;
                stats.inc_received();
                out.dispatch(ev, &stats);
                batch += 1;
                if batch >= MAX_MESSAGE_BATCH {
                    batch = 0;
                    tokio::task::yield_now().await;
                }
                continue;
            }
            Ok(None) => ClientError::Transport(TransportError::PeerClosed),
            Err(e) => ClientError::Read(e),
        };

        consecutive += 1;
        stats.inc_errors();
        warn!(error = %err, consecutive, "read failed");
        out.report(err);

        // checked before any reconnect: a tripped breaker must not dial again
        if consecutive >= MAX_CONSECUTIVE_ERRORS {
            warn!(consecutive, "circuit breaker tripped, read loop stopping");
            sup.shutdown().await;
            out.report_fatal(ClientError::MaxConsecutiveErrors(MAX_CONSECUTIVE_ERRORS), &cancel).await;
            break;
        }
        if !reconnect {
            info!("auto-reconnect disabled, read loop stopping");
            link.mark_down();
            break;
        }
        match sup.reconnect(out.errors(), out.reconnects()).await {
            Ok(_) => {}
            Err(ClientError::Closed) => break,
            Err(fatal) => {
                out.report_fatal(fatal, &cancel).await;
                break;
            }
        }
    }
    debug!("read loop exited");
}

/// Outbound half. Never triggers reconnects itself.
pub async fn write_loop(
    sup: Arc<Supervisor>,
    mut rx: mpsc::Receiver<Command>,
    out: Outputs,
    stats: Arc<Stats>,
    cancel: CancellationToken,
) {
    loop {
        let cmd = tokio::select! {
            _ = cancel.cancelled() => break,
            c = rx.recv() => match c {
                Some(c) => c,
                None => break,
            },
        };
        // a peer that stops reading must not keep close() waiting
        let res = match sup.current() {
            Some(link) => tokio::select! {
                _ = cancel.cancelled() => break,
                r = link.write_command(&cmd) => r,
            },
            None => Err(TransportError::NotConnected),
        };
        match res {
            Ok(()) => stats.inc_sent(),
            Err(e) => {
                stats.inc_errors();
                debug!(kind = cmd.kind(), error = %e, "write failed");
                out.report(ClientError::Write(e));
            }
        }
    }
    debug!("write loop exited");
}
