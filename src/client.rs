// ===============================
// src/client.rs
// ===============================
//
// Public facade. Alur pakai:
//   let client = Client::new(cfg)?;
//   let mut ch = client.take_channels().unwrap();
//   client.connect().await?;
//   client.send_order(order)?;        // sync, non-blocking
//   ... ch.acks.recv().await ...
//   client.close().await;             // idempotent, join kedua task
//
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::domain::{CancelOrder, Command, ConnState, NewOrder};
use crate::error::ClientError;
use crate::pump::{self, ClientChannels, Outputs};
use crate::stats::{Stats, StatsSnapshot};
use crate::supervisor::Supervisor;
use crate::validate;

pub struct Client {
    cfg: Config,
    sup: Arc<Supervisor>,
    stats: Arc<Stats>,
    cancel: CancellationToken,

    cmd_tx: mpsc::Sender<Command>,
    // taken by connect(); None afterwards
    cmd_rx: Mutex<Option<mpsc::Receiver<Command>>>,
    // dropped by close() so every output channel ends exactly once
    outputs: Mutex<Option<Outputs>>,
    channels: Mutex<Option<ClientChannels>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Client {
    /// Validates `cfg`; nothing touches the network until `connect()`.
    pub fn new(cfg: Config) -> Result<Self, ClientError> {
        cfg.validate()?;
        let stats = Arc::new(Stats::new());
        let cancel = CancellationToken::new();
        let sup = Arc::new(Supervisor::new(cfg.clone(), Arc::clone(&stats), cancel.clone()));
        let (cmd_tx, cmd_rx) = mpsc::channel(cfg.channel_capacity);
        let (outputs, channels) = pump::channels(cfg.channel_capacity);
        Ok(Self {
            cfg,
            sup,
            stats,
            cancel,
            cmd_tx,
            cmd_rx: Mutex::new(Some(cmd_rx)),
            outputs: Mutex::new(Some(outputs)),
            channels: Mutex::new(Some(channels)),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &Config { &self.cfg }

    /// Receiving ends of every output channel. `Some` exactly once.
    pub fn take_channels(&self) -> Option<ClientChannels> {
        self.channels.lock().take()
    }

    /// Dial, then spawn the read and write loops. A failed dial can be retried.
    pub async fn connect(&self) -> Result<(), ClientError> {
        if self.cancel.is_cancelled() {
            return Err(ClientError::Closed);
        }
        let rx = self.cmd_rx.lock().take().ok_or(ClientError::AlreadyConnected)?;

        if let Err(e) = self.sup.connect_initial().await {
            *self.cmd_rx.lock() = Some(rx);
            return Err(e);
        }

        let out = self.outputs.lock().clone().ok_or(ClientError::Closed)?;
        let read = tokio::spawn(pump::read_loop(
            Arc::clone(&self.sup),
            out.clone(),
            Arc::clone(&self.stats),
            self.cancel.clone(),
        ));
        let write = tokio::spawn(pump::write_loop(
            Arc::clone(&self.sup),
            rx,
            out,
            Arc::clone(&self.stats),
            self.cancel.clone(),
        ));
        self.tasks.lock().extend([read, write]);
        info!(addr = %self.cfg.address, format = ?self.cfg.wire_format(), "client started");
        Ok(())
    }

    pub fn send_order(&self, order: NewOrder) -> Result<(), ClientError> {
        self.enqueue(Command::NewOrder(order))
    }

    pub fn send_cancel(&self, cancel: CancelOrder) -> Result<(), ClientError> {
        self.enqueue(Command::Cancel(cancel))
    }

    pub fn send_flush(&self) -> Result<(), ClientError> {
        self.enqueue(Command::Flush)
    }

    /// Validate and queue without waiting. Full queue => QueueFull + dropped++.
    fn enqueue(&self, cmd: Command) -> Result<(), ClientError> {
        if self.cancel.is_cancelled() {
            return Err(ClientError::Closed);
        }
        validate::check(&cmd, self.cfg.symbol_fields)?;
        match self.cmd_tx.try_send(cmd) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.stats.inc_dropped();
                Err(ClientError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(ClientError::Closed),
        }
    }

    pub fn is_connected(&self) -> bool { self.sup.is_connected() }
    pub fn state(&self) -> ConnState { self.sup.state() }
    pub fn remote_address(&self) -> Option<String> { self.sup.remote_address() }
    pub fn stats(&self) -> StatsSnapshot { self.stats.snapshot() }

    /// Cancel, join both loops, drop the link and the channel senders.
    /// Safe to call more than once.
    pub async fn close(&self) {
        self.cancel.cancel();
        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        for t in tasks {
            if let Err(e) = t.await {
                warn!(?e, "client task ended abnormally");
            }
        }
        self.sup.shutdown().await;
        self.outputs.lock().take();
        self.cmd_rx.lock().take();
        info!(addr = %self.cfg.address, "client closed");
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        // loops stop on their own if close() was never awaited
        self.cancel.cancel();
    }
}
