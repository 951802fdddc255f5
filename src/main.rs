// ===============================
// src/main.rs
// ===============================
/*
 # terminal 1: matching engine server listening on :1234
 # terminal 2:
 RUST_LOG=info cargo run --bin meclient -- --addr 127.0.0.1:1234 --flush --metrics-port 9898

 curl -s localhost:9898/metrics | grep '^meclient_'
*/
/*
=============================================================================
Project : me_client_rust - async client for the matching engine server
Module  : main.rs
Version : 0.5.0
License : MIT (see LICENSE)

Summary : Thin consumer binary. Loads config (.env + CLI), connects, logs
          every inbound event and error, prints a stats heartbeat, mirrors
          stats into Prometheus, optionally records events as JSONL.
=============================================================================
*/
use clap::Parser;
use tokio::{select, sync::mpsc, time::Duration};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use me_client_rust::config::{ProtocolMode, SymbolFields, TransportKind};
use me_client_rust::{metrics, recorder, Client, Config, Event};

#[derive(Parser, Debug)]
#[command(name = "meclient", version, about = "Matching engine client")]
struct Cli {
    /// host:port of the server (overrides ME_ADDR)
    #[arg(long)]
    addr: Option<String>,
    /// use UDP instead of TCP
    #[arg(long)]
    udp: bool,
    /// auto | line | framed
    #[arg(long)]
    protocol: Option<String>,
    /// omit | include (symbol field on acks/trades/cancels)
    #[arg(long)]
    symbols: Option<String>,
    #[arg(long)]
    no_reconnect: bool,
    /// send a flush right after connecting
    #[arg(long)]
    flush: bool,
    /// append inbound events to this JSONL file
    #[arg(long)]
    record_file: Option<String>,
    #[arg(long)]
    metrics_port: Option<u16>,
}

fn build_config(cli: &Cli) -> Config {
    let mut cfg = Config::from_env();
    if let Some(a) = &cli.addr {
        cfg.address = a.clone();
    }
    if cli.udp {
        cfg.transport = TransportKind::Udp;
        cfg.auto_reconnect = false;
    }
    if let Some(p) = cli.protocol.as_deref() {
        match ProtocolMode::parse(p) {
            Some(p) => cfg.protocol = p,
            None => warn!(protocol = %p, "unknown protocol, keeping {}", cfg.protocol.as_str()),
        }
    }
    if let Some(s) = cli.symbols.as_deref() {
        match SymbolFields::parse(s) {
            Some(s) => cfg.symbol_fields = s,
            None => warn!(symbols = %s, "unknown symbol mode, keeping default"),
        }
    }
    if cli.no_reconnect {
        cfg.auto_reconnect = false;
    }
    cfg
}

#[tokio::main]
async fn main() {
    // ---- Logging ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = build_config(&cli);
    info!(
        addr = %cfg.address,
        transport = cfg.transport.as_str(),
        protocol = cfg.protocol.as_str(),
        format = ?cfg.wire_format(),
        auto_reconnect = cfg.reconnect_enabled(),
        "startup config"
    );

    // ---- Metrics ----
    metrics::init();
    if let Some(port) = cli.metrics_port {
        metrics::serve_metrics(port);
    }

    // ---- Client ----
    let client = match Client::new(cfg) {
        Ok(c) => c,
        Err(e) => {
            error!(%e, "invalid configuration");
            std::process::exit(2);
        }
    };
    let Some(mut ch) = client.take_channels() else {
        error!("output channels unavailable");
        std::process::exit(1);
    };
    if let Err(e) = client.connect().await {
        error!(%e, "connect failed");
        std::process::exit(1);
    }
    info!(remote = ?client.remote_address(), "connected");

    if cli.flush {
        if let Err(e) = client.send_flush() {
            warn!(%e, "flush not queued");
        }
    }

    // ---- Recorder (optional) ----
    let (rec_tx, rec_task) = match cli.record_file.clone() {
        Some(path) => {
            let (tx, rx) = mpsc::channel::<Event>(4096);
            let task = tokio::spawn(async move {
                if let Err(e) = recorder::run(rx, path).await {
                    error!(?e, "recorder stopped");
                }
            });
            (Some(tx), Some(task))
        }
        None => (None, None),
    };
    let record = |ev: Event| {
        metrics::EVENTS.with_label_values(&[ev.kind()]).inc();
        if let Some(tx) = &rec_tx {
            let _ = tx.try_send(ev);
        }
    };

    // ---- Main loop: events + heartbeat ----
    let mut heartbeat = tokio::time::interval(Duration::from_secs(1));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        select! {
            Some(a) = ch.acks.recv() => {
                info!(user = a.user_id, order = a.order_id, "ack");
                record(Event::Ack(a));
            },
            Some(t) = ch.trades.recv() => {
                info!(buy = t.buy_order_id, sell = t.sell_order_id, px = t.price, qty = t.qty, "trade");
                record(Event::Trade(t));
            },
            Some(b) = ch.book_updates.recv() => {
                info!(symbol = %b.symbol, side = %b.side, px = b.price, qty = b.qty, "book");
                record(Event::BookUpdate(b));
            },
            Some(c) = ch.cancel_acks.recv() => {
                info!(user = c.user_id, order = c.order_id, "cancel ack");
                record(Event::CancelAck(c));
            },
            Some(e) = ch.errors.recv() => {
                if e.is_fatal() {
                    error!(%e, "fatal client error");
                } else {
                    warn!(%e, "client error");
                }
            },
            Some(r) = ch.reconnects.recv() => {
                info!(attempt = r.attempt, "reconnected");
            },
            _ = heartbeat.tick() => {
                let s = client.stats();
                metrics::observe(&s, client.state());
                info!(
                    sent = s.messages_sent,
                    received = s.messages_received,
                    errors = s.errors,
                    reconnects = s.reconnects,
                    dropped = s.dropped,
                    state = client.state().as_str(),
                    "heartbeat"
                );
            },
            _ = &mut shutdown => {
                info!("ctrl-c, shutting down");
                break;
            },
        }
    }

    client.close().await;
    drop(rec_tx);
    if let Some(task) = rec_task {
        // recorder flushes once its channel closes
        let _ = task.await;
    }
    let s = client.stats();
    info!(sent = s.messages_sent, received = s.messages_received, "bye");
}
