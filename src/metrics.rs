// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use tracing::{info, warn};

use crate::domain::ConnState;
use crate::stats::StatsSnapshot;

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// Mirror of the client's StatsSnapshot (label: counter)
pub static CLIENT_STATS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("meclient_stats", "client counters (label: counter)"),
        &["counter"],
    )
    .unwrap()
});

// 1 for the current state, 0 for the others
pub static CONN_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("meclient_connection_state", "connection state (label: state)"),
        &["state"],
    )
    .unwrap()
});

pub static EVENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("meclient_events_total", "inbound events seen by the consumer (label: kind)"),
        &["kind"],
    )
    .unwrap()
});

pub fn init() {
    for m in [
        REGISTRY.register(Box::new(CLIENT_STATS.clone())),
        REGISTRY.register(Box::new(CONN_STATE.clone())),
        REGISTRY.register(Box::new(EVENTS.clone())),
    ] {
        // already registered on a second init()
        let _ = m;
    }
}

/// Copy a stats snapshot and the connection state into the gauges.
pub fn observe(snap: &StatsSnapshot, state: ConnState) {
    for (name, v) in [
        ("messages_sent", snap.messages_sent),
        ("messages_received", snap.messages_received),
        ("errors", snap.errors),
        ("reconnects", snap.reconnects),
        ("dropped", snap.dropped),
    ] {
        CLIENT_STATS.with_label_values(&[name]).set(v as i64);
    }
    for s in ConnState::ALL {
        CONN_STATE.with_label_values(&[s.as_str()]).set((s == state) as i64);
    }
}

// Encode all metrics in Prometheus text format
pub fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

// tiny HTTP 1.1 responder, any path
fn handle_client(mut stream: TcpStream) {
    let mut _req_buf = [0u8; 1024];
    let _ = stream.read(&mut _req_buf);

    let body = encode_metrics();
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

/// Serve metrics from a dedicated OS thread. Bind failure is logged, not fatal.
pub fn serve_metrics(port: u16) {
    thread::spawn(move || {
        let addr = format!("0.0.0.0:{port}");
        let listener = match TcpListener::bind(&addr) {
            Ok(l) => l,
            Err(e) => {
                warn!(%addr, ?e, "metrics bind failed");
                return;
            }
        };
        info!("metrics listening on http://{addr}/metrics");

        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => warn!(?e, "metrics accept error"),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observe_exports_counters_and_state() {
        init();
        let snap = StatsSnapshot { messages_sent: 3, messages_received: 7, errors: 1, reconnects: 2, dropped: 5 };
        observe(&snap, ConnState::Reconnecting);

        assert_eq!(CLIENT_STATS.with_label_values(&["messages_received"]).get(), 7);
        assert_eq!(CLIENT_STATS.with_label_values(&["dropped"]).get(), 5);
        assert_eq!(CONN_STATE.with_label_values(&["reconnecting"]).get(), 1);
        assert_eq!(CONN_STATE.with_label_values(&["connected"]).get(), 0);

        let text = String::from_utf8(encode_metrics()).unwrap();
        assert!(text.contains("meclient_stats{counter=\"reconnects\"} 2"));
        assert!(text.contains("meclient_connection_state{state=\"reconnecting\"} 1"));
    }
}
