// ===============================
// src/recorder.rs
// ===============================
//
// JSONL recorder untuk event inbound:
// - Satu baris JSON per Event, dengan timestamp UTC (ns) saat dicatat.
// - BufWriter, flush tiap 1s dan/atau tiap 1000 event.
// - Parent directory dibuat otomatis.
// - Kalau tulis gagal, reopen file sekali lalu lanjut.
//
// Aktif lewat `meclient --record-file /path/events.jsonl` (lihat main.rs).
//
use serde::Serialize;
use std::io;
use std::path::Path;
use tokio::{
    fs::{self, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{error, info};

use chrono::Utc;

use crate::domain::Event;

const FLUSH_EVERY_N_EVENTS: u32 = 1000;

#[derive(Serialize)]
struct Record<'a> {
    ts_ns: i64,
    kind: &'static str,
    event: &'a Event,
}

async fn open_writer(path: &str) -> io::Result<BufWriter<fs::File>> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path).await?;
    Ok(BufWriter::new(file))
}

fn to_line(ev: &Event) -> serde_json::Result<String> {
    let rec = Record {
        ts_ns: Utc::now().timestamp_nanos_opt().unwrap_or(0),
        kind: ev.kind(),
        event: ev,
    };
    let mut line = serde_json::to_string(&rec)?;
    line.push('\n');
    Ok(line)
}

/// Drain `rx` into `path` until the sender side closes.
pub async fn run(mut rx: mpsc::Receiver<Event>, path: String) -> io::Result<()> {
    let mut writer = open_writer(&path).await?;
    info!(%path, "recorder: started");

    let mut tick = interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut since_last_flush: u32 = 0;

    loop {
        tokio::select! {
            maybe_ev = rx.recv() => {
                let Some(ev) = maybe_ev else {
                    writer.flush().await?;
                    info!("recorder: channel closed, stopped");
                    return Ok(());
                };
                let line = match to_line(&ev) {
                    Ok(s) => s,
                    Err(e) => {
                        error!(?e, "recorder: serialize error, skip event");
                        continue;
                    }
                };
                if let Err(e) = writer.write_all(line.as_bytes()).await {
                    error!(?e, "recorder: write failed, reopening");
                    writer = open_writer(&path).await?;
                    if let Err(e2) = writer.write_all(line.as_bytes()).await {
                        error!(?e2, "recorder: write failed again after reopen, drop event");
                        continue;
                    }
                }
                since_last_flush += 1;
                if since_last_flush >= FLUSH_EVERY_N_EVENTS {
                    let _ = writer.flush().await;
                    since_last_flush = 0;
                }
            }
            _ = tick.tick() => {
                let _ = writer.flush().await;
                since_last_flush = 0;
            }
        }
    }
}
