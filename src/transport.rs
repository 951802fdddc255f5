// ===============================
// src/transport.rs
// ===============================
//
// Satu `Link` = satu koneksi hidup (TCP stream atau UDP socket).
// - read side  : hanya dipakai read loop
// - write side : hanya dipakai write loop
// Keduanya di balik Mutex terpisah, jadi read dan write tidak saling blok.
//
// TCP : reliable, ordered; EOF dari peer dibedakan dari I/O error.
// UDP : "connect" hanya bind + set remote; is_connected = socket lokal siap.
//
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use futures_util::SinkExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::timeout;
use tokio_util::codec::{Encoder, FramedRead, FramedWrite};
use tracing::{debug, info};

use crate::codec::{self, WireCodec};
use crate::config::{Config, TransportKind, WireFormat, CLOSE_LINGER};
use crate::domain::{Command, Event};
use crate::error::{DecodeError, ReadError, TransportError};

const READ_BUFFER: usize = 64 * 1024;
const MAX_DATAGRAM: usize = 64 * 1024;

pub enum LinkReader {
    Stream(FramedRead<OwnedReadHalf, WireCodec>),
    Datagram {
        socket: Arc<UdpSocket>,
        buf: Vec<u8>,
        pending: VecDeque<Result<Event, DecodeError>>,
    },
}

impl LinkReader {
    /// `Ok(None)` = peer closed the stream (never returned for UDP).
    pub async fn next_event(&mut self, fmt: WireFormat) -> Result<Option<Event>, ReadError> {
        match self {
            LinkReader::Stream(frames) => codec::read_event(frames).await,
            LinkReader::Datagram { socket, buf, pending } => loop {
                if let Some(item) = pending.pop_front() {
                    return item.map(Some).map_err(ReadError::from);
                }
                let n = match socket.recv(&mut buf[..]).await {
                    Ok(n) => n,
                    // ICMP port unreachable: paket hilang, bukan koneksi putus
                    Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                        debug!(?e, "udp recv refused, ignoring");
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                };
                pending.extend(codec::decode_datagram(&buf[..n], fmt));
            },
        }
    }
}

pub enum LinkWriter {
    Stream(FramedWrite<OwnedWriteHalf, WireCodec>),
    Datagram {
        socket: Arc<UdpSocket>,
        codec: WireCodec,
        buf: BytesMut,
    },
}

impl LinkWriter {
    /// Encode one command and flush it right away (SinkExt::send = feed + flush).
    pub async fn send(&mut self, cmd: &Command) -> Result<(), TransportError> {
        match self {
            LinkWriter::Stream(w) => w.send(cmd).await?,
            LinkWriter::Datagram { socket, codec, buf } => {
                buf.clear();
                codec.encode(cmd, buf)?;
                socket.send(&buf[..]).await?;
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self) {
        if let LinkWriter::Stream(w) = self {
            // peer yang berhenti membaca tidak boleh menahan close
            if timeout(CLOSE_LINGER, w.close()).await.is_err() {
                debug!("write side did not drain before close, dropping it");
            }
        }
    }
}

pub struct Link {
    kind: TransportKind,
    fmt: WireFormat,
    remote: SocketAddr,
    connected: AtomicBool,
    reader: Mutex<LinkReader>,
    writer: Mutex<LinkWriter>,
}

impl Link {
    /// Dial according to `cfg`, bounded by `cfg.connect_timeout`.
    pub async fn dial(cfg: &Config) -> Result<Link, TransportError> {
        let fmt = cfg.wire_format();
        let addr = cfg.address.trim();
        let fut = async {
            match cfg.transport {
                TransportKind::Tcp => dial_tcp(addr, fmt).await,
                TransportKind::Udp => dial_udp(addr, fmt).await,
            }
        };
        match timeout(cfg.connect_timeout, fut).await {
            Ok(res) => res,
            Err(_) => Err(TransportError::ConnectTimeout {
                addr: addr.to_string(),
                timeout: cfg.connect_timeout,
            }),
        }
    }

    pub fn remote_address(&self) -> String { self.remote.to_string() }
    pub fn is_connected(&self) -> bool { self.connected.load(Ordering::Acquire) }
    pub fn mark_down(&self) { self.connected.store(false, Ordering::Release); }

    /// Exclusive read handle (read loop only).
    pub async fn reader(&self) -> MutexGuard<'_, LinkReader> { self.reader.lock().await }

    /// Exclusive write handle (write loop only).
    pub async fn writer(&self) -> MutexGuard<'_, LinkWriter> { self.writer.lock().await }

    /// Next inbound event. Any transport failure or EOF marks the link down;
    /// a decode error leaves it up.
    pub async fn read_event(&self) -> Result<Option<Event>, ReadError> {
        let res = self.reader().await.next_event(self.fmt).await;
        if matches!(res, Ok(None) | Err(ReadError::Transport(_))) {
            self.mark_down();
        }
        res
    }

    pub async fn write_command(&self, cmd: &Command) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let res = self.writer().await.send(cmd).await;
        if res.is_err() && self.kind == TransportKind::Tcp {
            self.mark_down();
        }
        res
    }

    /// Mark down and shut the write side if nobody is using it, waiting at
    /// most CLOSE_LINGER. The sockets themselves are released when the last
    /// `Arc<Link>` drops.
    pub async fn close(&self) {
        self.mark_down();
        if let Ok(mut w) = self.writer.try_lock() {
            w.shutdown().await;
        }
        debug!(remote = %self.remote, transport = self.kind.as_str(), "link closed");
    }
}

async fn resolve(addr: &str) -> Result<Vec<SocketAddr>, TransportError> {
    let addrs: Vec<SocketAddr> = lookup_host(addr)
        .await
        .map_err(|source| TransportError::Resolve { addr: addr.to_string(), source })?
        .collect();
    if addrs.is_empty() {
        return Err(TransportError::Resolve {
            addr: addr.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses"),
        });
    }
    Ok(addrs)
}

async fn dial_tcp(addr: &str, fmt: WireFormat) -> Result<Link, TransportError> {
    let mut last_err = None;
    for remote in resolve(addr).await? {
        match TcpStream::connect(remote).await {
            Ok(stream) => {
                let _ = stream.set_nodelay(true);
                let (rd, wr) = stream.into_split();
                info!(%remote, "tcp connected");
                return Ok(Link {
                    kind: TransportKind::Tcp,
                    fmt,
                    remote,
                    connected: AtomicBool::new(true),
                    reader: Mutex::new(LinkReader::Stream(FramedRead::with_capacity(
                        rd,
                        WireCodec::new(fmt),
                        READ_BUFFER,
                    ))),
                    writer: Mutex::new(LinkWriter::Stream(FramedWrite::new(wr, WireCodec::new(fmt)))),
                });
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(TransportError::Connect {
        addr: addr.to_string(),
        source: last_err.unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses")),
    })
}

async fn dial_udp(addr: &str, fmt: WireFormat) -> Result<Link, TransportError> {
    let remote = resolve(addr).await?[0];
    let local: SocketAddr = if remote.is_ipv4() {
        SocketAddr::from(([0, 0, 0, 0], 0))
    } else {
        SocketAddr::from(([0u16; 8], 0))
    };
    let connect_err = |source| TransportError::Connect { addr: addr.to_string(), source };
    let socket = UdpSocket::bind(local).await.map_err(connect_err)?;
    socket.connect(remote).await.map_err(connect_err)?;
    let socket = Arc::new(socket);
    info!(%remote, "udp socket ready");
    Ok(Link {
        kind: TransportKind::Udp,
        fmt,
        remote,
        connected: AtomicBool::new(true),
        reader: Mutex::new(LinkReader::Datagram {
            socket: Arc::clone(&socket),
            buf: vec![0u8; MAX_DATAGRAM],
            pending: VecDeque::new(),
        }),
        writer: Mutex::new(LinkWriter::Datagram {
            socket,
            codec: WireCodec::new(fmt),
            buf: BytesMut::with_capacity(128),
        }),
    })
}
