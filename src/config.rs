// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : me_client_rust - async client for the matching engine server
Module  : config.rs
Version : 0.5.0
License : MIT (see LICENSE)

Summary : Connects to a matching engine over TCP or UDP, encodes orders,
          cancels and flushes, decodes acks/trades/book updates/cancel
          acks into typed channels, and reconnects with bounded backoff.
=============================================================================
*/
use std::env;
use std::time::Duration;

use dotenvy::dotenv;

use crate::error::ConfigError;

pub const DEFAULT_PORT: u16 = 1234;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
pub const MAX_CHANNEL_CAPACITY: usize = 65536;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_RECONNECT_MIN_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 1000;

// Safety bounds
pub const MAX_CONSECUTIVE_ERRORS: u32 = 100;
pub const MAX_MESSAGE_BATCH: u32 = 1000;
pub const RECONNECT_CHECK_INTERVAL: Duration = Duration::from_millis(50);
pub const RECONNECT_CHANNEL_CAPACITY: usize = 16;
pub const MAX_SYMBOL_LEN: usize = 16;
pub const MAX_FRAME_SIZE: usize = 16 * 1024;
/// How long a fatal error waits for room on a full error channel.
pub const FATAL_REPORT_WAIT: Duration = Duration::from_secs(1);
/// Upper bound on flushing and shutting the write side when a link closes.
pub const CLOSE_LINGER: Duration = Duration::from_millis(200);

/// Stream (reconnectable) or datagram (connectionless)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    Tcp,
    Udp,
}

impl TransportKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" | "stream" => Some(TransportKind::Tcp),
            "udp" | "datagram" => Some(TransportKind::Udp),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Tcp => "tcp",
            TransportKind::Udp => "udp",
        }
    }
}

/// Framing requested by the user. `Auto` is resolved once from the transport
/// (TCP -> framed, UDP -> line), never negotiated with the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtocolMode {
    Auto,
    Line,
    Framed,
}

impl ProtocolMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(ProtocolMode::Auto),
            "line" | "csv" => Some(ProtocolMode::Line),
            "framed" | "binary" => Some(ProtocolMode::Framed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolMode::Auto => "auto",
            ProtocolMode::Line => "line",
            ProtocolMode::Framed => "framed",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Framing {
    /// newline-terminated lines
    Line,
    /// 4-byte big-endian length prefix + payload
    Framed,
}

/// Whether Ack/Trade/CancelAck/Cancel carry a symbol field on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolFields {
    Omit,
    Include,
}

impl SymbolFields {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "omit" | "no" | "false" | "0" => Some(SymbolFields::Omit),
            "include" | "yes" | "true" | "1" => Some(SymbolFields::Include),
            _ => None,
        }
    }
}

/// Fully resolved wire format, fixed for the life of a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WireFormat {
    pub framing: Framing,
    pub symbols: SymbolFields,
}

impl WireFormat {
    pub const fn line() -> Self {
        Self { framing: Framing::Line, symbols: SymbolFields::Omit }
    }

    pub const fn framed() -> Self {
        Self { framing: Framing::Framed, symbols: SymbolFields::Omit }
    }

    pub const fn with_symbols(self) -> Self {
        Self { framing: self.framing, symbols: SymbolFields::Include }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub address: String,
    pub transport: TransportKind,
    pub protocol: ProtocolMode,
    pub symbol_fields: SymbolFields,

    // capacity of every output channel and of the outbound queue
    pub channel_capacity: usize,

    pub connect_timeout: Duration,
    pub reconnect_min_delay: Duration,
    pub reconnect_max_delay: Duration,
    pub max_reconnect_attempts: u32,
    // only meaningful for TCP
    pub auto_reconnect: bool,
}

impl Config {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            transport: TransportKind::Tcp,
            protocol: ProtocolMode::Auto,
            symbol_fields: SymbolFields::Omit,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect_min_delay: DEFAULT_RECONNECT_MIN_DELAY,
            reconnect_max_delay: DEFAULT_RECONNECT_MAX_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            auto_reconnect: true,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.trim().is_empty() {
            return Err(ConfigError::EmptyAddress);
        }
        if self.channel_capacity == 0 || self.channel_capacity > MAX_CHANNEL_CAPACITY {
            return Err(ConfigError::ChannelCapacity {
                got: self.channel_capacity,
                max: MAX_CHANNEL_CAPACITY,
            });
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::ConnectTimeout);
        }
        if self.reconnect_min_delay.is_zero() || self.reconnect_max_delay.is_zero() {
            return Err(ConfigError::ReconnectDelay);
        }
        if self.reconnect_min_delay > self.reconnect_max_delay {
            return Err(ConfigError::DelayOrder {
                min: self.reconnect_min_delay,
                max: self.reconnect_max_delay,
            });
        }
        if self.max_reconnect_attempts == 0 {
            return Err(ConfigError::ReconnectAttempts);
        }
        Ok(())
    }

    pub fn wire_format(&self) -> WireFormat {
        let framing = match (self.protocol, self.transport) {
            (ProtocolMode::Line, _) => Framing::Line,
            (ProtocolMode::Framed, _) => Framing::Framed,
            (ProtocolMode::Auto, TransportKind::Tcp) => Framing::Framed,
            (ProtocolMode::Auto, TransportKind::Udp) => Framing::Line,
        };
        WireFormat { framing, symbols: self.symbol_fields }
    }

    /// Auto-reconnect only applies to stream transports.
    pub fn reconnect_enabled(&self) -> bool {
        self.auto_reconnect && self.transport == TransportKind::Tcp
    }

    /// Build from environment (.env honoured). Unknown or unparsable values
    /// fall back to defaults; `validate()` still runs in `Client::new`.
    pub fn from_env() -> Self {
        let _ = dotenv();

        let address = env::var("ME_ADDR").unwrap_or_else(|_| format!("127.0.0.1:{DEFAULT_PORT}"));
        let mut cfg = Config::new(address);

        if let Some(t) = env::var("ME_TRANSPORT").ok().and_then(|s| TransportKind::parse(&s)) {
            cfg.transport = t;
        }
        if let Some(p) = env::var("ME_PROTOCOL").ok().and_then(|s| ProtocolMode::parse(&s)) {
            cfg.protocol = p;
        }
        if let Some(s) = env::var("ME_SYMBOL_FIELDS").ok().and_then(|s| SymbolFields::parse(&s)) {
            cfg.symbol_fields = s;
        }
        if let Some(n) = env_parse::<usize>("ME_CHANNEL_CAPACITY") {
            cfg.channel_capacity = n;
        }
        if let Some(ms) = env_parse::<u64>("ME_CONNECT_TIMEOUT_MS") {
            cfg.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("ME_RECONNECT_MIN_MS") {
            cfg.reconnect_min_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("ME_RECONNECT_MAX_MS") {
            cfg.reconnect_max_delay = Duration::from_millis(ms);
        }
        if let Some(n) = env_parse::<u32>("ME_MAX_RECONNECT_ATTEMPTS") {
            cfg.max_reconnect_attempts = n;
        }
        if let Some(b) = env_parse::<bool>("ME_AUTO_RECONNECT") {
            cfg.auto_reconnect = b;
        }
        // UDP tidak punya reconnect
        if cfg.transport == TransportKind::Udp {
            cfg.auto_reconnect = false;
        }
        cfg
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::new("localhost:1234");
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.channel_capacity, 1024);
        assert_eq!(cfg.reconnect_min_delay, Duration::from_millis(100));
        assert_eq!(cfg.reconnect_max_delay, Duration::from_secs(30));
        assert!(cfg.auto_reconnect);
    }

    #[test]
    fn rejects_bad_values() {
        let base = Config::new("localhost:1234");

        let cfg = Config { address: "  ".into(), ..base.clone() };
        assert_eq!(cfg.validate(), Err(ConfigError::EmptyAddress));

        let cfg = Config { channel_capacity: 0, ..base.clone() };
        assert!(matches!(cfg.validate(), Err(ConfigError::ChannelCapacity { got: 0, .. })));

        let cfg = Config { channel_capacity: MAX_CHANNEL_CAPACITY + 1, ..base.clone() };
        assert!(matches!(cfg.validate(), Err(ConfigError::ChannelCapacity { .. })));

        let cfg = Config { channel_capacity: MAX_CHANNEL_CAPACITY, ..base.clone() };
        assert!(cfg.validate().is_ok());

        let cfg = Config { connect_timeout: Duration::ZERO, ..base.clone() };
        assert_eq!(cfg.validate(), Err(ConfigError::ConnectTimeout));

        let cfg = Config { reconnect_min_delay: Duration::ZERO, ..base.clone() };
        assert_eq!(cfg.validate(), Err(ConfigError::ReconnectDelay));

        let cfg = Config {
            reconnect_min_delay: Duration::from_secs(5),
            reconnect_max_delay: Duration::from_secs(1),
            ..base.clone()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::DelayOrder { .. })));

        let cfg = Config { max_reconnect_attempts: 0, ..base };
        assert_eq!(cfg.validate(), Err(ConfigError::ReconnectAttempts));
    }

    #[test]
    fn auto_protocol_resolves_per_transport() {
        let mut cfg = Config::new("localhost:1234");
        assert_eq!(cfg.wire_format().framing, Framing::Framed);

        cfg.transport = TransportKind::Udp;
        assert_eq!(cfg.wire_format().framing, Framing::Line);
        assert!(!cfg.reconnect_enabled());

        cfg.protocol = ProtocolMode::Framed;
        assert_eq!(cfg.wire_format().framing, Framing::Framed);

        cfg.transport = TransportKind::Tcp;
        cfg.protocol = ProtocolMode::Line;
        cfg.symbol_fields = SymbolFields::Include;
        assert_eq!(cfg.wire_format(), WireFormat::line().with_symbols());
    }

    #[test]
    fn mode_parsing() {
        assert_eq!(TransportKind::parse("UDP"), Some(TransportKind::Udp));
        assert_eq!(ProtocolMode::parse("csv"), Some(ProtocolMode::Line));
        assert_eq!(ProtocolMode::parse("binary"), Some(ProtocolMode::Framed));
        assert_eq!(ProtocolMode::parse("json"), None);
        assert_eq!(SymbolFields::parse("include"), Some(SymbolFields::Include));
    }
}
