// ===============================
// src/domain.rs
// ===============================
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side { Buy, Sell }

impl Side {
    /// Wire code: `B` / `S` (case-sensitive).
    pub fn as_char(&self) -> char { match self { Side::Buy => 'B', Side::Sell => 'S' } }

    pub fn from_wire(s: &str) -> Option<Side> {
        match s {
            "B" => Some(Side::Buy),
            "S" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self { Side::Buy => f.write_str("BUY"), Side::Sell => f.write_str("SELL") }
    }
}

impl std::str::FromStr for Side {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Side::from_wire(s).ok_or_else(|| ValidationError::InvalidSide(s.to_string()))
    }
}

impl TryFrom<char> for Side {
    type Error = ValidationError;
    fn try_from(c: char) -> Result<Self, Self::Error> {
        match c {
            'B' => Ok(Side::Buy),
            'S' => Ok(Side::Sell),
            other => Err(ValidationError::InvalidSide(other.to_string())),
        }
    }
}

// ---- Outbound ----
/// price 0 = market order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder { pub user_id: u32, pub symbol: String, pub price: u32, pub qty: u32, pub side: Side, pub order_id: u32 }

/// `symbol` only goes on the wire with `SymbolFields::Include`; otherwise it is client-side metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CancelOrder { pub user_id: u32, pub order_id: u32, pub symbol: Option<String> }

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command { NewOrder(NewOrder), Cancel(CancelOrder), Flush }

impl Command {
    pub fn kind(&self) -> &'static str {
        match self { Command::NewOrder(_) => "new_order", Command::Cancel(_) => "cancel", Command::Flush => "flush" }
    }
}

// ---- Inbound ----
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack { pub user_id: u32, pub order_id: u32, pub symbol: Option<String> }
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub buy_user_id: u32,
    pub buy_order_id: u32,
    pub sell_user_id: u32,
    pub sell_order_id: u32,
    pub price: u32,
    pub qty: u32,
    pub symbol: Option<String>,
}
/// price/qty = 0 means no resting interest on that side (`-` on the wire).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookUpdate { pub symbol: String, pub side: Side, pub price: u32, pub qty: u32 }
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelAck { pub user_id: u32, pub order_id: u32, pub symbol: Option<String> }

impl BookUpdate {
    pub fn is_empty(&self) -> bool { self.price == 0 && self.qty == 0 }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event { Ack(Ack), Trade(Trade), BookUpdate(BookUpdate), CancelAck(CancelAck) }

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Ack(_) => "ack",
            Event::Trade(_) => "trade",
            Event::BookUpdate(_) => "book_update",
            Event::CancelAck(_) => "cancel_ack",
        }
    }
}

/// Sent once per successful reconnect; `attempt` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectEvent { pub attempt: u32 }

// ---- Connection state ----
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ConnState { Disconnected = 0, Connecting = 1, Connected = 2, Reconnecting = 3, Closed = 4 }

impl ConnState {
    pub fn from_u8(v: u8) -> ConnState {
        match v {
            1 => ConnState::Connecting,
            2 => ConnState::Connected,
            3 => ConnState::Reconnecting,
            4 => ConnState::Closed,
            _ => ConnState::Disconnected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnState::Disconnected => "disconnected",
            ConnState::Connecting => "connecting",
            ConnState::Connected => "connected",
            ConnState::Reconnecting => "reconnecting",
            ConnState::Closed => "closed",
        }
    }

    pub const ALL: [ConnState; 5] = [
        ConnState::Disconnected,
        ConnState::Connecting,
        ConnState::Connected,
        ConnState::Reconnecting,
        ConnState::Closed,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_wire_codes_are_case_sensitive() {
        assert_eq!(Side::from_wire("B"), Some(Side::Buy));
        assert_eq!(Side::from_wire("S"), Some(Side::Sell));
        assert_eq!(Side::from_wire("b"), None);
        assert_eq!(Side::from_wire("BUY"), None);
        assert_eq!(Side::try_from('S').unwrap(), Side::Sell);
        assert!(matches!("x".parse::<Side>(), Err(ValidationError::InvalidSide(_))));
        assert_eq!(Side::Sell.to_string(), "SELL");
    }

    #[test]
    fn conn_state_roundtrips_through_u8() {
        for s in ConnState::ALL {
            assert_eq!(ConnState::from_u8(s as u8), s);
        }
    }

    #[test]
    fn empty_book_level() {
        let b = BookUpdate { symbol: "IBM".into(), side: Side::Buy, price: 0, qty: 0 };
        assert!(b.is_empty());
        let b = BookUpdate { price: 100, ..b };
        assert!(!b.is_empty());
    }
}
