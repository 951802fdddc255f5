// ===============================
// src/validate.rs
// ===============================
//
// Pre-send checks. Semua command dicek di sini sebelum masuk ke write queue:
// kalau gagal, tidak ada efek ke queue maupun network.
//
use crate::config::{SymbolFields, MAX_SYMBOL_LEN};
use crate::domain::{CancelOrder, Command, NewOrder};
use crate::error::ValidationError;

fn check_symbol(symbol: &str) -> Result<(), ValidationError> {
    if symbol.is_empty() {
        return Err(ValidationError::EmptySymbol);
    }
    if symbol.len() > MAX_SYMBOL_LEN {
        return Err(ValidationError::SymbolTooLong { len: symbol.len(), max: MAX_SYMBOL_LEN });
    }
    // koma / spasi / newline akan merusak format CSV
    if !symbol.bytes().all(|b| b.is_ascii_graphic() && b != b',') {
        return Err(ValidationError::InvalidSymbol(symbol.to_string()));
    }
    Ok(())
}

/// 1) qty > 0, 2) symbol 1..=16 bytes. Side is already typed.
pub fn check_order(order: &NewOrder) -> Result<(), ValidationError> {
    if order.qty == 0 {
        return Err(ValidationError::ZeroQuantity);
    }
    check_symbol(&order.symbol)
}

pub fn check_cancel(cancel: &CancelOrder, symbols: SymbolFields) -> Result<(), ValidationError> {
    match (&cancel.symbol, symbols) {
        (Some(sym), _) => check_symbol(sym),
        // symbol goes on the wire in this variant
        (None, SymbolFields::Include) => Err(ValidationError::EmptySymbol),
        (None, SymbolFields::Omit) => Ok(()),
    }
}

pub fn check(cmd: &Command, symbols: SymbolFields) -> Result<(), ValidationError> {
    match cmd {
        Command::NewOrder(o) => check_order(o),
        Command::Cancel(c) => check_cancel(c, symbols),
        Command::Flush => Ok(()),
    }
}
