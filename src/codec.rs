// ===============================
// src/codec.rs
// ===============================
//
// Wire codec. Payload = comma separated ASCII:
//   client -> server : N,uid,sym,px,qty,side,oid | C,uid,oid | C,sym,uid,oid | F
//   server -> client : A,uid,oid | T,bu,bo,su,so,px,qty | B,sym,side,px|-,qty|- | X,uid,oid
//                      (Include variant: symbol right after the tag for A/T/X/C)
// Framing:
//   Line   : payload + '\n', blank lines skipped (LinesCodec)
//   Framed : u32 big-endian length + payload (1..=16KiB), no newline needed (LengthDelimitedCodec)
//
// Setiap error decode hanya merusak satu pesan; pembacaan berikutnya mulai
// lagi dari batas line/frame berikutnya. Karena itu WireCodec mengeluarkan
// `Result<Event, DecodeError>` sebagai item, dan hanya I/O error yang
// menghentikan FramedRead.
//
use std::fmt::Write as _;
use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures_util::StreamExt; // for .next()
use tokio::io::AsyncRead;
use tokio_util::codec::{Decoder, Encoder, FramedRead, LengthDelimitedCodec, LinesCodec, LinesCodecError};

use crate::config::{Framing, SymbolFields, WireFormat, MAX_FRAME_SIZE};
use crate::domain::{Ack, BookUpdate, CancelAck, CancelOrder, Command, Event, NewOrder, Side, Trade};
use crate::error::{DecodeError, ReadError};

const EMPTY_LEVEL: &str = "-";

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Payload for one command, without framing or trailing newline.
pub fn encode_payload(cmd: &Command, symbols: SymbolFields) -> String {
    let mut out = String::with_capacity(64);
    // write! ke String tidak pernah gagal
    let _ = match cmd {
        Command::NewOrder(o) => write!(
            out,
            "N,{},{},{},{},{},{}",
            o.user_id,
            o.symbol,
            o.price,
            o.qty,
            o.side.as_char(),
            o.order_id
        ),
        Command::Cancel(c) => match symbols {
            SymbolFields::Omit => write!(out, "C,{},{}", c.user_id, c.order_id),
            SymbolFields::Include => write!(
                out,
                "C,{},{},{}",
                c.symbol.as_deref().unwrap_or_default(),
                c.user_id,
                c.order_id
            ),
        },
        Command::Flush => write!(out, "F"),
    };
    out
}

/// Complete, self-terminated bytes for one command.
pub fn encode(cmd: &Command, fmt: WireFormat) -> Vec<u8> {
    let mut dst = BytesMut::with_capacity(64);
    // validated commands stay far below MAX_FRAME_SIZE, the codec's only failure
    let _ = WireCodec::new(fmt).encode(cmd, &mut dst);
    dst.to_vec()
}

/// Server-side rendering of an event (mock servers, replay tools).
pub fn encode_event(ev: &Event, symbols: SymbolFields) -> String {
    let mut out = String::with_capacity(64);
    let sym_prefix = |s: &Option<String>| match symbols {
        SymbolFields::Include => format!("{},", s.as_deref().unwrap_or_default()),
        SymbolFields::Omit => String::new(),
    };
    let level = |v: u32| if v == 0 { EMPTY_LEVEL.to_string() } else { v.to_string() };
    let _ = match ev {
        Event::Ack(a) => write!(out, "A,{}{},{}", sym_prefix(&a.symbol), a.user_id, a.order_id),
        Event::Trade(t) => write!(
            out,
            "T,{}{},{},{},{},{},{}",
            sym_prefix(&t.symbol),
            t.buy_user_id,
            t.buy_order_id,
            t.sell_user_id,
            t.sell_order_id,
            t.price,
            t.qty
        ),
        Event::BookUpdate(b) => write!(
            out,
            "B,{},{},{},{}",
            b.symbol,
            b.side.as_char(),
            level(b.price),
            level(b.qty)
        ),
        Event::CancelAck(c) => write!(out, "X,{}{},{}", sym_prefix(&c.symbol), c.user_id, c.order_id),
    };
    out
}

/// Frame an arbitrary payload (server side of the wire, replay tools).
pub fn frame(payload: &[u8], framing: Framing) -> io::Result<Vec<u8>> {
    let mut dst = BytesMut::with_capacity(payload.len() + 4);
    put_frame(&mut length_codec(), payload, framing, &mut dst)?;
    Ok(dst.to_vec())
}

fn put_frame(frames: &mut LengthDelimitedCodec, payload: &[u8], framing: Framing, dst: &mut BytesMut) -> io::Result<()> {
    match framing {
        Framing::Line => {
            dst.reserve(payload.len() + 1);
            dst.put_slice(payload);
            dst.put_u8(b'\n');
            Ok(())
        }
        Framing::Framed => frames.encode(Bytes::copy_from_slice(payload), dst),
    }
}

/// 4-byte big-endian length prefix, capped at MAX_FRAME_SIZE.
pub fn length_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .big_endian()
        .length_field_length(4)
        .max_frame_length(MAX_FRAME_SIZE)
        .new_codec()
}

// ---------------------------------------------------------------------------
// Decode (payload level)
// ---------------------------------------------------------------------------

fn split_fields(line: &str) -> Vec<&str> {
    line.split(',').map(str::trim).collect()
}

fn expect_fields(kind: &'static str, parts: &[&str], expected: usize) -> Result<(), DecodeError> {
    if parts.len() != expected {
        return Err(DecodeError::FieldCount { kind, expected, got: parts.len() });
    }
    Ok(())
}

/// Unsigned decimal that fits in 32 bits. No sign, no spaces inside.
fn parse_u32(kind: &'static str, field: &'static str, s: &str) -> Result<u32, DecodeError> {
    let bad = || DecodeError::InvalidNumber { kind, field, value: s.to_string() };
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    s.parse::<u32>().map_err(|_| bad())
}

/// `-` = no resting interest.
fn parse_level(kind: &'static str, field: &'static str, s: &str) -> Result<u32, DecodeError> {
    if s == EMPTY_LEVEL {
        return Ok(0);
    }
    parse_u32(kind, field, s)
}

fn parse_side(kind: &'static str, s: &str) -> Result<Side, DecodeError> {
    Side::from_wire(s).ok_or_else(|| DecodeError::InvalidSide { kind, value: s.to_string() })
}

/// Splits off the optional symbol column. Returns (symbol, numeric fields).
fn symbol_and_rest<'a>(
    kind: &'static str,
    parts: &'a [&'a str],
    numeric: usize,
    symbols: SymbolFields,
) -> Result<(Option<String>, &'a [&'a str]), DecodeError> {
    match symbols {
        SymbolFields::Omit => {
            expect_fields(kind, parts, 1 + numeric)?;
            Ok((None, &parts[1..]))
        }
        SymbolFields::Include => {
            expect_fields(kind, parts, 2 + numeric)?;
            Ok((Some(parts[1].to_string()), &parts[2..]))
        }
    }
}

/// Decode one server message. `Ok(None)` for a blank line.
pub fn decode_line(line: &str, symbols: SymbolFields) -> Result<Option<Event>, DecodeError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let parts = split_fields(line);

    let ev = match parts[0] {
        "A" => {
            let kind = "ack";
            let (symbol, f) = symbol_and_rest(kind, &parts, 2, symbols)?;
            Event::Ack(Ack {
                user_id: parse_u32(kind, "user_id", f[0])?,
                order_id: parse_u32(kind, "order_id", f[1])?,
                symbol,
            })
        }
        "T" => {
            let kind = "trade";
            let (symbol, f) = symbol_and_rest(kind, &parts, 6, symbols)?;
            Event::Trade(Trade {
                buy_user_id: parse_u32(kind, "buy_user_id", f[0])?,
                buy_order_id: parse_u32(kind, "buy_order_id", f[1])?,
                sell_user_id: parse_u32(kind, "sell_user_id", f[2])?,
                sell_order_id: parse_u32(kind, "sell_order_id", f[3])?,
                price: parse_u32(kind, "price", f[4])?,
                qty: parse_u32(kind, "qty", f[5])?,
                symbol,
            })
        }
        "B" => {
            let kind = "book_update";
            expect_fields(kind, &parts, 5)?;
            Event::BookUpdate(BookUpdate {
                symbol: parts[1].to_string(),
                side: parse_side(kind, parts[2])?,
                price: parse_level(kind, "price", parts[3])?,
                qty: parse_level(kind, "qty", parts[4])?,
            })
        }
        // some servers echo cancel acks with the cancel tag
        "X" | "C" => {
            let kind = "cancel_ack";
            let (symbol, f) = symbol_and_rest(kind, &parts, 2, symbols)?;
            Event::CancelAck(CancelAck {
                user_id: parse_u32(kind, "user_id", f[0])?,
                order_id: parse_u32(kind, "order_id", f[1])?,
                symbol,
            })
        }
        other => return Err(DecodeError::UnknownType(other.to_string())),
    };
    Ok(Some(ev))
}

/// Decode one client command (the server's view of the wire).
pub fn parse_command(line: &str, symbols: SymbolFields) -> Result<Option<Command>, DecodeError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let parts = split_fields(line);

    let cmd = match parts[0] {
        "N" => {
            let kind = "new_order";
            expect_fields(kind, &parts, 7)?;
            Command::NewOrder(NewOrder {
                user_id: parse_u32(kind, "user_id", parts[1])?,
                symbol: parts[2].to_string(),
                price: parse_u32(kind, "price", parts[3])?,
                qty: parse_u32(kind, "qty", parts[4])?,
                side: parse_side(kind, parts[5])?,
                order_id: parse_u32(kind, "order_id", parts[6])?,
            })
        }
        "C" => {
            let kind = "cancel";
            let (symbol, f) = symbol_and_rest(kind, &parts, 2, symbols)?;
            Command::Cancel(CancelOrder {
                user_id: parse_u32(kind, "user_id", f[0])?,
                order_id: parse_u32(kind, "order_id", f[1])?,
                symbol,
            })
        }
        "F" => {
            expect_fields("flush", &parts, 1)?;
            Command::Flush
        }
        other => return Err(DecodeError::UnknownType(other.to_string())),
    };
    Ok(Some(cmd))
}

fn payload_str(bytes: &[u8]) -> Result<&str, DecodeError> {
    std::str::from_utf8(bytes).map_err(|_| DecodeError::Utf8)
}

fn check_frame_len(len: u32) -> Result<usize, DecodeError> {
    if len == 0 || len as usize > MAX_FRAME_SIZE {
        return Err(DecodeError::FrameLength(len));
    }
    Ok(len as usize)
}

fn decode_frame_payload(bytes: &[u8], symbols: SymbolFields) -> Result<Event, DecodeError> {
    decode_line(payload_str(bytes)?, symbols)?.ok_or(DecodeError::EmptyMessage)
}

// ---------------------------------------------------------------------------
// Decode (stream)
// ---------------------------------------------------------------------------

/// Codec for one link: encodes commands, decodes events. Used with
/// `FramedRead`/`FramedWrite` on TCP and directly on datagrams.
pub struct WireCodec {
    fmt: WireFormat,
    lines: LinesCodec,
    frames: LengthDelimitedCodec,
    // sisa byte dari frame yang ditolak (kebesaran), dibuang saat tiba
    skip: usize,
}

impl WireCodec {
    pub fn new(fmt: WireFormat) -> Self {
        Self {
            fmt,
            lines: LinesCodec::new_with_max_length(MAX_FRAME_SIZE),
            frames: length_codec(),
            skip: 0,
        }
    }

    fn next_line(&mut self, src: &mut BytesMut, eof: bool) -> Option<Result<Event, DecodeError>> {
        loop {
            let next = if eof { self.lines.decode_eof(src) } else { self.lines.decode(src) };
            let line = match next {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                // LinesCodec keeps discarding up to the next newline on its own
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    return Some(Err(DecodeError::LineTooLong { max: MAX_FRAME_SIZE }))
                }
                // no I/O happens inside the codec: this is a line that is not UTF-8
                Err(_) => return Some(Err(DecodeError::Utf8)),
            };
            match decode_line(&line, self.fmt.symbols) {
                Ok(Some(ev)) => return Some(Ok(ev)),
                Ok(None) => continue, // blank line
                Err(e) => return Some(Err(e)),
            }
        }
    }

    fn discard(&mut self, src: &mut BytesMut) {
        let n = self.skip.min(src.len());
        src.advance(n);
        self.skip -= n;
    }

    fn next_frame(&mut self, src: &mut BytesMut) -> io::Result<Option<Result<Event, DecodeError>>> {
        self.discard(src);
        if self.skip > 0 || src.len() < 4 {
            return Ok(None);
        }
        let declared = u32::from_be_bytes([src[0], src[1], src[2], src[3]]);
        let len = match check_frame_len(declared) {
            Ok(len) => len,
            Err(e) => {
                src.advance(4);
                self.skip = declared as usize;
                self.discard(src);
                return Ok(Some(Err(e)));
            }
        };
        // hand the length codec whole frames only, so it never sits mid-frame
        if src.len() < 4 + len {
            src.reserve(4 + len - src.len());
            return Ok(None);
        }
        Ok(self.frames.decode(src)?.map(|payload| decode_frame_payload(&payload, self.fmt.symbols)))
    }
}

impl Decoder for WireCodec {
    type Item = Result<Event, DecodeError>;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<Self::Item>> {
        match self.fmt.framing {
            Framing::Line => Ok(self.next_line(src, false)),
            Framing::Framed => self.next_frame(src),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> io::Result<Option<Self::Item>> {
        match self.fmt.framing {
            Framing::Line => Ok(self.next_line(src, true)),
            Framing::Framed => match self.next_frame(src)? {
                Some(item) => Ok(Some(item)),
                None if src.is_empty() && self.skip == 0 => Ok(None),
                None => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stream ended inside a frame")),
            },
        }
    }
}

impl<'a> Encoder<&'a Command> for WireCodec {
    type Error = io::Error;

    fn encode(&mut self, cmd: &'a Command, dst: &mut BytesMut) -> io::Result<()> {
        let payload = encode_payload(cmd, self.fmt.symbols);
        put_frame(&mut self.frames, payload.as_bytes(), self.fmt.framing, dst)
    }
}

/// Next event from a framed byte stream. `Ok(None)` = clean end of stream;
/// a stream that ends inside a frame is a transport error.
pub async fn read_event<R>(frames: &mut FramedRead<R, WireCodec>) -> Result<Option<Event>, ReadError>
where
    R: AsyncRead + Unpin,
{
    match frames.next().await {
        None => Ok(None),
        Some(Ok(item)) => Ok(Some(item?)),
        Some(Err(e)) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// Decode (datagram)
// ---------------------------------------------------------------------------

/// Every message carried by one datagram, in order. An incomplete frame ends
/// the datagram (the rest cannot be delimited).
pub fn decode_datagram(bytes: &[u8], fmt: WireFormat) -> Vec<Result<Event, DecodeError>> {
    let mut codec = WireCodec::new(fmt);
    let mut src = BytesMut::from(bytes);
    let mut out = Vec::new();
    loop {
        match codec.decode_eof(&mut src) {
            Ok(Some(item)) => out.push(item),
            Ok(None) => break,
            Err(_) => {
                if !src.is_empty() {
                    out.push(Err(DecodeError::FrameLength(declared_len(&src))));
                }
                break;
            }
        }
    }
    out
}

fn declared_len(src: &[u8]) -> u32 {
    match src.get(..4) {
        Some(h) => u32::from_be_bytes([h[0], h[1], h[2], h[3]]),
        None => src.len() as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn reader(input: &[u8], fmt: WireFormat) -> FramedRead<&[u8], WireCodec> {
        FramedRead::new(input, WireCodec::new(fmt))
    }

    fn framed(payload: &[u8]) -> Vec<u8> {
        frame(payload, Framing::Framed).unwrap()
    }

    fn ibm_order() -> NewOrder {
        NewOrder { user_id: 1, symbol: "IBM".into(), price: 100, qty: 50, side: Side::Buy, order_id: 1001 }
    }

    #[test]
    fn encodes_commands() {
        let o = Command::NewOrder(ibm_order());
        assert_eq!(encode_payload(&o, SymbolFields::Omit), "N,1,IBM,100,50,B,1001");

        let c = Command::Cancel(CancelOrder { user_id: 1, order_id: 1001, symbol: Some("IBM".into()) });
        assert_eq!(encode_payload(&c, SymbolFields::Omit), "C,1,1001");
        assert_eq!(encode_payload(&c, SymbolFields::Include), "C,IBM,1,1001");
        assert_eq!(encode_payload(&Command::Flush, SymbolFields::Omit), "F");

        assert_eq!(encode(&Command::Flush, WireFormat::line()), b"F\n".to_vec());
        assert_eq!(encode(&Command::Flush, WireFormat::framed()), vec![0, 0, 0, 1, b'F']);
    }

    #[test]
    fn oversize_payload_cannot_be_framed() {
        let big = vec![b'x'; MAX_FRAME_SIZE + 1];
        assert!(frame(&big, Framing::Framed).is_err());
        assert_eq!(framed(&big[..MAX_FRAME_SIZE]).len(), MAX_FRAME_SIZE + 4);
    }

    #[test]
    fn framed_length_is_big_endian() {
        let bytes = encode(&Command::NewOrder(ibm_order()), WireFormat::framed());
        let payload = b"N,1,IBM,100,50,B,1001";
        assert_eq!(&bytes[..4], &(payload.len() as u32).to_be_bytes());
        assert_eq!(&bytes[4..], payload);
    }

    #[test]
    fn new_order_roundtrip() {
        let cases = [
            ibm_order(),
            NewOrder { user_id: u32::MAX, symbol: "A".repeat(16), price: 0, qty: 1, side: Side::Sell, order_id: 0 },
            NewOrder { user_id: 0, symbol: "BRK.B".into(), price: u32::MAX, qty: u32::MAX, side: Side::Buy, order_id: u32::MAX },
        ];
        for o in cases {
            let cmd = Command::NewOrder(o);
            let line = encode_payload(&cmd, SymbolFields::Omit);
            assert_eq!(parse_command(&line, SymbolFields::Omit).unwrap(), Some(cmd));
        }
    }

    #[test]
    fn decodes_events_with_spaces() {
        assert_eq!(
            decode_line("A, 1, 1001", SymbolFields::Omit).unwrap(),
            Some(Event::Ack(Ack { user_id: 1, order_id: 1001, symbol: None }))
        );
        assert_eq!(
            decode_line("T, 1, 1001, 2, 2001, 150, 100", SymbolFields::Omit).unwrap(),
            Some(Event::Trade(Trade {
                buy_user_id: 1,
                buy_order_id: 1001,
                sell_user_id: 2,
                sell_order_id: 2001,
                price: 150,
                qty: 100,
                symbol: None,
            }))
        );
        assert_eq!(
            decode_line("B, AAPL, S, 175, 1000", SymbolFields::Omit).unwrap(),
            Some(Event::BookUpdate(BookUpdate { symbol: "AAPL".into(), side: Side::Sell, price: 175, qty: 1000 }))
        );
        assert_eq!(
            decode_line("X,2,2001", SymbolFields::Omit).unwrap(),
            Some(Event::CancelAck(CancelAck { user_id: 2, order_id: 2001, symbol: None }))
        );
    }

    #[test]
    fn decodes_symbol_variant() {
        assert_eq!(
            decode_line("A,IBM,1,1001", SymbolFields::Include).unwrap(),
            Some(Event::Ack(Ack { user_id: 1, order_id: 1001, symbol: Some("IBM".into()) }))
        );
        assert_eq!(
            decode_line("C,IBM,2,2001", SymbolFields::Include).unwrap(),
            Some(Event::CancelAck(CancelAck { user_id: 2, order_id: 2001, symbol: Some("IBM".into()) }))
        );
        // wrong variant -> field count
        assert!(matches!(
            decode_line("A,1,1001", SymbolFields::Include),
            Err(DecodeError::FieldCount { kind: "ack", expected: 4, got: 3 })
        ));
    }

    #[test]
    fn empty_book_marker() {
        let ev = decode_line("B,IBM,B,-,-", SymbolFields::Omit).unwrap().unwrap();
        match ev {
            Event::BookUpdate(b) => assert!(b.is_empty()),
            other => panic!("unexpected {other:?}"),
        }
        let b = BookUpdate { symbol: "IBM".into(), side: Side::Buy, price: 0, qty: 0 };
        assert_eq!(encode_event(&Event::BookUpdate(b), SymbolFields::Omit), "B,IBM,B,-,-");
    }

    #[test]
    fn rejects_malformed_payloads() {
        let omit = SymbolFields::Omit;
        assert_eq!(decode_line("Z,1,2", omit), Err(DecodeError::UnknownType("Z".into())));
        assert!(matches!(decode_line("A,1", omit), Err(DecodeError::FieldCount { .. })));
        assert!(matches!(decode_line("A,1,2,3", omit), Err(DecodeError::FieldCount { .. })));
        assert!(matches!(decode_line("A,abc,2", omit), Err(DecodeError::InvalidNumber { field: "user_id", .. })));
        assert!(matches!(decode_line("A,-1,2", omit), Err(DecodeError::InvalidNumber { .. })));
        assert!(matches!(decode_line("A,+1,2", omit), Err(DecodeError::InvalidNumber { .. })));
        assert!(matches!(
            decode_line("T,1,2,3,4,4294967296,1", omit),
            Err(DecodeError::InvalidNumber { field: "price", .. })
        ));
        assert!(decode_line("T,1,2,3,4,4294967295,1", omit).is_ok());
        assert!(matches!(decode_line("B,IBM,b,1,1", omit), Err(DecodeError::InvalidSide { .. })));
        assert!(matches!(decode_line("B,IBM,BUY,1,1", omit), Err(DecodeError::InvalidSide { .. })));
        // dash only allowed in book levels
        assert!(matches!(decode_line("A,-,2", omit), Err(DecodeError::InvalidNumber { .. })));
    }

    #[tokio::test]
    async fn line_stream_skips_blanks_and_resyncs() {
        let input: &[u8] = b"A,1,1001\n\n   \nZ,9,9\nA,x,1\nX,2,2001\n";
        let mut r = reader(input, WireFormat::line());

        assert!(matches!(read_event(&mut r).await, Ok(Some(Event::Ack(_)))));
        assert!(matches!(read_event(&mut r).await, Err(ReadError::Decode(DecodeError::UnknownType(_)))));
        assert!(matches!(read_event(&mut r).await, Err(ReadError::Decode(DecodeError::InvalidNumber { .. }))));
        assert!(matches!(read_event(&mut r).await, Ok(Some(Event::CancelAck(_)))));
        assert!(matches!(read_event(&mut r).await, Ok(None)));
    }

    #[tokio::test]
    async fn line_stream_drops_oversize_line() {
        let mut input = vec![b'A'; MAX_FRAME_SIZE + 10];
        input.extend_from_slice(b"\nA,1,2\nA,1,3");
        let mut r = reader(&input, WireFormat::line());

        assert!(matches!(read_event(&mut r).await, Err(ReadError::Decode(DecodeError::LineTooLong { .. }))));
        assert!(matches!(read_event(&mut r).await, Ok(Some(Event::Ack(Ack { order_id: 2, .. })))));
        // last line without a newline still decodes at end of stream
        assert!(matches!(read_event(&mut r).await, Ok(Some(Event::Ack(Ack { order_id: 3, .. })))));
        assert!(matches!(read_event(&mut r).await, Ok(None)));
    }

    #[tokio::test]
    async fn framed_stream_decodes_and_resyncs() {
        let mut input = Vec::new();
        input.extend(framed(b"A,1,1001"));
        input.extend(framed(b"Q,1"));
        input.extend(framed(b"X,2,2001\n"));
        let mut r = reader(&input, WireFormat::framed());

        assert!(matches!(read_event(&mut r).await, Ok(Some(Event::Ack(_)))));
        assert!(matches!(read_event(&mut r).await, Err(ReadError::Decode(DecodeError::UnknownType(_)))));
        assert!(matches!(read_event(&mut r).await, Ok(Some(Event::CancelAck(_)))));
        assert!(matches!(read_event(&mut r).await, Ok(None)));
    }

    #[tokio::test]
    async fn framed_stream_rejects_bad_lengths() {
        let fmt = WireFormat::framed();

        let mut zero = vec![0, 0, 0, 0];
        zero.extend(framed(b"A,1,1001"));
        let mut r = reader(&zero, fmt);
        assert!(matches!(read_event(&mut r).await, Err(ReadError::Decode(DecodeError::FrameLength(0)))));
        assert!(matches!(read_event(&mut r).await, Ok(Some(Event::Ack(_)))));

        let mut huge = ((MAX_FRAME_SIZE + 1) as u32).to_be_bytes().to_vec();
        huge.extend(std::iter::repeat(b'x').take(MAX_FRAME_SIZE + 1));
        huge.extend(framed(b"A,1,1001"));
        let mut r = reader(&huge, fmt);
        assert!(matches!(read_event(&mut r).await, Err(ReadError::Decode(DecodeError::FrameLength(_)))));
        assert!(matches!(read_event(&mut r).await, Ok(Some(Event::Ack(_)))));
        assert!(matches!(read_event(&mut r).await, Ok(None)));

        // truncated payload is a transport failure, not a clean EOF
        let truncated: &[u8] = &[0, 0, 0, 8, b'A', b','];
        let mut r = reader(truncated, fmt);
        assert!(matches!(read_event(&mut r).await, Err(ReadError::Transport(_))));
    }

    #[test]
    fn datagram_with_several_messages() {
        let out = decode_datagram(b"A,1,1001\nbogus\n\nX,2,2001\n", WireFormat::line());
        assert_eq!(out.len(), 3);
        assert!(matches!(out[0], Ok(Event::Ack(_))));
        assert!(out[1].is_err());
        assert!(matches!(out[2], Ok(Event::CancelAck(_))));

        let mut bytes = framed(b"A,1,1001");
        bytes.extend_from_slice(&[0, 0, 0, 50, b'X']);
        let out = decode_datagram(&bytes, WireFormat::framed());
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], Ok(Event::Ack(_))));
        assert_eq!(out[1], Err(DecodeError::FrameLength(50)));
    }
}
