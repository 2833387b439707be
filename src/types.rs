//! Core data types for normalized MBO records.
//!
//! These types are designed to be:
//! - Memory efficient (fixed-size fields, `Copy` records)
//! - Compatible with Databento's MBO wire format
//! - Decoder-agnostic: the engine only ever sees `MboRecord`

use serde::{Deserialize, Serialize};

/// Sentinel marking the absence of a defined price.
///
/// Supplied by the decoder (Databento's `UNDEF_PRICE`). The engine treats it
/// symbolically and never does arithmetic on it; JSON rendering maps it to
/// `null`.
pub const UNDEF_PRICE: i64 = i64::MAX;

/// MBO action type (what happened to the order)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Action {
    /// Add new order to book
    Add = b'A',
    /// Modify existing order
    Modify = b'M',
    /// Cancel order (full or partial, by size)
    Cancel = b'C',
    /// Fill against a resting order
    Fill = b'F',
    /// Trade report
    Trade = b'T',
    /// Clear one side of a book
    Clear = b'R',
    /// Non-action (heartbeats, status)
    None = b'N',
}

impl Action {
    /// Parse action from a byte (Databento format).
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'A' => Some(Action::Add),
            b'M' => Some(Action::Modify),
            b'C' => Some(Action::Cancel),
            b'F' => Some(Action::Fill),
            b'T' => Some(Action::Trade),
            b'R' => Some(Action::Clear),
            b'N' => Some(Action::None),
            _ => None,
        }
    }

    /// Convert to byte representation.
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// Order side (bid or ask)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Side {
    /// Buy order (bid)
    Bid = b'B',
    /// Sell order (ask)
    Ask = b'A',
    /// Non-directional (used for some trade and clear records)
    None = b'N',
}

impl Side {
    /// Parse side from a byte. `'S'` (sell) is normalized to `Ask`.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'B' => Some(Side::Bid),
            b'A' | b'S' => Some(Side::Ask),
            b'N' => Some(Side::None),
            _ => None,
        }
    }

    /// Convert to byte representation.
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Check if this is a bid.
    #[inline(always)]
    pub fn is_bid(self) -> bool {
        matches!(self, Side::Bid)
    }

    /// Check if this is an ask.
    #[inline(always)]
    pub fn is_ask(self) -> bool {
        matches!(self, Side::Ask)
    }
}

/// Record flag bit-set (Databento `flags` byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordFlags(u8);

impl RecordFlags {
    /// Marks a synthetic top-of-book echo. Such records contribute to level
    /// size but are excluded from displayed order counts.
    pub const TOB: u8 = 1 << 6;

    /// Construct from a raw flags byte.
    #[inline]
    pub fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    /// Empty flag set.
    #[inline]
    pub fn empty() -> Self {
        Self(0)
    }

    /// Flag set with only the TOB bit.
    #[inline]
    pub fn tob() -> Self {
        Self(Self::TOB)
    }

    /// Raw flags byte.
    #[inline]
    pub fn raw(self) -> u8 {
        self.0
    }

    /// Whether the TOB bit is set.
    #[inline]
    pub fn is_tob(self) -> bool {
        self.0 & Self::TOB != 0
    }
}

/// Normalized Market By Order (MBO) record.
///
/// One order-lifecycle event as produced by the decoder adapter. All fields
/// use fixed-size types; prices are fixed-point with a 1e9 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MboRecord {
    /// Upstream venue / feed identifier
    pub publisher_id: u16,

    /// Instrument identifier
    pub instrument_id: u32,

    /// Unique order identifier
    pub order_id: u64,

    /// Price in fixed-point format (divide by 1e9 for dollars), or
    /// [`UNDEF_PRICE`]
    pub price: i64,

    /// Order size in shares/contracts
    pub size: u32,

    /// Order side
    pub side: Side,

    /// Record action
    pub action: Action,

    /// Receive timestamp (nanoseconds since epoch)
    pub ts_recv: i64,

    /// Record flags
    pub flags: RecordFlags,
}

impl MboRecord {
    /// Create a new record with the fields the book models dispatch on.
    /// Publisher/instrument default to 0 and can be set with the builders.
    pub fn new(order_id: u64, action: Action, side: Side, price: i64, size: u32) -> Self {
        Self {
            publisher_id: 0,
            instrument_id: 0,
            order_id,
            price,
            size,
            side,
            action,
            ts_recv: 0,
            flags: RecordFlags::empty(),
        }
    }

    /// Set the publisher id.
    pub fn with_publisher(mut self, publisher_id: u16) -> Self {
        self.publisher_id = publisher_id;
        self
    }

    /// Set the instrument id.
    pub fn with_instrument(mut self, instrument_id: u32) -> Self {
        self.instrument_id = instrument_id;
        self
    }

    /// Set the receive timestamp.
    pub fn with_ts_recv(mut self, ts_recv: i64) -> Self {
        self.ts_recv = ts_recv;
        self
    }

    /// Set the record flags.
    pub fn with_flags(mut self, flags: RecordFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Whether the price field carries a defined value.
    #[inline]
    pub fn has_price(&self) -> bool {
        self.price != UNDEF_PRICE
    }

    /// Get price as floating point dollars. Undefined prices yield `None`.
    #[inline]
    pub fn price_as_f64(&self) -> Option<f64> {
        self.has_price().then(|| self.price as f64 / 1e9)
    }
}

/// JSON price rendering: `null` for [`UNDEF_PRICE`], otherwise the decimal
/// value (price / 1e9) rounded to two places.
pub fn price_to_json(price: i64) -> serde_json::Value {
    if price == UNDEF_PRICE {
        serde_json::Value::Null
    } else {
        let dollars = (price as f64 / 1e9 * 100.0).round() / 100.0;
        serde_json::Number::from_f64(dollars)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}
