//! Bridge between Databento's DBN format and the engine's record model.
//!
//! Converts `dbn::MboMsg` into [`MboRecord`]. The conversion copies only
//! the fields the book models dispatch on and is type-safe: unknown action
//! or side bytes surface as typed errors rather than silent misreads.

use crate::error::{BookError, Result};
use crate::types::{Action, MboRecord, RecordFlags, Side};

/// Convert a DBN MBO message to the engine's record type.
///
/// # Errors
///
/// [`BookError::InvalidAction`] / [`BookError::InvalidSide`] when the
/// message carries a byte outside the enumerated sets.
#[inline]
pub fn to_record(msg: &dbn::MboMsg) -> Result<MboRecord> {
    let action = convert_action(msg.action as u8)?;
    let side = convert_side(msg.side as u8)?;

    Ok(MboRecord {
        publisher_id: msg.hd.publisher_id,
        instrument_id: msg.hd.instrument_id,
        order_id: msg.order_id,
        price: msg.price,
        size: msg.size,
        side,
        action,
        ts_recv: msg.ts_recv as i64,
        flags: RecordFlags::from_raw(msg.flags.raw()),
    })
}

/// Map a DBN action character onto [`Action`].
#[inline]
fn convert_action(action: u8) -> Result<Action> {
    Action::from_byte(action).ok_or(BookError::InvalidAction(action))
}

/// Map a DBN side character onto [`Side`]. `'S'` (sell) normalizes to Ask.
#[inline]
fn convert_side(side: u8) -> Result<Side> {
    Side::from_byte(side).ok_or(BookError::InvalidSide(side))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_msg() -> dbn::MboMsg {
        dbn::MboMsg {
            hd: dbn::RecordHeader::new::<dbn::MboMsg>(
                dbn::rtype::MBO,
                2,                      // publisher_id
                7,                      // instrument_id
                1234567890_000_000_000, // ts_event
            ),
            order_id: 12345,
            price: 100_000_000_000,
            size: 100,
            flags: dbn::FlagSet::empty(),
            channel_id: 0,
            action: b'A' as i8,
            side: b'B' as i8,
            ts_recv: 1234567890_000_000_123,
            ts_in_delta: 0,
            sequence: 0,
        }
    }

    #[test]
    fn test_convert_basic_fields() {
        let rec = to_record(&test_msg()).unwrap();

        assert_eq!(rec.publisher_id, 2);
        assert_eq!(rec.instrument_id, 7);
        assert_eq!(rec.order_id, 12345);
        assert_eq!(rec.price, 100_000_000_000);
        assert_eq!(rec.size, 100);
        assert_eq!(rec.action, Action::Add);
        assert_eq!(rec.side, Side::Bid);
        assert_eq!(rec.ts_recv, 1234567890_000_000_123);
        assert!(!rec.flags.is_tob());
    }

    #[test]
    fn test_convert_all_actions() {
        for (byte, expected) in [
            (b'A', Action::Add),
            (b'M', Action::Modify),
            (b'C', Action::Cancel),
            (b'F', Action::Fill),
            (b'T', Action::Trade),
            (b'R', Action::Clear),
            (b'N', Action::None),
        ] {
            let mut msg = test_msg();
            msg.action = byte as i8;
            assert_eq!(to_record(&msg).unwrap().action, expected);
        }
    }

    #[test]
    fn test_convert_sell_normalizes_to_ask() {
        let mut msg = test_msg();
        msg.side = b'S' as i8;
        assert_eq!(to_record(&msg).unwrap().side, Side::Ask);
    }

    #[test]
    fn test_invalid_action_and_side() {
        let mut msg = test_msg();
        msg.action = b'X' as i8;
        assert!(matches!(to_record(&msg), Err(BookError::InvalidAction(_))));

        let mut msg = test_msg();
        msg.side = b'Q' as i8;
        assert!(matches!(to_record(&msg), Err(BookError::InvalidSide(_))));
    }

    #[test]
    fn test_tob_flag_carried_over() {
        let mut msg = test_msg();
        msg.flags = dbn::FlagSet::empty().set_tob();
        let rec = to_record(&msg).unwrap();
        assert!(rec.flags.is_tob());
    }
}
