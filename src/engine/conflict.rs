use crate::model::*;

use super::error::ConflictSource;
use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    if span.start >= span.end {
        return Err(EngineError::InvalidInterval {
            start: span.start,
            end: span.end,
        });
    }
    Ok(())
}

/// A room hosts one meeting at a time regardless of seat count, so any
/// overlapping active slot is a conflict. Disabled rooms conflict outright.
pub(crate) fn check_no_conflict(rs: &RoomState, span: &Span) -> Result<(), EngineError> {
    if !rs.room.is_available() {
        return Err(EngineError::Conflict(ConflictSource::Disabled(rs.room.id)));
    }
    if let Some(slot) = rs.overlapping(span).next() {
        return Err(EngineError::Conflict(ConflictSource::Reservation(
            slot.reservation_id,
        )));
    }
    Ok(())
}
