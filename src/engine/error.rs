use crate::model::{Ms, ReservationId, RoomId};

/// What a reserve attempt collided with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictSource {
    /// The room is administratively disabled.
    Disabled(RoomId),
    /// An active reservation already covers part of the requested interval.
    Reservation(ReservationId),
}

#[derive(Debug)]
pub enum EngineError {
    RoomNotFound(RoomId),
    ReservationNotFound(ReservationId),
    InvalidInterval { start: Ms, end: Ms },
    Conflict(ConflictSource),
    Forbidden(ReservationId),
    AlreadyCancelled(ReservationId),
    DuplicateName(String),
    InvalidCapacity(u32),
    Persistence(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::RoomNotFound(id) => write!(f, "room not found: {id}"),
            EngineError::ReservationNotFound(id) => write!(f, "reservation not found: {id}"),
            EngineError::InvalidInterval { start, end } => {
                write!(f, "invalid interval [{start}, {end}): start must be before end")
            }
            EngineError::Conflict(ConflictSource::Disabled(id)) => {
                write!(f, "room {id} is disabled")
            }
            EngineError::Conflict(ConflictSource::Reservation(id)) => {
                write!(f, "conflict with active reservation {id}")
            }
            EngineError::Forbidden(id) => {
                write!(f, "reservation {id} belongs to another owner")
            }
            EngineError::AlreadyCancelled(id) => {
                write!(f, "reservation {id} is already cancelled")
            }
            EngineError::DuplicateName(name) => {
                write!(f, "room name already taken: {name}")
            }
            EngineError::InvalidCapacity(capacity) => {
                write!(f, "capacity must be positive, got {capacity}")
            }
            EngineError::Persistence(e) => write!(f, "persistence failure: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
