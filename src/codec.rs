use std::fs;
use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{Ms, Reservation, ReservationId, Room, RoomId, Span};

/// The displayable content of a reservation pass. This is what gets
/// rasterized into a scannable code by the presentation layer; the codec
/// itself deals only in payload bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassPayload {
    pub reservation_id: ReservationId,
    pub room_id: RoomId,
    pub room_name: String,
    pub owner: String,
    pub start: Ms,
    pub end: Ms,
}

impl PassPayload {
    pub fn for_reservation(reservation: &Reservation, room: &Room) -> Self {
        debug_assert_eq!(reservation.room_id, room.id);
        Self {
            reservation_id: reservation.id,
            room_id: room.id,
            room_name: room.name.clone(),
            owner: reservation.owner.clone(),
            start: reservation.span.start,
            end: reservation.span.end,
        }
    }

    pub fn span(&self) -> Span {
        Span::new(self.start, self.end)
    }
}

#[derive(Debug)]
pub enum CodecError {
    /// Bytes do not decode to a complete, well-formed payload.
    Malformed(String),
    /// Artifact cache I/O failed.
    Io(io::Error),
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::Malformed(detail) => write!(f, "malformed pass payload: {detail}"),
            CodecError::Io(e) => write!(f, "pass artifact I/O error: {e}"),
        }
    }
}

impl std::error::Error for CodecError {}

impl From<io::Error> for CodecError {
    fn from(e: io::Error) -> Self {
        CodecError::Io(e)
    }
}

fn parse_payload(bytes: &[u8]) -> Result<PassPayload, CodecError> {
    let payload: PassPayload =
        serde_json::from_slice(bytes).map_err(|e| CodecError::Malformed(e.to_string()))?;
    if payload.start >= payload.end {
        return Err(CodecError::Malformed(format!(
            "interval [{}, {}) is empty",
            payload.start, payload.end
        )));
    }
    Ok(payload)
}

/// Turns reservations into pass payloads and back, and discards cached
/// artifacts when a reservation dies. The engine calls `encode` after a
/// reserve commits and `invalidate` after a cancel; both are best-effort
/// and never roll back the booking itself.
#[async_trait]
pub trait Codec: Send + Sync {
    async fn encode(&self, reservation: &Reservation, room: &Room) -> Result<Vec<u8>, CodecError>;

    async fn decode(&self, bytes: &[u8]) -> Result<PassPayload, CodecError>;

    /// Drop any cached artifact for this reservation. Idempotent.
    async fn invalidate(&self, reservation_id: ReservationId) -> Result<(), CodecError>;
}

/// JSON payloads cached as one file per reservation under `dir`.
pub struct JsonCodec {
    dir: PathBuf,
}

impl JsonCodec {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn artifact_path(&self, reservation_id: ReservationId) -> PathBuf {
        self.dir.join(format!("pass_{reservation_id}.json"))
    }
}

#[async_trait]
impl Codec for JsonCodec {
    async fn encode(&self, reservation: &Reservation, room: &Room) -> Result<Vec<u8>, CodecError> {
        let payload = PassPayload::for_reservation(reservation, room);
        let bytes = serde_json::to_vec(&payload)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::create_dir_all(&self.dir)?;
        fs::write(self.artifact_path(reservation.id), &bytes)?;
        Ok(bytes)
    }

    async fn decode(&self, bytes: &[u8]) -> Result<PassPayload, CodecError> {
        parse_payload(bytes)
    }

    async fn invalidate(&self, reservation_id: ReservationId) -> Result<(), CodecError> {
        match fs::remove_file(self.artifact_path(reservation_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Cacheless codec for tests and wiring that doesn't need artifacts.
#[derive(Default)]
pub struct NoopCodec;

#[async_trait]
impl Codec for NoopCodec {
    async fn encode(&self, reservation: &Reservation, room: &Room) -> Result<Vec<u8>, CodecError> {
        let payload = PassPayload::for_reservation(reservation, room);
        serde_json::to_vec(&payload)
            .map_err(|e| CodecError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
    }

    async fn decode(&self, bytes: &[u8]) -> Result<PassPayload, CodecError> {
        parse_payload(bytes)
    }

    async fn invalidate(&self, _reservation_id: ReservationId) -> Result<(), CodecError> {
        Ok(())
    }
}
