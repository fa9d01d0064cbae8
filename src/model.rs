use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Unix milliseconds, the only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// Numeric room identifier. Assigned once, never reused after removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Numeric reservation identifier. Monotonic, never reused, not even
/// after cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(pub u64);

impl std::fmt::Display for ReservationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Well-known feature flags. The set is open; any string is a valid flag.
pub mod features {
    pub const PROJECTOR: &str = "projector";
    pub const DIGITAL_BOARD: &str = "digital-board";
    pub const ACCESSIBLE: &str = "accessible";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Available,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    /// Unique case-insensitively across all rooms.
    pub name: String,
    /// Seats; always positive.
    pub capacity: u32,
    pub location: Option<String>,
    pub features: BTreeSet<String>,
    pub status: RoomStatus,
    pub created_at: Ms,
}

impl Room {
    pub fn is_available(&self) -> bool {
        self.status == RoomStatus::Available
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Active,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub room_id: RoomId,
    /// Opaque requester identifier (e.g. email).
    pub owner: String,
    pub span: Span,
    pub status: ReservationStatus,
    pub created_at: Ms,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }
}

/// One active reservation's claim on a room's calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub reservation_id: ReservationId,
    pub span: Span,
}

/// Per-room mutable state: the room record plus its active slots.
/// Cancelled reservations live only in the engine's archive.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub room: Room,
    /// Active slots, sorted by `span.start`.
    pub slots: Vec<Slot>,
}

impl RoomState {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            slots: Vec::new(),
        }
    }

    /// Insert a slot maintaining sort order by span.start.
    pub fn insert_slot(&mut self, slot: Slot) {
        let pos = self
            .slots
            .binary_search_by_key(&slot.span.start, |s| s.span.start)
            .unwrap_or_else(|e| e);
        self.slots.insert(pos, slot);
    }

    /// Remove the slot belonging to a reservation.
    pub fn remove_slot(&mut self, reservation_id: ReservationId) -> Option<Slot> {
        if let Some(pos) = self
            .slots
            .iter()
            .position(|s| s.reservation_id == reservation_id)
        {
            Some(self.slots.remove(pos))
        } else {
            None
        }
    }

    /// Return only slots whose span overlaps the query window.
    /// Uses binary search to skip slots starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Slot> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self.slots.partition_point(|s| s.span.start < query.end);
        self.slots[..right_bound]
            .iter()
            .filter(move |s| s.span.end > query.start)
    }
}

/// Static search filters. Defaults mean "no constraint".
#[derive(Debug, Clone, Default)]
pub struct SearchCriteria {
    pub min_capacity: u32,
    pub features: BTreeSet<String>,
}

impl SearchCriteria {
    /// Room passes the static filters: available, big enough, has every
    /// required feature. Time overlap is checked separately.
    pub fn admits(&self, room: &Room) -> bool {
        room.is_available()
            && room.capacity >= self.min_capacity
            && self.features.iter().all(|f| room.features.contains(f))
    }
}

/// Input for `add_room`.
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub name: String,
    pub capacity: u32,
    pub location: Option<String>,
    pub features: BTreeSet<String>,
    pub status: RoomStatus,
}

/// Partial update for `update_room`. `None` fields are left untouched;
/// id and created_at are immutable.
#[derive(Debug, Clone, Default)]
pub struct RoomPatch {
    pub name: Option<String>,
    pub capacity: Option<u32>,
    pub location: Option<String>,
    pub features: Option<BTreeSet<String>>,
    pub status: Option<RoomStatus>,
}

// ── Query result types ───────────────────────────────────────────

/// Active-reservation count for one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomUsage {
    pub room_id: RoomId,
    pub name: String,
    pub active: usize,
}

/// Aggregate over current state: overall totals plus the per-room
/// ranking (count descending, then room id ascending).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageReport {
    pub total_reservations: usize,
    pub active_reservations: usize,
    pub rooms: Vec<RoomUsage>,
}
