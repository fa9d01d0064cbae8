use crate::model::*;

use super::conflict::validate_span;
use super::{Engine, EngineError};

impl Engine {
    /// Rooms that pass the static filters and have no active reservation
    /// overlapping `span`. Deterministic order: room id ascending.
    pub async fn search(
        &self,
        criteria: &SearchCriteria,
        span: Span,
    ) -> Result<Vec<Room>, EngineError> {
        validate_span(&span)?;
        metrics::counter!(crate::observability::SEARCHES_TOTAL).increment(1);

        let mut ids: Vec<RoomId> = self.rooms.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();

        let mut rooms = Vec::new();
        for id in ids {
            let Some(rs) = self.room_handle(&id) else {
                continue;
            };
            let guard = rs.read().await;
            if criteria.admits(&guard.room) && guard.overlapping(&span).next().is_none() {
                rooms.push(guard.room.clone());
            }
        }
        Ok(rooms)
    }

    pub async fn get_room(&self, room_id: RoomId) -> Result<Room, EngineError> {
        let rs = self
            .room_handle(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let guard = rs.read().await;
        Ok(guard.room.clone())
    }

    /// Every registered room, disabled ones included, id ascending.
    pub async fn list_rooms(&self) -> Vec<Room> {
        let mut ids: Vec<RoomId> = self.rooms.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();

        let mut rooms = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(rs) = self.room_handle(&id) else {
                continue;
            };
            rooms.push(rs.read().await.room.clone());
        }
        rooms
    }

    pub fn get_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Reservation, EngineError> {
        self.archive
            .get(&reservation_id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::ReservationNotFound(reservation_id))
    }

    /// One owner's reservations, cancelled ones included, id ascending.
    pub fn list_for_owner(&self, owner: &str) -> Vec<Reservation> {
        let mut out: Vec<Reservation> = self
            .archive
            .iter()
            .filter(|e| e.value().owner == owner)
            .map(|e| e.value().clone())
            .collect();
        out.sort_unstable_by_key(|r| r.id);
        out
    }

    /// Every reservation ever made, id ascending.
    pub fn list_all(&self) -> Vec<Reservation> {
        let mut out: Vec<Reservation> = self.archive.iter().map(|e| e.value().clone()).collect();
        out.sort_unstable_by_key(|r| r.id);
        out
    }

    /// Active counts for every registered room, zero-count rooms included,
    /// ordered most-reserved first with room id as the tie break.
    pub async fn usage_statistics(&self) -> UsageReport {
        let total_reservations = self.archive.len();
        let active_reservations = self
            .archive
            .iter()
            .filter(|e| e.value().is_active())
            .count();

        let mut ids: Vec<RoomId> = self.rooms.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        let mut rooms = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(rs) = self.room_handle(&id) else {
                continue;
            };
            let guard = rs.read().await;
            rooms.push(RoomUsage {
                room_id: id,
                name: guard.room.name.clone(),
                active: guard.slots.len(),
            });
        }
        rooms.sort_by(|a, b| b.active.cmp(&a.active).then(a.room_id.cmp(&b.room_id)));

        UsageReport {
            total_reservations,
            active_reservations,
            rooms,
        }
    }
}
