use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;

use crate::model::*;

use super::conflict::{check_no_conflict, now_ms, validate_span};
use super::{name_key, Change, Engine, EngineError};

impl Engine {
    pub async fn add_room(&self, new_room: NewRoom) -> Result<Room, EngineError> {
        if new_room.capacity == 0 {
            return Err(EngineError::InvalidCapacity(0));
        }
        // The entry API makes the uniqueness check and the claim one
        // atomic step; the id is only burned once the claim holds.
        let key = name_key(&new_room.name);
        let id = match self.names.entry(key.clone()) {
            Entry::Occupied(_) => return Err(EngineError::DuplicateName(new_room.name)),
            Entry::Vacant(vacant) => {
                let id = self.allocate_room_id();
                vacant.insert(id);
                id
            }
        };

        let room = Room {
            id,
            name: new_room.name,
            capacity: new_room.capacity,
            location: new_room.location,
            features: new_room.features,
            status: new_room.status,
            created_at: now_ms(),
        };

        if let Err(e) = self.persist(vec![Change::PutRoom(room.clone())]).await {
            self.names.remove(&key);
            return Err(e);
        }

        self.rooms
            .insert(id, Arc::new(RwLock::new(RoomState::new(room.clone()))));
        metrics::gauge!(crate::observability::ROOMS_REGISTERED).increment(1.0);
        tracing::debug!(room = %id, name = %room.name, "room added");
        Ok(room)
    }

    /// Partial update; id and created_at are immutable. Renames re-check
    /// uniqueness; changing only the letter case of a room's own name is
    /// allowed.
    pub async fn update_room(&self, room_id: RoomId, patch: RoomPatch) -> Result<Room, EngineError> {
        if patch.capacity == Some(0) {
            return Err(EngineError::InvalidCapacity(0));
        }
        let rs = self
            .room_handle(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let mut guard = rs.write().await;
        // The room may have been removed while we waited for the lock.
        if !self.rooms.contains_key(&room_id) {
            return Err(EngineError::RoomNotFound(room_id));
        }

        let mut updated = guard.room.clone();
        if let Some(name) = patch.name {
            updated.name = name;
        }
        if let Some(capacity) = patch.capacity {
            updated.capacity = capacity;
        }
        if let Some(location) = patch.location {
            updated.location = Some(location);
        }
        if let Some(features) = patch.features {
            updated.features = features;
        }
        if let Some(status) = patch.status {
            updated.status = status;
        }

        let old_key = name_key(&guard.room.name);
        let new_key = name_key(&updated.name);
        let claimed = if new_key != old_key {
            // A different key can only be occupied by another room.
            match self.names.entry(new_key.clone()) {
                Entry::Occupied(_) => return Err(EngineError::DuplicateName(updated.name)),
                Entry::Vacant(vacant) => {
                    vacant.insert(room_id);
                    true
                }
            }
        } else {
            false
        };

        if let Err(e) = self.persist(vec![Change::PutRoom(updated.clone())]).await {
            if claimed {
                self.names.remove(&new_key);
            }
            return Err(e);
        }
        if claimed {
            self.names.remove(&old_key);
        }
        guard.room = updated.clone();
        tracing::debug!(room = %room_id, "room updated");
        Ok(updated)
    }

    /// Remove a room, cancelling its active reservations in the same
    /// commit. History, including the freshly cancelled records, survives;
    /// the id is never reassigned.
    pub async fn remove_room(&self, room_id: RoomId) -> Result<(), EngineError> {
        let rs = self
            .room_handle(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let mut guard = rs.write().await;
        if !self.rooms.contains_key(&room_id) {
            return Err(EngineError::RoomNotFound(room_id));
        }

        let mut changes = vec![Change::DeleteRoom(room_id)];
        let mut cancelled_ids = Vec::with_capacity(guard.slots.len());
        for slot in &guard.slots {
            if let Some(mut record) = self
                .archive
                .get(&slot.reservation_id)
                .map(|e| e.value().clone())
            {
                record.status = ReservationStatus::Cancelled;
                cancelled_ids.push(record.id);
                changes.push(Change::PutReservation(record));
            }
        }

        self.persist(changes).await?;

        for id in &cancelled_ids {
            if let Some(mut entry) = self.archive.get_mut(id) {
                entry.status = ReservationStatus::Cancelled;
            }
        }
        guard.slots.clear();
        self.names.remove(&name_key(&guard.room.name));
        self.rooms.remove(&room_id);
        metrics::gauge!(crate::observability::ROOMS_REGISTERED).decrement(1.0);
        tracing::debug!(room = %room_id, cancelled = cancelled_ids.len(), "room removed");
        drop(guard);

        // The removal is committed; artifact cleanup is best-effort.
        for id in cancelled_ids {
            if let Err(e) = self.codec.invalidate(id).await {
                tracing::warn!(reservation = %id, "pass invalidation failed: {e}");
            }
        }
        Ok(())
    }

    /// Check-and-create, atomic per room: the overlap check and the
    /// insertion happen under the room's write lock, and the record is
    /// durable before it becomes visible.
    pub async fn reserve(
        &self,
        room_id: RoomId,
        owner: String,
        span: Span,
    ) -> Result<Reservation, EngineError> {
        validate_span(&span)?;
        let rs = self
            .room_handle(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let mut guard = rs.write().await;
        if !self.rooms.contains_key(&room_id) {
            return Err(EngineError::RoomNotFound(room_id));
        }
        if let Err(e) = check_no_conflict(&guard, &span) {
            metrics::counter!(crate::observability::RESERVE_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let reservation = Reservation {
            id: self.allocate_reservation_id(),
            room_id,
            owner,
            span,
            status: ReservationStatus::Active,
            created_at: now_ms(),
        };

        self.persist(vec![Change::PutReservation(reservation.clone())])
            .await?;
        guard.insert_slot(Slot {
            reservation_id: reservation.id,
            span,
        });
        self.archive.insert(reservation.id, reservation.clone());
        let room = guard.room.clone();
        drop(guard);

        metrics::counter!(crate::observability::RESERVATIONS_TOTAL).increment(1);
        tracing::debug!(
            reservation = %reservation.id,
            room = %room_id,
            owner = %reservation.owner,
            "reservation created"
        );

        // The reservation is committed; pass generation is best-effort.
        if let Err(e) = self.codec.encode(&reservation, &room).await {
            tracing::warn!(reservation = %reservation.id, "pass generation failed: {e}");
        }
        Ok(reservation)
    }

    /// Check order: unknown id, then ownership, then already-cancelled.
    /// Admins bypass the ownership check only.
    pub async fn cancel(
        &self,
        reservation_id: ReservationId,
        requester: &str,
        as_admin: bool,
    ) -> Result<(), EngineError> {
        let record = self
            .archive
            .get(&reservation_id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::ReservationNotFound(reservation_id))?;
        // Owner never changes, so this check needs no lock.
        if !as_admin && record.owner != requester {
            return Err(EngineError::Forbidden(reservation_id));
        }

        let Some(rs) = self.room_handle(&record.room_id) else {
            // Rooms are only removed after cancelling their reservations,
            // so a missing room means this record is already done.
            return Err(EngineError::AlreadyCancelled(reservation_id));
        };
        let mut guard = rs.write().await;
        // Re-read under the lock; a concurrent cancel may have won.
        let mut record = self
            .archive
            .get(&reservation_id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::ReservationNotFound(reservation_id))?;
        if !record.is_active() {
            return Err(EngineError::AlreadyCancelled(reservation_id));
        }
        record.status = ReservationStatus::Cancelled;

        self.persist(vec![Change::PutReservation(record.clone())])
            .await?;
        guard.remove_slot(reservation_id);
        self.archive.insert(reservation_id, record);
        drop(guard);

        metrics::counter!(crate::observability::CANCELLATIONS_TOTAL).increment(1);
        tracing::debug!(reservation = %reservation_id, as_admin, "reservation cancelled");

        // The cancel is committed; artifact cleanup is best-effort.
        if let Err(e) = self.codec.invalidate(reservation_id).await {
            tracing::warn!(reservation = %reservation_id, "pass invalidation failed: {e}");
        }
        Ok(())
    }
}
