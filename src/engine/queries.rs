use uuid::Uuid;

use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    pub async fn get_booking(&self, booking_id: Uuid) -> Result<Booking, EngineError> {
        let room_id = self
            .store
            .room_of_booking(&booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        let rs = self
            .store
            .room(&room_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        let guard = rs.read().await;
        guard
            .booking(booking_id)
            .cloned()
            .ok_or(EngineError::BookingNotFound(booking_id))
    }

    pub async fn get_room(&self, room_id: Uuid) -> Result<Room, EngineError> {
        let rs = self
            .store
            .room(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let guard = rs.read().await;
        Ok(guard.room.clone())
    }

    pub async fn list_rooms(&self) -> Vec<Room> {
        let mut rooms = Vec::with_capacity(self.store.room_count());
        for room_id in self.store.room_ids() {
            if let Some(rs) = self.store.room(&room_id) {
                rooms.push(rs.read().await.room.clone());
            }
        }
        rooms.sort_by(|a, b| a.name.cmp(&b.name));
        rooms
    }

    /// The user-facing schedule of a room: live and once-live rows
    /// (Pending/Confirmed/Expired), ordered by start. An unknown room is an
    /// empty schedule.
    pub async fn room_schedule(&self, room_id: Uuid) -> Vec<Booking> {
        let Some(rs) = self.store.room(&room_id) else {
            return Vec::new();
        };
        let guard = rs.read().await;
        guard
            .bookings
            .iter()
            .filter(|b| {
                matches!(
                    b.status,
                    BookingStatus::Pending | BookingStatus::Confirmed | BookingStatus::Expired
                )
            })
            .cloned()
            .collect()
    }

    /// Every booking on a room, any status, ordered by start.
    pub async fn admin_list_bookings(&self, room_id: Uuid) -> Vec<Booking> {
        let Some(rs) = self.store.room(&room_id) else {
            return Vec::new();
        };
        let guard = rs.read().await;
        guard.bookings.clone()
    }

    pub async fn bookings_by_user(&self, user_id: Uuid) -> Vec<Booking> {
        let mut out = Vec::new();
        for room_id in self.store.room_ids() {
            let Some(rs) = self.store.room(&room_id) else {
                continue;
            };
            let guard = rs.read().await;
            out.extend(
                guard
                    .bookings
                    .iter()
                    .filter(|b| b.user_id == user_id)
                    .cloned(),
            );
        }
        out.sort_by_key(|b| (b.slot.start, b.id));
        out
    }

    /// Rooms that hold at least `min_capacity` people and have no Confirmed
    /// booking overlapping the window, ordered by (capacity, name): the
    /// smallest fitting room first.
    pub async fn search_available_rooms(
        &self,
        start: Ms,
        end: Ms,
        min_capacity: u32,
    ) -> Result<Vec<Room>, EngineError> {
        if start >= end {
            return Err(EngineError::InvalidInterval);
        }
        let range = TimeRange::new(start, end);

        let mut rooms = Vec::new();
        for room_id in self.store.room_ids() {
            let Some(rs) = self.store.room(&room_id) else {
                continue;
            };
            let guard = rs.read().await;
            if guard.room.capacity < min_capacity {
                continue;
            }
            if guard.conflicting(&range, None) == 0 {
                rooms.push(guard.room.clone());
            }
        }
        rooms.sort_by(|a, b| a.capacity.cmp(&b.capacity).then_with(|| a.name.cmp(&b.name)));
        Ok(rooms)
    }
}
