use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

/// Display-name lookup against the room/user directory, an external
/// collaborator injected at engine construction. Lookups are best-effort:
/// `None` degrades to an empty string at the call site and never fails the
/// primary operation.
#[async_trait]
pub trait NameDirectory: Send + Sync {
    async fn room_name(&self, room_id: Uuid) -> Option<String>;
    async fn user_display_name(&self, user_id: Uuid) -> Option<String>;
}

/// Fixed in-memory mapping. The test double, and enough for single-process
/// deployments.
pub struct StaticDirectory {
    rooms: DashMap<Uuid, String>,
    users: DashMap<Uuid, String>,
}

impl Default for StaticDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            users: DashMap::new(),
        }
    }

    pub fn set_room_name(&self, room_id: Uuid, name: impl Into<String>) {
        self.rooms.insert(room_id, name.into());
    }

    pub fn set_user_name(&self, user_id: Uuid, name: impl Into<String>) {
        self.users.insert(user_id, name.into());
    }
}

#[async_trait]
impl NameDirectory for StaticDirectory {
    async fn room_name(&self, room_id: Uuid) -> Option<String> {
        self.rooms.get(&room_id).map(|e| e.value().clone())
    }

    async fn user_display_name(&self, user_id: Uuid) -> Option<String> {
        self.users.get(&user_id).map(|e| e.value().clone())
    }
}

/// Knows nobody. Events published through an engine wired with this carry
/// empty display names.
pub struct NullDirectory;

#[async_trait]
impl NameDirectory for NullDirectory {
    async fn room_name(&self, _room_id: Uuid) -> Option<String> {
        None
    }

    async fn user_display_name(&self, _user_id: Uuid) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_directory_lookup() {
        let dir = StaticDirectory::new();
        let room = Uuid::new_v4();
        dir.set_room_name(room, "Fishbowl");

        assert_eq!(dir.room_name(room).await.as_deref(), Some("Fishbowl"));
        assert_eq!(dir.room_name(Uuid::new_v4()).await, None);
        assert_eq!(dir.user_display_name(Uuid::new_v4()).await, None);
    }
}
