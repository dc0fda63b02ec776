//! Catalog and profile records read by the scheduling core.

use uuid::Uuid;

/// Minimal user record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRef {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub is_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvisorProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeacherProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub active: bool,
}

/// An advisory offering with a fixed duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub duration_minutes: i32,
    pub active: bool,
}

impl Service {
    /// Services that may back new slots.
    pub fn is_schedulable(&self) -> bool {
        self.active && self.duration_minutes > 0
    }
}

/// A room or lab in which slots are held.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub id: Uuid,
    pub building_id: Uuid,
    pub name: String,
    pub kind: String,
    pub capacity: i32,
    pub active: bool,
}
