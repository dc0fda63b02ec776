//! Catalog entities: users, profiles, services and resources.

use domain::models::{AdvisorProfile, Resource, Service, TeacherProfile, UserRef};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct UserEntity {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub is_admin: bool,
}

impl From<UserEntity> for UserRef {
    fn from(entity: UserEntity) -> Self {
        Self {
            id: entity.id,
            email: entity.email,
            display_name: entity.display_name,
            is_admin: entity.is_admin,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ProfileEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub active: bool,
}

impl From<ProfileEntity> for AdvisorProfile {
    fn from(entity: ProfileEntity) -> Self {
        Self {
            id: entity.id,
            user_id: entity.user_id,
            active: entity.active,
        }
    }
}

impl From<ProfileEntity> for TeacherProfile {
    fn from(entity: ProfileEntity) -> Self {
        Self {
            id: entity.id,
            user_id: entity.user_id,
            active: entity.active,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ServiceEntity {
    pub id: Uuid,
    pub name: String,
    pub duration_minutes: i32,
    pub active: bool,
}

impl From<ServiceEntity> for Service {
    fn from(entity: ServiceEntity) -> Self {
        Self {
            id: entity.id,
            name: entity.name,
            duration_minutes: entity.duration_minutes,
            active: entity.active,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ResourceEntity {
    pub id: Uuid,
    pub building_id: Uuid,
    pub name: String,
    pub kind: String,
    pub capacity: i32,
    pub active: bool,
}

impl From<ResourceEntity> for Resource {
    fn from(entity: ResourceEntity) -> Self {
        Self {
            id: entity.id,
            building_id: entity.building_id,
            name: entity.name,
            kind: entity.kind,
            capacity: entity.capacity,
            active: entity.active,
        }
    }
}
