use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// Collection the user documents live in (default, see [`crate::config::Config`]).
pub const USERS_COLLECTION: &str = "users";

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
    Gateman,
}

/// Snapshot of an assigned teacher, denormalized onto students and leave records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeacherRef {
    pub id: String,
    pub name: String,
}

/// External collaborator's user entity; referenced, not owned, by this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    /// Relevant only for students; absent until an admin assigns one.
    #[serde(default)]
    pub assigned_teacher: Option<TeacherRef>,
}
