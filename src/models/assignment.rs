use chrono::{DateTime, Utc};
use forumdb_derive::Model;
use serde::{Deserialize, Serialize};

/// One row of a user's role history. At most one row per user has
/// `is_current` set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Model)]
#[model(table = "user_role_assignments")]
pub struct UserRoleAssignment {
    pub id: i64,
    #[column(
        foreign = "fk_user_role_assignments_user_id",
        unique = "user_role_assignments_current_unique",
        validate(required)
    )]
    pub user_id: i64,
    #[column(foreign = "fk_user_role_assignments_role_id", validate(required))]
    pub role_id: i64,
    #[column(foreign = "fk_user_role_assignments_source_user_id")]
    pub source_user_id: Option<i64>,
    pub is_current: bool,
    pub inserted_at: DateTime<Utc>,
}

impl UserRoleAssignment {
    pub fn new(user_id: i64, role_id: i64) -> Self {
        Self {
            user_id,
            role_id,
            ..Self::default()
        }
    }
}

/// Marks an assignment as revoked. Keyed by the assignment it ends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Model)]
#[model(table = "user_role_assignment_invalidations")]
pub struct UserRoleAssignmentInvalidation {
    #[column(
        foreign = "fk_user_role_assignment_invalidations_assignment_id",
        unique = "user_role_assignment_invalidations_pkey",
        validate(required)
    )]
    pub assignment_id: i64,
    #[column(foreign = "fk_user_role_assignment_invalidations_source_user_id")]
    pub source_user_id: Option<i64>,
    pub inserted_at: DateTime<Utc>,
}

impl UserRoleAssignmentInvalidation {
    pub fn new(assignment_id: i64) -> Self {
        Self {
            assignment_id,
            ..Self::default()
        }
    }
}
