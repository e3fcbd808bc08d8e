//! Borrowing group model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

/// Group approval state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    Pending,
    Approved,
    Rejected,
    Dissolved,
}

impl GroupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupStatus::Pending => "pending",
            GroupStatus::Approved => "approved",
            GroupStatus::Rejected => "rejected",
            GroupStatus::Dissolved => "dissolved",
        }
    }
}

impl std::str::FromStr for GroupStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(GroupStatus::Pending),
            "approved" => Ok(GroupStatus::Approved),
            "rejected" => Ok(GroupStatus::Rejected),
            "dissolved" => Ok(GroupStatus::Dissolved),
            _ => Err(format!("Invalid group status: {}", s)),
        }
    }
}

/// A set of users borrowing together under one leader
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub leader_id: Uuid,
    pub members: Vec<Uuid>,
    pub status: GroupStatus,
    /// The single active borrowing slot
    pub current_borrowing: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Group {
    /// The leader counts as a member even when not listed
    pub fn is_member(&self, user_id: Uuid) -> bool {
        self.leader_id == user_id || self.members.contains(&user_id)
    }

    pub fn is_leader(&self, user_id: Uuid) -> bool {
        self.leader_id == user_id
    }
}

/// Create group request
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroup {
    #[validate(length(min = 1, message = "Group name is required"))]
    pub name: String,
    pub member_ids: Vec<Uuid>,
}

/// Update group request
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGroup {
    #[validate(length(min = 1, message = "Group name cannot be empty"))]
    pub name: Option<String>,
    pub member_ids: Option<Vec<Uuid>>,
}

/// Group query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupQuery {
    pub status: Option<GroupStatus>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}
