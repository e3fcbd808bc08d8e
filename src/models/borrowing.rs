//! Borrowing model and lifecycle states

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Kind of borrowing requested by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BorrowType {
    Individual,
    Group,
}

impl BorrowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowType::Individual => "individual",
            BorrowType::Group => "group",
        }
    }
}

impl std::str::FromStr for BorrowType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "individual" => Ok(BorrowType::Individual),
            "group" => Ok(BorrowType::Group),
            _ => Err(format!("Invalid borrow type: {}", s)),
        }
    }
}

/// Who holds the book: exactly one user or one group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum Borrower {
    Individual(Uuid),
    Group(Uuid),
}

impl Borrower {
    pub fn borrow_type(&self) -> BorrowType {
        match self {
            Borrower::Individual(_) => BorrowType::Individual,
            Borrower::Group(_) => BorrowType::Group,
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Borrower::Individual(id) => Some(*id),
            Borrower::Group(_) => None,
        }
    }

    pub fn group_id(&self) -> Option<Uuid> {
        match self {
            Borrower::Individual(_) => None,
            Borrower::Group(id) => Some(*id),
        }
    }
}

/// Borrowing lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BorrowingStatus {
    Borrowed,
    Returned,
    Overdue,
    Lost,
}

impl BorrowingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowingStatus::Borrowed => "borrowed",
            BorrowingStatus::Returned => "returned",
            BorrowingStatus::Overdue => "overdue",
            BorrowingStatus::Lost => "lost",
        }
    }

    /// Whether the book is still out with the borrower
    pub fn is_active(&self) -> bool {
        matches!(self, BorrowingStatus::Borrowed | BorrowingStatus::Overdue)
    }

    /// Allowed moves: BORROWED -> {RETURNED, OVERDUE, LOST}, OVERDUE -> {RETURNED, LOST}
    pub fn can_transition_to(&self, next: BorrowingStatus) -> bool {
        use BorrowingStatus::*;
        matches!(
            (self, next),
            (Borrowed, Returned) | (Borrowed, Overdue) | (Borrowed, Lost) | (Overdue, Returned) | (Overdue, Lost)
        )
    }
}

impl std::fmt::Display for BorrowingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BorrowingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "borrowed" => Ok(BorrowingStatus::Borrowed),
            "returned" => Ok(BorrowingStatus::Returned),
            "overdue" => Ok(BorrowingStatus::Overdue),
            "lost" => Ok(BorrowingStatus::Lost),
            _ => Err(format!("Invalid borrowing status: {}", s)),
        }
    }
}

/// Condition of a returned book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DamageLevel {
    None,
    Minor,
    Major,
}

impl DamageLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DamageLevel::None => "none",
            DamageLevel::Minor => "minor",
            DamageLevel::Major => "major",
        }
    }
}

impl std::str::FromStr for DamageLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(DamageLevel::None),
            "minor" => Ok(DamageLevel::Minor),
            "major" => Ok(DamageLevel::Major),
            _ => Err(format!("Invalid damage level: {}", s)),
        }
    }
}

/// One lending of one book copy
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Borrowing {
    pub id: Uuid,
    pub book_id: Uuid,
    pub borrower: Borrower,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: BorrowingStatus,
    pub damage_level: Option<DamageLevel>,
    pub fine_id: Option<Uuid>,
}

impl Borrowing {
    pub fn new(book_id: Uuid, borrower: Borrower, borrow_date: DateTime<Utc>, due_date: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            book_id,
            borrower,
            borrow_date,
            due_date,
            return_date: None,
            status: BorrowingStatus::Borrowed,
            damage_level: None,
            fine_id: None,
        }
    }
}

/// Create borrowing request
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBorrowing {
    pub book_id: Uuid,
    pub borrow_type: BorrowType,
    /// Required when `borrowType` is `group`
    pub group_id: Option<Uuid>,
}

/// Return book request
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReturnBook {
    pub damage_level: Option<DamageLevel>,
}

/// Extend deadline request
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtendDeadline {
    pub new_due_date: DateTime<Utc>,
}

/// Borrowing query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BorrowingQuery {
    pub status: Option<BorrowingStatus>,
    pub borrow_type: Option<BorrowType>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_returned_and_lost_are_terminal() {
        use BorrowingStatus::*;
        for next in [Borrowed, Returned, Overdue, Lost] {
            assert!(!Returned.can_transition_to(next));
            assert!(!Lost.can_transition_to(next));
        }
    }

    #[test]
    fn test_overdue_only_closes() {
        use BorrowingStatus::*;
        assert!(Overdue.can_transition_to(Returned));
        assert!(Overdue.can_transition_to(Lost));
        assert!(!Overdue.can_transition_to(Borrowed));
        assert!(!Overdue.can_transition_to(Overdue));
        assert!(Borrowed.can_transition_to(Overdue));
    }
}
