//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{admin, auth, books, borrowings, feedback, fines, groups, health, notifications, settings};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Libris API",
        version = "1.0.0",
        description = "Library borrowing, fines and membership REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::register,
        auth::login,
        auth::me,
        // Books
        books::list_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        // Borrowings
        borrowings::create_borrowing,
        borrowings::list_borrowings,
        borrowings::get_borrowing,
        borrowings::return_book,
        borrowings::extend_deadline,
        borrowings::mark_as_lost,
        // Fines
        fines::list_fines,
        fines::get_fine,
        fines::pay_fine,
        fines::waive_fine,
        fines::update_fine,
        // Groups
        groups::create_group,
        groups::list_groups,
        groups::get_group,
        groups::update_group,
        groups::approve_group,
        groups::reject_group,
        groups::dissolve_group,
        // Notifications
        notifications::list_notifications,
        notifications::mark_as_read,
        notifications::mark_all_as_read,
        // Feedback
        feedback::create_feedback,
        feedback::list_feedback,
        feedback::get_feedback,
        feedback::delete_feedback,
        // Settings
        settings::get_settings,
        // Admin
        admin::run_sweep,
    ),
    components(
        schemas(
            // Auth
            crate::models::user::User,
            crate::models::user::UserRole,
            crate::models::user::UserStatus,
            crate::models::user::RegisterUser,
            crate::models::user::LoginRequest,
            crate::models::user::AuthResponse,
            // Books
            crate::models::book::Book,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            // Borrowings
            crate::models::borrowing::Borrowing,
            crate::models::borrowing::Borrower,
            crate::models::borrowing::BorrowType,
            crate::models::borrowing::BorrowingStatus,
            crate::models::borrowing::DamageLevel,
            crate::models::borrowing::CreateBorrowing,
            crate::models::borrowing::ReturnBook,
            crate::models::borrowing::ExtendDeadline,
            // Fines
            crate::models::fine::Fine,
            crate::models::fine::FineType,
            crate::models::fine::Settlement,
            crate::models::fine::SettlementKind,
            crate::models::fine::UpdateFine,
            // Groups
            crate::models::group::Group,
            crate::models::group::GroupStatus,
            crate::models::group::CreateGroup,
            crate::models::group::UpdateGroup,
            // Notifications
            crate::models::notification::Notification,
            crate::models::notification::Severity,
            notifications::MarkAllReadResponse,
            // Feedback
            crate::models::feedback::Feedback,
            crate::models::feedback::CreateFeedback,
            // Settings
            crate::models::settings::Settings,
            // Admin
            crate::services::sweeper::SweepReport,
            crate::services::sweeper::PassReport,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Registration and login"),
        (name = "books", description = "Book inventory"),
        (name = "borrowings", description = "Borrowing lifecycle"),
        (name = "fines", description = "Fine ledger"),
        (name = "groups", description = "Borrowing groups"),
        (name = "notifications", description = "In-app notifications"),
        (name = "feedback", description = "Reader feedback"),
        (name = "settings", description = "Borrowing policy"),
        (name = "admin", description = "Administrative operations")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
