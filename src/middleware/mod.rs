pub mod auth;
pub mod response;
pub mod workspace;

pub use auth::{require_auth, resolve_identity};
pub use response::{ApiResponse, ApiResult, Page, Pagination};
pub use workspace::{validate_workspace, ValidatedWorkspace};
