pub mod identity_service;
pub mod product_service;
pub mod workspace_service;

pub use identity_service::{CurrentUser, IdentityService};
pub use product_service::{ProductError, ProductService};
pub use workspace_service::{WorkspaceError, WorkspaceService};
