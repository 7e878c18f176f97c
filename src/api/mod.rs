pub mod extract;
pub mod pagination;

pub use extract::{ApiJson, ApiPath, ApiQuery};
pub use pagination::{push_filter, ListQuery, ListRequest, ListSpec};
