pub mod asset;
pub mod group;
pub mod module;
pub mod organization;
pub mod parameter;
pub mod product;
pub mod release;
pub mod req_collection;
pub mod requirement;
pub mod tag;
pub mod testcase;
pub mod user;
pub mod workspace;

pub use asset::Asset;
pub use group::Group;
pub use module::{Module, ModuleSummary};
pub use organization::Organization;
pub use parameter::Parameter;
pub use product::Product;
pub use release::Release;
pub use req_collection::ReqCollection;
pub use requirement::Requirement;
pub use tag::Tag;
pub use testcase::{TestCase, TestRun};
pub use user::User;
pub use workspace::Workspace;
