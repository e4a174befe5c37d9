//! Forum records persisted through the executor.

mod assignment;
mod category;
mod role;
mod role_permission;
mod route;
mod user;

pub use assignment::{UserRoleAssignment, UserRoleAssignmentInvalidation};
pub use category::Category;
pub use role::Role;
pub use role_permission::RolePermission;
pub use route::Route;
pub use user::User;
