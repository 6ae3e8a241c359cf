pub mod auth;
pub mod resiliency;

pub use auth::{admin_auth_middleware, staff_auth_middleware, StaffClaims, ROLE_ADMIN, ROLE_WORKER};
