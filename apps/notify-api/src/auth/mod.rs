pub mod middleware;

pub use middleware::{AuthUser, USER_ID_HEADER};
