pub mod auth;
pub mod authentication;
pub mod permissions;
pub mod user;

pub use auth::*;
pub use authentication::*;
pub use permissions::*;
pub use user::*;
