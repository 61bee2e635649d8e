pub mod leave;
pub mod user;
