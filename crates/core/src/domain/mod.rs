pub mod conversation;
pub mod leave;
pub mod user;
