//! Request middleware for bills-service.

pub mod user;

pub use user::UserContext;
