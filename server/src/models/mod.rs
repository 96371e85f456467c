//! Data models

pub mod user;
pub mod threat;
pub mod job;
pub mod incident;
pub mod action;

pub use user::*;
pub use threat::*;
pub use job::*;
pub use incident::*;
pub use action::*;
