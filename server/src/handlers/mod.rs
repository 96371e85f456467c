//! HTTP handlers

pub mod health;
pub mod auth;
pub mod threats;
pub mod incidents;
pub mod analysis;
