//! Desk client for the project analysis service.

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod session;
pub mod surface;
