//! HTTP route handlers

pub mod analysis;
pub mod service;
pub mod trips;
