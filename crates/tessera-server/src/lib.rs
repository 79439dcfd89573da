//! HTTP surface for the worker: job submission, telemetry, and health.

pub mod auth;
pub mod dto;
pub mod error;
pub mod routes;
pub mod state;
