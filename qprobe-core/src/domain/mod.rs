//! Core domain types
//!
//! This module contains the structures describing a verification attempt.
//! They are shared between the HTTP client (decoding) and the monitor
//! (polling, caching and rendering).

pub mod cache;
pub mod job;
