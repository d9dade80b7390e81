//! Queue Probe Core
//!
//! Core types shared by the queue worker verification crates.
//!
//! This crate contains:
//! - Domain types: the probe job, its status vocabulary and the cached snapshot
//! - DTOs: wire shapes of the `/verify/*` endpoints

pub mod domain;
pub mod dto;
