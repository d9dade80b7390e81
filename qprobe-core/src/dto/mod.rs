//! Data Transfer Objects for the verification endpoints
//!
//! DTOs mirror the JSON returned by the hosting application. They are kept
//! separate from the domain types so that lenient decoding rules (aliases,
//! optional fields) do not leak into the rest of the code.

pub mod verify;
