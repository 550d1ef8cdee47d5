//! Shared helpers used across the routing engine and its transport adapters.

pub mod duration_serde;
