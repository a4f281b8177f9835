//! Review Trust CLI — file-backed storage and settings for the `review-trust` binary.

pub mod config;
pub mod store;

pub use config::{resolve_output_dir, AcquireOverrides};
pub use store::{read_reviews, JsonlStore};
