//! Synthetic fixture module
//!
//! This module provides:
//! - `generate` for seeded, reproducible batches of users, profiles and posts
//! - `Template` / `write_artifact` for rendering a batch into a loader script
//! - `LiteralDialect` for choosing the boolean/null tokens of the target loader

mod generator;
mod render;
mod types;

pub use generator::{DEFAULT_PASSWORD, DEFAULT_RANK_IDS, POST_COUNT_SPREAD, generate};
pub use render::{LiteralDialect, Template, to_literal, write_artifact};
pub use types::{FixtureBatch, GenerationError, SyntheticPost, SyntheticProfile, SyntheticUser};
