//! Database module: row models and SQL repositories.
//!
//! This module is split into two submodules:
//! - `model`: view models returned by the job queue queries.
//! - `repo`: SQL-only functions that map rows into domain entities.
//!
//! External modules import from `article_forge::db`; the repository API and
//! commonly used view models are re-exported here.

pub mod model;
pub mod repo;

pub use repo::*;

pub use model::{ClaimedJob, JobInfo, NewJob};
