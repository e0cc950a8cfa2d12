//! Article generation pipeline: category balancing, LLM-backed content
//! assembly and a SQLite-backed job queue that chains it all together.

pub mod balancer;
pub mod classify;
pub mod config;
pub mod content;
pub mod db;
pub mod dedup;
pub mod llm;
pub mod model;
pub mod queue;
pub mod tasks;
