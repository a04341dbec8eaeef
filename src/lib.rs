// ABOUTME: Library root for releasectl - exposes the release controller and its collaborators.
// ABOUTME: The `release` binary is in main.rs.

pub mod config;
pub mod controller;
pub mod credentials;
pub mod diagnostics;
pub mod error;
pub mod exec;
pub mod graph;
pub mod lock;
pub mod output;
pub mod request;
pub mod retry;
pub mod rollout;
pub mod sink;
pub mod stage;
pub mod types;
