//! Deployment Watcher Library
//!
//! Core modules for the edge deployment watcher agent.

pub mod app;
pub mod cloud;
pub mod deploy;
pub mod errors;
pub mod fetch;
pub mod logs;
pub mod models;
pub mod mqtt;
pub mod report;
pub mod state;
pub mod storage;
pub mod utils;
pub mod workers;
