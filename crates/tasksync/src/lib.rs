//! tasksync - keeps a task graph and a remote issue tracker in step.
//!
//! This crate provides both a CLI application and a library: the graph
//! model, the blocked-state resolver, the idempotent sync engine, the
//! retry layer and artifact snapshot recovery, all written against the
//! [`tracker::IssueTracker`] trait.

#![forbid(unsafe_code)]

pub mod artifact;
pub mod config;
pub mod domain;
pub mod error;
pub mod generator;
pub mod graph;
pub mod ledger;
pub mod output;
pub mod render;
pub mod resilience;
pub mod resolver;
pub mod sync;
pub mod tracker;
pub mod validation;
pub mod watcher;

// Public CLI module (needed by binary)
pub mod cli;

pub use error::{Error, Result};
