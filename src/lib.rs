//! netifstat: live per-interface network statistics over rtnetlink.
//!
//! This library exposes the collector modules for use by the binary and by tests.

pub mod app;
pub mod collectors;
pub mod config;
pub mod controller;
pub mod error;
pub mod model;
pub mod registry;
pub mod scheduler;
pub mod view;
