//! CLI module for Datastock
//!
//! Standalone commands over the inventory engine. `check`, `scan` and
//! `partition` run once against a spec; `watch` keeps configured
//! collections up to date.

pub mod error;
pub mod output;

pub mod check;
pub mod partition;
pub mod scan;
pub mod watch;
