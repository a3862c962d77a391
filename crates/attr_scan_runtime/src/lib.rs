//! Runtime for partitioned attribute scans.
//!
//! This crate owns the async side of a scan: the page source seam and its
//! HTTP adapter, the per-partition scanner, the bounded coordinator, and the
//! command-line entry points shared by the account and license binaries.
//! Deterministic primitives come from `attr_scan_core`.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod progress;
