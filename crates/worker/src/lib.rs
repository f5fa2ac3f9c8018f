//! Standalone sweeper process.
//!
//! Runs the session and clip-window sweep against the shared Postgres
//! store so API processes can run with `SWEEP_INTERVAL_SECS=0`.

pub mod config;
