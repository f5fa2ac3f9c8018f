//! Background tasks owned by the API process.
//!
//! Each submodule provides a long-running async function intended to be
//! spawned via `tokio::spawn`. All tasks accept a [`CancellationToken`]
//! for graceful shutdown. The session sweeper itself lives in
//! `sentinel_pipeline::sweeper` so the standalone worker can run it too.
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod store_watchdog;
