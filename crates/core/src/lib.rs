//! Domain types, pure policies, and the shared-store contract for the
//! Sentinel stream worker.
//!
//! Nothing in this crate talks to the network. The store traits in
//! [`store`] are implemented by `sentinel-db` (Postgres) and by the
//! in-process [`store::memory::MemoryStore`].

pub mod clip;
pub mod detection;
pub mod error;
pub mod frame;
pub mod retry;
pub mod sampling;
pub mod session;
pub mod stats;
pub mod store;
pub mod types;
