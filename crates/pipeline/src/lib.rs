//! Frame-processing orchestration over the shared session store.
//!
//! Every component here is stateless apart from what it reads from and
//! writes to the store, so any number of worker processes can run the same
//! pipeline against one store.

pub mod aggregator;
pub mod clip_archive;
pub mod clip_recorder;
pub mod error;
pub mod lease;
pub mod lifecycle;
pub mod processor;
pub mod settings;
pub mod stats;
pub mod sweeper;

pub use error::PipelineError;
pub use settings::PipelineSettings;
