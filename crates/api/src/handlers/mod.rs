pub mod stats;
pub mod streams;
