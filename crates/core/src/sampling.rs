//! Frame sampling policy.
//!
//! The decision depends only on the client-supplied frame index and the
//! session's sample rate, so every worker process reaches the same answer
//! for the same frame regardless of delivery order.

use crate::session::SessionConfig;

/// Whether a frame should go through inference.
///
/// A sample rate of zero is treated as one; validated configurations never
/// carry zero.
pub fn should_process(config: &SessionConfig, frame_index: u64) -> bool {
    is_sampled(frame_index, config.frame_sample_rate)
}

/// `frame_index mod frame_sample_rate == 0`.
pub fn is_sampled(frame_index: u64, frame_sample_rate: u32) -> bool {
    frame_index % u64::from(frame_sample_rate.max(1)) == 0
}
