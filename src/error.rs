//! Host-boundary validation errors.
//!
//! The device-side kernels never fail recoverably (see the crate-level
//! design notes): a malformed invocation either produces wrong output or
//! hangs, and both are testing/documentation concerns rather than error
//! values. The only condition this crate surfaces as a `Result` is input
//! that would overflow the fixed-width fields the kernels rely on, caught
//! before any GPU resource is allocated.

use crate::MAX_ELEMENTS;

/// Errors returned by buffer-creation entry points.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortError {
    /// `n` would overflow the 30-bit per-segment, per-digit counter used by
    /// the radix scatter's decoupled lookback (see the `sort` module).
    #[error("input length {n} exceeds the maximum of {max} elements", max = MAX_ELEMENTS)]
    InputTooLarge { n: u32 },

    /// an entry point that requires `NonZeroU32::new(n)` to succeed was
    /// called with `n == 0`.
    #[error("input length must be non-zero")]
    EmptyInput,

    /// [`crate::scan::ScanMode::MultiPass`] scans its segment aggregates in
    /// a single workgroup and has no second hierarchy level, so it only
    /// covers up to `max_segments` segments (see the `scan` module).
    #[error("ScanMode::MultiPass can only scan {max_segments} segments in one go, got {num_segments}; use ScanMode::Decoupled for inputs this large")]
    MultiPassSegmentLimitExceeded { num_segments: u32, max_segments: u32 },
}
