//! Shared harnesses for exercising the settlement engine.
//!
//! Pulled out of the engine's own test tree so integration tests,
//! benches, and the headless verifier can use the same deterministic
//! fixtures and the same replay-comparison machinery:
//! - run-N-times determinism checks with tick-level divergence search
//! - prebuilt worlds, registries, and shuttle workloads
//! - proptest strategies over schedules, tiles, and step sequences

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod determinism;
pub mod fixtures;

/// Re-export so every dependent resolves one proptest version.
pub use proptest;
