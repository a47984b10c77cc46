//! Batch client for quota-aware multipart batching.
//!
//! Developer-friendly goal: keep the public surface small and predictable.
//! Implementation details are split into submodules under `src/client/`.

pub mod builder;
pub mod config;
pub mod core;

pub use builder::BatchClientBuilder;
pub use config::BatchStreamConfig;
pub use core::BatchClient;
