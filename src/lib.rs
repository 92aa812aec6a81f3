#![forbid(unsafe_code)]

//! Shared building blocks for the yttoolbox API server: URL resolution,
//! the innertube metadata client and runtime configuration.

pub mod config;
pub mod innertube;
pub mod metadata;
pub mod resolver;
