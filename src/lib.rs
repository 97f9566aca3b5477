//! Multi-source tool resolution and installation engine.
//!
//! Resolves a `(tool, version expression)` pair across heterogeneous
//! backends, downloads the winning build exactly once, and unpacks it into a
//! per-source install tree. Archives are unpacked crash-safely: a partial
//! install never masquerades as a complete one.

pub mod archive;
pub mod cli;
pub mod config;
pub mod error;
pub mod gate;
pub mod http;
pub mod http_cache;
pub mod install;
pub mod progress;
pub mod registry;
pub mod singleflight;
pub mod source;

pub use config::AppConfig;
pub use error::{KegError, Result};
pub use registry::{MatchedVersion, Registry, ResolutionCache, ResolveRequest};
pub use source::{Candidate, Source, ToolVersion};
