//! querygen: compile declarative aggregation schemas into orchestration code.
//!
//! Operation catalog from a descriptor registry, schema validation against
//! it, deterministic plan compilation, and rendering through a pluggable
//! [`render::Renderer`]. Generated code runs on the [`runtime`] module.

pub mod cli;
pub mod core;
pub mod registry;
pub mod render;
pub mod runtime;
