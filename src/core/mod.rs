//! Core compilation pipeline: types, parsing, extraction, validation, compilation, generation.

pub mod compiler;
pub mod error;
pub mod extractor;
pub mod fingerprint;
pub mod generator;
pub mod naming;
pub mod parser;
pub mod types;
pub mod validator;
pub mod writer;
