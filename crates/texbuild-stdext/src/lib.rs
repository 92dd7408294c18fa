//! Data structures and algorithms that are not specific to building documents.
//!
//! Everything here could in principle live in a general purpose library;
//!     it is kept in its own crate so that the lexer and the build engine can share it.

pub mod algorithms;
pub mod collections;
pub mod color;
