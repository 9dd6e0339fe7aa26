//! Chunks of the trained model file.
//!
//! A model file starts with a [`Header`](io::Header) that lists the
//! chunks that follow. Each chunk starts with its identifier and its
//! length in bytes.

pub mod array;

pub mod io;

pub mod metadata;

pub mod vocab;
