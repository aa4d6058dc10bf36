//! Flattened scene-graph batches and the split/merge codec.
//!
//! Variable-size per-image scene graphs are packed into shared parallel
//! tensors plus ownership index maps so they can pass through a
//! fixed-shape model invocation, then recovered per image by
//! [`split_graph_batch`].

mod batch;
mod common;
mod error;
mod split;

pub use batch::*;
pub use error::*;
pub use split::*;
