//! Log processing pipeline
//!
//! Stages, in order of a line's journey:
//!
//! 1. [`envelope`] strips transport wrappers down to the canonical line
//! 2. [`assembler`] intercepts multi-line JSON statistics blocks
//! 3. [`grammar`] parses canonical lines into structured events
//! 4. [`classify`] labels everything the grammar could not, via ordered
//!    heuristics, ending in the `"unclassified"` bucket
//! 5. [`dispatch`] ties the stages together with one worker per source

pub mod assembler;
pub mod classify;
pub mod dispatch;
pub mod envelope;
pub mod grammar;

pub use classify::{Classification, Classifier};
pub use dispatch::{IngestPipeline, IngestReceipt};
