//! Fan-out & Fusion (C10): dispatches a business-key lookup across every
//! provider adapter in parallel, merges the results by fixed precedence,
//! and applies privacy redaction before returning a cached, audited bundle.

mod engine;
mod merge;

pub use engine::{FanoutEngine, ProfileBundle, ProfileMetadata, ProfileRequest};
pub use merge::{fill_missing, merge_ladder, PRECEDENCE};
