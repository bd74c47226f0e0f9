//! Matching: offset-histogram consensus plus correlation refinement

pub mod cluster;
pub mod matcher;
pub mod refine;

pub use matcher::{find_match, MatchOutcome};
pub use refine::{refine_offset, Refinement};
