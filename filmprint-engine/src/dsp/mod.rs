//! Signal-processing pipeline stages
//!
//! Everything in this module is a pure function of its input buffer:
//! no shared state, no I/O. Stages compose as
//! `prepare` → `peaks::extract_peaks` on both the ingest and query
//! paths.

pub mod filter;
pub mod peaks;
pub mod prepare;
pub mod stft;

pub use peaks::Peak;
pub use prepare::PreparedAudio;
