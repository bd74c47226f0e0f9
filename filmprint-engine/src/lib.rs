//! filmprint-engine: audio fingerprinting and matching engine
//!
//! Identifies which stored movie soundtrack a short, possibly noisy
//! audio fragment came from, and at what temporal offset.
//!
//! Pipeline shape (ingest and query share the front half):
//!
//! ```text
//! bytes -> decoded PCM -> mono 16 kHz -> spectral peaks -> (hash, t)
//!       -> store append (ingest) | offset-histogram vote (query)
//!       -> cross-correlation refinement -> scored result
//! ```
//!
//! All DSP stages are pure functions of their input buffers; the
//! SQLite store is the only shared mutable state.

pub mod decode;
pub mod dsp;
pub mod fingerprint;
pub mod ingest;
pub mod matching;
pub mod query;
pub mod store;
pub mod types;

pub use filmprint_common::{Error, Result};
pub use ingest::{IngestOutcome, Ingestor};
pub use query::{QueryEngine, QueryRequest};
pub use types::MatchReport;
