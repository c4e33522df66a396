//! Shared data models for the shortform pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Segment specs (caller-supplied time ranges)
//! - Word-level transcripts
//! - Encoding configuration
//! - Caption styling

pub mod caption;
pub mod encoding;
pub mod segment;
pub mod transcript;

// Re-export common types
pub use caption::CaptionStyle;
pub use encoding::EncodingConfig;
pub use segment::Segment;
pub use transcript::{Transcript, TranscriptSegment, Word};
