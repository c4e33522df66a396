//! Word-level transcript models.
//!
//! Produced by a speech-recognition collaborator; the pipeline only reads
//! these. Word sequences may contain overlapping or slightly mis-ordered
//! entries and consumers are expected to tolerate that.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single word with its speech timing, relative to the owning clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Word {
    /// The spoken word text.
    pub word: String,
    /// Start of the word in seconds.
    pub start: f64,
    /// End of the word in seconds (`end >= start`).
    pub end: f64,
}

impl Word {
    /// Create a new word.
    pub fn new(word: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            word: word.into(),
            start,
            end,
        }
    }

    /// Duration of the word in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// A contiguous run of recognized speech.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TranscriptSegment {
    /// Words in recognition order. May be empty for non-speech runs.
    #[serde(default)]
    pub words: Vec<Word>,
}

/// A full word-level transcript for one clip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Transcript {
    /// Recognized segments in order.
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
}

impl Transcript {
    /// Create an empty transcript.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Total number of words across all segments.
    pub fn word_count(&self) -> usize {
        self.segments.iter().map(|s| s.words.len()).sum()
    }

    /// Whether the transcript contains no words at all.
    pub fn is_empty(&self) -> bool {
        self.word_count() == 0
    }
}
