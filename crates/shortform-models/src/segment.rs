//! Caller-supplied segment specs.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A time range to cut from the source, with an explicit assembly position.
///
/// Segments are assembled in ascending `order`; the sort is stable, so
/// duplicate `order` values keep their original input position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Segment {
    /// Start of the range in seconds, relative to the source.
    pub start: f64,
    /// Exclusive end of the range in seconds.
    pub end: f64,
    /// Assembly position. Lower values come first in the output.
    pub order: i64,
}

impl Segment {
    /// Create a new segment.
    pub fn new(start: f64, end: f64, order: i64) -> Self {
        Self { start, end, order }
    }

    /// Duration of the range in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Sort segments into assembly order (stable, ascending by `order`).
pub fn sort_for_assembly(segments: &mut [Segment]) {
    segments.sort_by_key(|s| s.order);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration() {
        let seg = Segment::new(1.5, 4.0, 0);
        assert!((seg.duration() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_sort_ascending_by_order() {
        let mut segs = vec![
            Segment::new(10.0, 15.0, 2),
            Segment::new(0.0, 5.0, 0),
            Segment::new(20.0, 25.0, 1),
        ];
        sort_for_assembly(&mut segs);
        assert_eq!(segs[0].order, 0);
        assert_eq!(segs[1].order, 1);
        assert_eq!(segs[2].order, 2);
    }

    #[test]
    fn test_sort_is_stable_for_duplicate_orders() {
        let mut segs = vec![
            Segment::new(5.0, 6.0, 1),
            Segment::new(1.0, 2.0, 1),
            Segment::new(3.0, 4.0, 0),
        ];
        sort_for_assembly(&mut segs);
        // Duplicate order 1 keeps input position: (5,6) before (1,2).
        assert!((segs[1].start - 5.0).abs() < 1e-9);
        assert!((segs[2].start - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_serde_roundtrip() {
        let seg = Segment::new(0.0, 5.0, 3);
        let json = serde_json::to_string(&seg).unwrap();
        let back: Segment = serde_json::from_str(&json).unwrap();
        assert_eq!(seg, back);
    }
}
