//! Word-level caption synchronization.
//!
//! Pure mapping from transcript words to timed overlay events, plus the
//! drawtext filter chain the renderer composites with. This is not a layout
//! solver: overlapping visibility windows pass through untouched, one event
//! per word.

use shortform_models::{CaptionStyle, Transcript};

use crate::timeline::Timeline;

/// Where an overlay sits on the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayAnchor {
    /// Centered on both axes.
    Center,
}

/// Placement of one overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayPosition {
    /// Horizontal extent in pixels (the clip width).
    pub width: u32,
    /// Anchoring within that extent.
    pub anchor: OverlayAnchor,
}

/// A transient timed caption element.
///
/// Generated 1:1 from a transcript word and consumed immediately by the
/// renderer; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayEvent {
    /// Caption text.
    pub text: String,
    /// Offset from clip start in seconds.
    pub start_offset: f64,
    /// Visible duration in seconds.
    pub duration: f64,
    /// Placement on the frame.
    pub position: OverlayPosition,
}

impl OverlayEvent {
    /// End of the visibility window.
    pub fn end_offset(&self) -> f64 {
        self.start_offset + self.duration
    }
}

/// Map a transcript onto overlay events for `clip`.
///
/// Segments with no words emit nothing. Overlapping or mis-ordered word
/// timings are tolerated and passed through; a word whose `end` precedes
/// its `start` clamps to zero duration instead of failing. Events whose
/// window extends past the clip are left as-is — the clip boundary
/// truncates them at render time.
pub fn synchronize(clip: &Timeline, transcript: &Transcript) -> Vec<OverlayEvent> {
    let position = OverlayPosition {
        width: clip.width(),
        anchor: OverlayAnchor::Center,
    };

    transcript
        .segments
        .iter()
        .flat_map(|segment| segment.words.iter())
        .map(|word| OverlayEvent {
            text: word.word.trim().to_string(),
            start_offset: word.start,
            duration: (word.end - word.start).max(0.0),
            position,
        })
        .collect()
}

/// Escape text for use inside a drawtext `text=` value.
///
/// Covers both drawtext's own escaping and the filter-graph parser's
/// special characters.
pub fn escape_drawtext(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\u{5c}\u{27}"),
            ':' => escaped.push_str("\\:"),
            '%' => escaped.push_str("\\%"),
            ',' => escaped.push_str("\\,"),
            ';' => escaped.push_str("\\;"),
            '[' => escaped.push_str("\\["),
            ']' => escaped.push_str("\\]"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Build the drawtext chain compositing `events` over the base video.
///
/// One drawtext per event, gated by its visibility window; the input label
/// is consumed and `[vout]` produced. Returns `None` when there is nothing
/// to draw.
pub fn build_overlay_filter(events: &[OverlayEvent], style: &CaptionStyle) -> Option<String> {
    if events.is_empty() {
        return None;
    }

    let font_arg = style
        .font_file
        .as_ref()
        .map(|p| format!("fontfile={}:", p.display()))
        .unwrap_or_default();

    let chain: Vec<String> = events
        .iter()
        .map(|event| {
            format!(
                "drawtext={font}text='{text}':fontsize={size}:fontcolor={color}:\
                 bordercolor={outline}:borderw={bw}:\
                 x=(w-text_w)/2:y=(h-text_h)/2:\
                 enable='between(t,{start:.3},{end:.3})'",
                font = font_arg,
                text = escape_drawtext(&event.text),
                size = style.font_size,
                color = style.font_color,
                outline = style.outline_color,
                bw = style.outline_width,
                start = event.start_offset,
                end = event.end_offset(),
            )
        })
        .collect();

    Some(format!("[0:v]{}[vout]", chain.join(",")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::VideoInfo;
    use shortform_models::{TranscriptSegment, Word};

    fn clip() -> Timeline {
        Timeline::new(
            "/tmp/composed.mp4",
            VideoInfo {
                duration: 10.0,
                width: 1080,
                height: 1920,
                fps: 30.0,
                has_audio: true,
            },
        )
    }

    fn transcript_of(words: Vec<Word>) -> Transcript {
        Transcript {
            segments: vec![TranscriptSegment { words }],
        }
    }

    #[test]
    fn test_one_event_per_word() {
        let t = transcript_of(vec![
            Word::new("hi", 0.0, 0.4),
            Word::new("there", 0.5, 0.9),
        ]);
        let events = synchronize(&clip(), &t);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].text, "hi");
        assert!((events[0].start_offset - 0.0).abs() < 1e-9);
        assert!((events[0].duration - 0.4).abs() < 1e-9);
        assert!((events[1].start_offset - 0.5).abs() < 1e-9);
        assert!((events[1].duration - 0.4).abs() < 1e-9);
        assert_eq!(events[0].position.width, 1080);
        assert_eq!(events[0].position.anchor, OverlayAnchor::Center);
    }

    #[test]
    fn test_empty_segment_emits_nothing() {
        let t = Transcript {
            segments: vec![
                TranscriptSegment::default(),
                TranscriptSegment {
                    words: vec![Word::new("solo", 1.0, 1.5)],
                },
            ],
        };
        let events = synchronize(&clip(), &t);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].text, "solo");
    }

    #[test]
    fn test_overlapping_windows_pass_through() {
        let t = transcript_of(vec![
            Word::new("over", 1.0, 2.0),
            Word::new("lap", 1.5, 2.5),
        ]);
        let events = synchronize(&clip(), &t);
        assert_eq!(events.len(), 2);
        assert!(events[0].end_offset() > events[1].start_offset);
    }

    #[test]
    fn test_misordered_word_clamps_to_zero_duration() {
        let t = transcript_of(vec![Word::new("glitch", 2.0, 1.8)]);
        let events = synchronize(&clip(), &t);
        assert_eq!(events.len(), 1);
        assert!(events[0].duration.abs() < 1e-9);
    }

    #[test]
    fn test_window_past_clip_end_is_not_shortened() {
        let t = transcript_of(vec![Word::new("tail", 9.8, 10.6)]);
        let events = synchronize(&clip(), &t);
        assert!((events[0].duration - 0.8).abs() < 1e-9);
        assert!(events[0].end_offset() > clip().duration());
    }

    #[test]
    fn test_escape_drawtext() {
        assert_eq!(escape_drawtext("50% off"), "50\\% off");
        assert_eq!(escape_drawtext("a:b"), "a\\:b");
        assert_eq!(escape_drawtext("it's"), "it\\'s");
        assert_eq!(escape_drawtext("plain"), "plain");
    }

    #[test]
    fn test_build_overlay_filter_structure() {
        let style = CaptionStyle::default();
        let t = transcript_of(vec![
            Word::new("hi", 0.0, 0.4),
            Word::new("there", 0.5, 0.9),
        ]);
        let events = synchronize(&clip(), &t);
        let filter = build_overlay_filter(&events, &style).unwrap();

        assert!(filter.starts_with("[0:v]"));
        assert!(filter.ends_with("[vout]"));
        assert_eq!(filter.matches("drawtext=").count(), 2);
        assert!(filter.contains("text='hi'"));
        assert!(filter.contains("enable='between(t,0.000,0.400)'"));
        assert!(filter.contains("enable='between(t,0.500,0.900)'"));
        assert!(filter.contains("fontcolor=yellow"));
        assert!(filter.contains("borderw=1"));
        assert!(filter.contains("x=(w-text_w)/2"));
    }

    #[test]
    fn test_build_overlay_filter_empty_is_none() {
        let style = CaptionStyle::default();
        assert!(build_overlay_filter(&[], &style).is_none());
    }

    #[test]
    fn test_build_overlay_filter_with_font_file() {
        let style = CaptionStyle::default().with_font_file("/fonts/ComicRelief.ttf");
        let events = synchronize(&clip(), &transcript_of(vec![Word::new("hi", 0.0, 0.4)]));
        let filter = build_overlay_filter(&events, &style).unwrap();
        assert!(filter.contains("fontfile=/fonts/ComicRelief.ttf:"));
    }
}
