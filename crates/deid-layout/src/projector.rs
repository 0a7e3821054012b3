//! Character-box projection.
//!
//! Visual redaction is best effort: characters without geometry are skipped
//! and a span with no geometry at all yields no boxes. The caller still
//! substitutes the text.

use tracing::{debug, warn};

use deid_core::{BBox, CharBox, DeidConfig, RedactionBox, ResolvedSpan};

/// Projects spans onto per-line rectangles.
#[derive(Debug, Clone)]
pub struct CoordinateProjector {
    line_tolerance: f64,
}

impl CoordinateProjector {
    pub fn new(line_tolerance: f64) -> Self {
        Self { line_tolerance }
    }

    pub fn from_config(config: &DeidConfig) -> Self {
        Self::new(config.line_tolerance)
    }

    /// Boxes covering `span`, one per visual line.
    ///
    /// `chars` must be ordered by character index, as the parser emits them.
    /// Two consecutive boxes share a line when their vertical midpoints are
    /// within the tolerance of the line's first box.
    pub fn project(&self, span: &ResolvedSpan, chars: &[CharBox]) -> Vec<RedactionBox> {
        let first = chars.partition_point(|c| c.index < span.start_offset);

        let mut boxes = Vec::new();
        let mut line: Option<(BBox, f64)> = None;
        let mut skipped = 0usize;

        for c in chars[first..]
            .iter()
            .take_while(|c| c.index < span.end_offset)
        {
            let Some(bbox) = c.bbox.filter(BBox::is_valid) else {
                skipped += 1;
                continue;
            };
            line = match line {
                Some((current, anchor)) if (bbox.mid_y() - anchor).abs() <= self.line_tolerance => {
                    Some((current.union(&bbox), anchor))
                }
                Some((current, _)) => {
                    boxes.push(RedactionBox::from_bbox(span.page_index, &current));
                    Some((bbox, bbox.mid_y()))
                }
                None => Some((bbox, bbox.mid_y())),
            };
        }
        if let Some((current, _)) = line {
            boxes.push(RedactionBox::from_bbox(span.page_index, &current));
        }

        if boxes.is_empty() {
            warn!(
                "No coordinates for {} span [{}, {}) on page {}",
                span.pii_type, span.start_offset, span.end_offset, span.page_index
            );
        } else if skipped > 0 {
            debug!(
                "Skipped {} characters without geometry in [{}, {})",
                skipped, span.start_offset, span.end_offset
            );
        }
        boxes
    }

    /// Project every span of one page. Output is parallel to `spans`.
    pub fn project_page(&self, spans: &[ResolvedSpan], chars: &[CharBox]) -> Vec<Vec<RedactionBox>> {
        spans.iter().map(|s| self.project(s, chars)).collect()
    }
}

impl Default for CoordinateProjector {
    fn default() -> Self {
        Self::from_config(&DeidConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deid_core::PiiType;

    /// Lay `text` out on lines of `per_line` characters, 6 units wide and
    /// 12 units tall, with spaces left without geometry.
    fn layout(text: &str, per_line: usize) -> Vec<CharBox> {
        text.chars()
            .enumerate()
            .map(|(i, ch)| {
                let col = (i % per_line) as f64;
                let row = (i / per_line) as f64;
                let bbox = (!ch.is_whitespace()).then(|| {
                    BBox::new(col * 6.0, row * 14.0, col * 6.0 + 6.0, row * 14.0 + 12.0)
                });
                CharBox { index: i, bbox }
            })
            .collect()
    }

    fn span(start: usize, end: usize) -> ResolvedSpan {
        ResolvedSpan {
            page_index: 2,
            start_offset: start,
            end_offset: end,
            pii_type: PiiType::Name,
            confidence: 0.9,
        }
    }

    #[test]
    fn test_single_line_span_merges() {
        let chars = layout("Contact John Smith today", 80);
        let boxes = CoordinateProjector::new(2.0).project(&span(8, 18), &chars);
        assert_eq!(boxes.len(), 1);
        let b = boxes[0];
        assert_eq!(b.page_index, 2);
        assert_eq!((b.x0, b.x1), (48.0, 108.0));
        assert_eq!((b.y0, b.y1), (0.0, 12.0));
    }

    #[test]
    fn test_wrapped_span_yields_box_per_line() {
        // "John" ends line 0, "Smith" starts line 1.
        let chars = layout("Contact John Smith", 13);
        let boxes = CoordinateProjector::new(2.0).project(&span(8, 18), &chars);
        assert_eq!(boxes.len(), 2);
        assert_eq!((boxes[0].y0, boxes[0].y1), (0.0, 12.0));
        assert_eq!((boxes[1].y0, boxes[1].y1), (14.0, 26.0));
        assert_eq!(boxes[1].x0, 0.0);
    }

    #[test]
    fn test_no_geometry_yields_empty() {
        let chars: Vec<CharBox> = (0..20).map(|i| CharBox { index: i, bbox: None }).collect();
        assert!(CoordinateProjector::default().project(&span(3, 9), &chars).is_empty());
        assert!(CoordinateProjector::default().project(&span(3, 9), &[]).is_empty());
    }

    #[test]
    fn test_invalid_boxes_are_skipped() {
        let mut chars = layout("abcdef", 80);
        chars[2].bbox = Some(BBox::new(f64::NAN, 0.0, 1.0, 1.0));
        chars[3].bbox = Some(BBox::new(50.0, 0.0, 10.0, 12.0));
        let boxes = CoordinateProjector::new(2.0).project(&span(2, 5), &chars);
        assert_eq!(boxes.len(), 1);
        assert_eq!((boxes[0].x0, boxes[0].x1), (24.0, 30.0));
    }

    #[test]
    fn test_tolerance_absorbs_baseline_jitter() {
        let chars = vec![
            CharBox { index: 0, bbox: Some(BBox::new(0.0, 100.0, 6.0, 112.0)) },
            CharBox { index: 1, bbox: Some(BBox::new(6.0, 101.5, 12.0, 113.5)) },
            CharBox { index: 2, bbox: Some(BBox::new(12.0, 99.0, 18.0, 111.0)) },
        ];
        assert_eq!(CoordinateProjector::new(2.0).project(&span(0, 3), &chars).len(), 1);
        assert_eq!(CoordinateProjector::new(1.0).project(&span(0, 3), &chars).len(), 3);
    }

    #[test]
    fn test_project_page_is_parallel_to_spans() {
        let chars = layout("Jane Doe, 555-0100", 80);
        let spans = vec![span(0, 8), span(10, 18)];
        let boxes = CoordinateProjector::default().project_page(&spans, &chars);
        assert_eq!(boxes.len(), 2);
        assert!(boxes.iter().all(|b| b.len() == 1));
    }

    #[test]
    fn test_redaction_box_json_shape() {
        let chars = layout("abc", 80);
        let boxes = CoordinateProjector::default().project(&span(0, 3), &chars);
        let json = serde_json::to_value(boxes[0]).unwrap();
        assert_eq!(json["page_index"], 2);
        assert_eq!(json["x1"], 18.0);
    }
}
