//! Baseline row grouping and column assignment.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::model::{Fragment, Page, PageLayout, PageMetrics, Row};
use crate::parser::fonts::FontStatistics;
use crate::parser::{FootnoteZonePolicy, Thresholds};

/// Line height assumed when a page gives no usable measurement.
const FALLBACK_LINE_HEIGHT: f32 = 12.0;

/// Median of a list of values (upper median for even lengths).
pub(crate) fn median(mut values: Vec<f32>) -> Option<f32> {
    values.retain(|v| v.is_finite());
    if values.is_empty() {
        return None;
    }
    values.sort_by(f32::total_cmp);
    Some(values[values.len() / 2])
}

/// Top-to-bottom, left-to-right order with the id as final tie breaker.
fn reading_cmp(a: &Fragment, b: &Fragment) -> Ordering {
    a.baseline()
        .total_cmp(&b.baseline())
        .then(a.rect.left.total_cmp(&b.rect.left))
        .then(a.id.cmp(&b.id))
}

/// Groups fragments into rows and assigns column ids.
pub struct RowGrouper<'a> {
    thresholds: &'a Thresholds,
    policy: FootnoteZonePolicy,
}

impl<'a> RowGrouper<'a> {
    /// Create a row grouper.
    pub fn new(thresholds: &'a Thresholds, policy: FootnoteZonePolicy) -> Self {
        Self { thresholds, policy }
    }

    /// Group the page's fragments into rows and write their row and column
    /// slots.
    ///
    /// Column ids are computed on local arrays, including all post-pass
    /// fixes, and committed once at the end.
    pub fn group(&self, page: &mut Page, columns: &[f32]) -> Result<PageLayout> {
        let t = self.thresholds;
        let frags = &page.fragments;

        let mut sorted: Vec<usize> = (0..frags.len())
            .filter(|i| frags[*i].contributes_layout())
            .collect();
        sorted.sort_by(|a, b| reading_cmp(&frags[*a], &frags[*b]));

        // Adaptive baseline tolerance
        let baselines: Vec<f32> = sorted.iter().map(|i| frags[*i].baseline()).collect();
        let gaps: Vec<f32> = baselines
            .windows(2)
            .map(|w| w[1] - w[0])
            .filter(|g| *g > 0.0)
            .collect();
        let line_spacing = median(gaps).unwrap_or(0.0);
        let tolerance = if line_spacing > 0.0 {
            t.baseline_tolerance_cap
                .min(line_spacing * t.baseline_tolerance_ratio)
        } else {
            t.baseline_tolerance_cap
        };

        let rows = group_rows(frags, &sorted, tolerance);

        let row_gaps: Vec<f32> = rows
            .windows(2)
            .map(|w| w[1].baseline - w[0].baseline)
            .collect();
        let line_height = median(row_gaps)
            .or_else(|| median(sorted.iter().map(|i| frags[*i].rect.height).collect()))
            .filter(|h| *h > 0.0)
            .unwrap_or(FALLBACK_LINE_HEIGHT);
        let body_size = FontStatistics::from_fragments(frags).mode().unwrap_or(0.0);

        let metrics = PageMetrics {
            baseline_tolerance: tolerance,
            line_spacing,
            line_height,
            body_size,
        };

        let column = if columns.len() < 2 {
            vec![1u16; frags.len()]
        } else {
            self.assign_columns(page, columns, &rows, &metrics)
        };

        // Commit
        let mut lefts: BTreeMap<u16, f32> = BTreeMap::new();
        for row in &rows {
            for &m in &row.members {
                let fragment = &mut page.fragments[m];
                fragment.assign_row(row.index)?;
                fragment.assign_column(column[m])?;
                let left = lefts.entry(column[m]).or_insert(fragment.rect.left);
                *left = left.min(fragment.rect.left);
            }
        }

        log::debug!(
            "page {}: {} rows, {} columns, tolerance {:.2}, line height {:.1}, body {:.1}",
            page.number,
            rows.len(),
            columns.len().max(1),
            tolerance,
            line_height,
            body_size
        );

        Ok(PageLayout {
            page: page.number,
            width: page.width,
            height: page.height,
            columns: if columns.len() < 2 {
                Vec::new()
            } else {
                columns.to_vec()
            },
            rows,
            metrics,
            column_lefts: lefts.into_iter().collect(),
        })
    }

    fn assign_columns(
        &self,
        page: &Page,
        columns: &[f32],
        rows: &[Row],
        metrics: &PageMetrics,
    ) -> Vec<u16> {
        let t = self.thresholds;
        let frags = &page.fragments;
        let width = page.width;
        let boundaries: Vec<f32> = columns.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
        let mut column = vec![0u16; frags.len()];

        let members = || rows.iter().flat_map(|r| r.members.iter().copied());

        // Initial assignment
        for m in members() {
            let rect = &frags[m].rect;
            let band = width * t.margin_band_ratio;
            let touches_margins = rect.left <= band && rect.right() >= width - band;
            let wide = rect.width > width * t.full_width_ratio;
            column[m] = if touches_margins || wide {
                0
            } else {
                territory(&boundaries, rect.left)
            };
        }

        // 1. Full width only if the fragment crosses a gutter
        for m in members() {
            if column[m] == 0 && !crosses_gutter(&boundaries, &frags[m]) {
                column[m] = nearest_column(columns, frags[m].rect.center_x());
            }
        }

        // 2. Baseline majority
        for row in rows {
            if row.members.iter().any(|m| column[*m] == 0) {
                for m in &row.members {
                    column[*m] = 0;
                }
            }
        }

        // 3. Vertical-run propagation, top to bottom
        let reach = metrics.line_height * t.run_line_height_factor;
        let footnote_top = page.height * t.footnote_zone_ratio;
        for (r, row) in rows.iter().enumerate() {
            for &m in &row.members {
                if column[m] != 0 {
                    continue;
                }
                let Some(next) = next_below(frags, rows, r, m, reach) else {
                    continue;
                };
                if column[next] == 0 {
                    continue;
                }
                let wide = frags[next].rect.width >= width * t.run_min_width_ratio;
                let in_zone = self.policy == FootnoteZonePolicy::PropagateNarrow
                    && frags[next].rect.top >= footnote_top;
                if wide || in_zone {
                    log::trace!(
                        "page {}: full width propagated to fragment {}",
                        page.number,
                        frags[next].id
                    );
                    column[next] = 0;
                }
            }
        }

        column
    }
}

/// Sequential scan over sorted fragments: a new row starts when a baseline
/// is more than `tolerance` below the row's first baseline.
fn group_rows(frags: &[Fragment], sorted: &[usize], tolerance: f32) -> Vec<Row> {
    let mut rows: Vec<Row> = Vec::new();
    for &i in sorted {
        let baseline = frags[i].baseline();
        match rows.last_mut() {
            Some(row) if baseline - row.baseline <= tolerance => row.members.push(i),
            _ => rows.push(Row {
                index: rows.len(),
                baseline,
                members: vec![i],
            }),
        }
    }
    for row in &mut rows {
        row.members.sort_by(|a, b| {
            frags[*a]
                .rect
                .left
                .total_cmp(&frags[*b].rect.left)
                .then(frags[*a].id.cmp(&frags[*b].id))
        });
    }
    rows
}

/// Column whose territory (delimited by boundary midpoints) holds `x`.
fn territory(boundaries: &[f32], x: f32) -> u16 {
    1 + boundaries.iter().filter(|b| x >= **b).count() as u16
}

fn crosses_gutter(boundaries: &[f32], fragment: &Fragment) -> bool {
    boundaries
        .iter()
        .any(|b| fragment.rect.left < *b && fragment.rect.right() > *b)
}

fn nearest_column(columns: &[f32], x: f32) -> u16 {
    columns
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (*a - x).abs().total_cmp(&(*b - x).abs()))
        .map(|(i, _)| i as u16 + 1)
        .unwrap_or(1)
}

/// Nearest horizontally overlapping fragment in a later row within `reach`.
fn next_below(
    frags: &[Fragment],
    rows: &[Row],
    row: usize,
    current: usize,
    reach: f32,
) -> Option<usize> {
    let cur = &frags[current];
    rows[row + 1..]
        .iter()
        .flat_map(|r| r.members.iter().copied())
        .filter(|c| {
            let f = &frags[*c];
            f.rect.overlaps_horizontally(&cur.rect) && f.rect.top - cur.baseline() <= reach
        })
        .min_by(|a, b| {
            frags[*a]
                .rect
                .top
                .total_cmp(&frags[*b].rect.top)
                .then(reading_cmp(&frags[*a], &frags[*b]))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FontDescriptor, Rect};

    fn frag(page: &mut Page, text: &str, left: f32, top: f32, width: f32) -> usize {
        let id = page.fragments.len();
        let rect = Rect::new(left, top, width, 10.0);
        page.add_fragment(Fragment::text(id, 1, text, rect, FontDescriptor::new("F", 10.0)));
        id
    }

    fn grouper(t: &Thresholds) -> RowGrouper<'_> {
        RowGrouper::new(t, FootnoteZonePolicy::PropagateNarrow)
    }

    #[test]
    fn test_median() {
        assert_eq!(median(vec![3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(vec![4.0, 1.0, 3.0, 2.0]), Some(3.0));
        assert_eq!(median(vec![]), None);
    }

    #[test]
    fn test_adaptive_tolerance_and_rows() {
        let t = Thresholds::default();
        let mut page = Page::letter(1);
        frag(&mut page, "a", 72.0, 100.0, 40.0);
        frag(&mut page, "b", 120.0, 100.5, 40.0); // same row, jitter
        frag(&mut page, "c", 72.0, 114.0, 40.0);
        frag(&mut page, "d", 72.0, 128.0, 40.0);

        let layout = grouper(&t).group(&mut page, &[]).unwrap();
        // gaps 0.5, 13.5, 14 -> median 13.5 -> tolerance min(2, 5.4)
        assert_eq!(layout.metrics.baseline_tolerance, 2.0);
        assert_eq!(layout.rows.len(), 3);
        assert_eq!(layout.rows[0].members, vec![0, 1]);
        assert_eq!(page.fragments[1].row(), Some(0));
        assert_eq!(page.fragments[3].row(), Some(2));
        assert_eq!(layout.metrics.line_height, 14.0);
    }

    #[test]
    fn test_tight_spacing_shrinks_tolerance() {
        let t = Thresholds::default();
        let mut page = Page::letter(1);
        for i in 0..5 {
            frag(&mut page, "x", 72.0, 100.0 + i as f32 * 3.0, 40.0);
        }
        let layout = grouper(&t).group(&mut page, &[]).unwrap();
        assert!((layout.metrics.baseline_tolerance - 1.2).abs() < 1e-4);
        assert_eq!(layout.rows.len(), 5);
    }

    #[test]
    fn test_single_column_page_uses_column_one() {
        let t = Thresholds::default();
        let mut page = Page::letter(1);
        frag(&mut page, "wide heading", 36.0, 80.0, 560.0);
        frag(&mut page, "body", 72.0, 100.0, 300.0);
        let layout = grouper(&t).group(&mut page, &[72.0]).unwrap();
        assert!(page.fragments.iter().all(|f| f.column() == Some(1)));
        assert!(!layout.is_multi_column());
        assert_eq!(layout.column_left(1), Some(36.0));
    }

    #[test]
    fn test_two_column_assignment() {
        let t = Thresholds::default();
        let mut page = Page::letter(1);
        let title = frag(&mut page, "Title across the page", 72.0, 60.0, 468.0);
        let left = frag(&mut page, "left", 72.0, 100.0, 220.0);
        let right = frag(&mut page, "right", 320.0, 100.0, 220.0);
        grouper(&t).group(&mut page, &[72.0, 320.0]).unwrap();

        assert_eq!(page.fragments[title].column(), Some(0));
        assert_eq!(page.fragments[left].column(), Some(1));
        assert_eq!(page.fragments[right].column(), Some(2));
    }

    #[test]
    fn test_full_width_requires_crossing_a_gutter() {
        let t = Thresholds::default();

        // Wide (> 45% of the page) and crossing the gutter at 236
        let mut page = Page::letter(1);
        let f = frag(&mut page, "wide", 10.0, 100.0, 290.0);
        grouper(&t).group(&mut page, &[72.0, 400.0]).unwrap();
        assert_eq!(page.fragments[f].column(), Some(0));

        // Wide but entirely right of the gutter at 136
        let mut page = Page::letter(1);
        let f = frag(&mut page, "wide", 250.0, 100.0, 290.0);
        grouper(&t).group(&mut page, &[72.0, 200.0]).unwrap();
        assert_eq!(page.fragments[f].column(), Some(2));

        // Touches the left margin band only
        let mut page = Page::letter(1);
        let f = frag(&mut page, "narrow", 0.0, 100.0, 190.0);
        grouper(&t).group(&mut page, &[72.0, 320.0]).unwrap();
        assert_eq!(page.fragments[f].column(), Some(1));
    }

    #[test]
    fn test_baseline_majority() {
        let t = Thresholds::default();
        let mut page = Page::letter(1);
        let wide = frag(&mut page, "A line running across", 20.0, 100.0, 560.0);
        let tail = frag(&mut page, "tail", 585.0, 100.0, 20.0);
        grouper(&t).group(&mut page, &[72.0, 320.0]).unwrap();
        assert_eq!(page.fragments[wide].column(), Some(0));
        assert_eq!(page.fragments[tail].column(), Some(0));
    }

    #[test]
    fn test_run_propagation() {
        let t = Thresholds::default();
        let mut page = Page::letter(1);
        let intro = frag(&mut page, "intro", 72.0, 100.0, 468.0);
        // wide continuation (>= 40% of the page) directly below
        let cont = frag(&mut page, "continued", 72.0, 114.0, 250.0);
        // narrow line below that, outside the footnote zone
        let narrow = frag(&mut page, "short", 72.0, 128.0, 100.0);
        grouper(&t).group(&mut page, &[72.0, 320.0]).unwrap();

        assert_eq!(page.fragments[intro].column(), Some(0));
        assert_eq!(page.fragments[cont].column(), Some(0));
        assert_eq!(page.fragments[narrow].column(), Some(1));
    }

    #[test]
    fn test_footnote_zone_policy() {
        let t = Thresholds::default();
        let build = |policy| {
            let mut page = Page::letter(1);
            frag(&mut page, "footnote rule text", 72.0, 700.0, 468.0);
            let narrow = frag(&mut page, "short", 72.0, 714.0, 100.0);
            RowGrouper::new(&t, policy)
                .group(&mut page, &[72.0, 320.0])
                .unwrap();
            page.fragments[narrow].column()
        };
        assert_eq!(build(FootnoteZonePolicy::PropagateNarrow), Some(0));
        assert_eq!(build(FootnoteZonePolicy::RequireWide), Some(1));
    }

    #[test]
    fn test_degenerate_fragments_get_no_slots() {
        let t = Thresholds::default();
        let mut page = Page::letter(1);
        frag(&mut page, "ok", 72.0, 100.0, 40.0);
        let bad = frag(&mut page, "bad", 72.0, 110.0, 40.0);
        page.fragments[bad].degenerate = true;
        grouper(&t).group(&mut page, &[]).unwrap();
        assert_eq!(page.fragments[bad].row(), None);
        assert_eq!(page.fragments[bad].column(), None);
    }

    #[test]
    fn test_regrouping_fails_on_reassignment() {
        let t = Thresholds::default();
        let mut page = Page::letter(1);
        frag(&mut page, "ok", 72.0, 100.0, 40.0);
        grouper(&t).group(&mut page, &[]).unwrap();
        assert!(grouper(&t).group(&mut page, &[]).is_err());
    }
}
