//! Column detection by clustering left edges.

use crate::model::Fragment;
use crate::parser::Thresholds;

/// A cluster of left-edge positions.
#[derive(Debug, Clone)]
struct Cluster {
    sum: f32,
    /// (left, baseline) of each member
    members: Vec<(f32, f32)>,
}

impl Cluster {
    fn new(left: f32, baseline: f32) -> Self {
        Self {
            sum: left,
            members: vec![(left, baseline)],
        }
    }

    fn mean(&self) -> f32 {
        self.sum / self.members.len() as f32
    }

    fn len(&self) -> usize {
        self.members.len()
    }

    fn push(&mut self, left: f32, baseline: f32) {
        self.sum += left;
        self.members.push((left, baseline));
    }

    fn absorb(&mut self, other: Cluster) {
        self.sum += other.sum;
        self.members.extend(other.members);
    }

    /// Number of distinct baseline groups among the members.
    fn baseline_groups(&self, tolerance: f32) -> usize {
        let mut baselines: Vec<f32> = self.members.iter().map(|(_, b)| *b).collect();
        baselines.sort_by(f32::total_cmp);
        let mut groups = 0;
        let mut last: Option<f32> = None;
        for b in baselines {
            if last.map_or(true, |l| b - l > tolerance) {
                groups += 1;
            }
            last = Some(b);
        }
        groups
    }
}

/// Clusters horizontal positions into column bands.
pub struct ColumnDetector<'a> {
    thresholds: &'a Thresholds,
}

impl<'a> ColumnDetector<'a> {
    /// Create a detector.
    pub fn new(thresholds: &'a Thresholds) -> Self {
        Self { thresholds }
    }

    /// Detect column centers on one page.
    ///
    /// Returns the mean left edge of every surviving cluster, ascending. An
    /// empty or single-element result means the page is single-column.
    /// Fragments that carry no layout signal are ignored.
    pub fn detect(&self, fragments: &[Fragment], page_width: f32) -> Vec<f32> {
        let t = self.thresholds;
        let mut points: Vec<(f32, f32)> = fragments
            .iter()
            .filter(|f| f.contributes_layout())
            .map(|f| (f.rect.left, f.baseline()))
            .collect();
        if points.is_empty() {
            return Vec::new();
        }
        let total = points.len();
        points.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));

        // Greedy clustering on sorted left edges
        let radius = page_width * t.column_cluster_ratio;
        let mut clusters: Vec<Cluster> = Vec::new();
        for (left, baseline) in points {
            match clusters.last_mut() {
                Some(c) if (left - c.mean()).abs() < radius => c.push(left, baseline),
                _ => clusters.push(Cluster::new(left, baseline)),
            }
        }
        let formed = clusters.len();

        // Reject clusters without enough vertical extent
        clusters.retain(|c| {
            c.baseline_groups(t.column_baseline_tolerance) >= t.column_min_baseline_groups
        });
        if clusters.is_empty() {
            log::trace!("{formed} clusters, none with enough vertical extent");
            return Vec::new();
        }

        // Cap the number of clusters by merging the closest pair
        while clusters.len() > t.max_columns {
            let Some(i) = closest_pair(&clusters) else {
                break;
            };
            let right = clusters.remove(i + 1);
            clusters[i].absorb(right);
        }

        // Fold minor clusters into their nearest major cluster
        let minor_limit = t
            .minor_cluster_min
            .max((total as f32 * t.minor_cluster_ratio).ceil() as usize);
        let (mut major, minor): (Vec<Cluster>, Vec<Cluster>) =
            clusters.into_iter().partition(|c| c.len() >= minor_limit);
        if major.is_empty() {
            log::trace!("no cluster reaches {minor_limit} fragments; single column");
            return Vec::new();
        }
        for cluster in minor {
            let mean = cluster.mean();
            let nearest = major
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    (a.mean() - mean).abs().total_cmp(&(b.mean() - mean).abs())
                })
                .map(|(i, _)| i)
                .unwrap_or(0);
            major[nearest].absorb(cluster);
        }

        let mut centers: Vec<f32> = major.iter().map(Cluster::mean).collect();
        centers.sort_by(f32::total_cmp);
        centers
    }
}

/// Index of the left cluster of the adjacent pair with the closest means.
fn closest_pair(clusters: &[Cluster]) -> Option<usize> {
    clusters
        .windows(2)
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            (a[1].mean() - a[0].mean()).total_cmp(&(b[1].mean() - b[0].mean()))
        })
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FontDescriptor, Rect};

    fn lines(lefts: &[f32], rows: usize, width: f32) -> Vec<Fragment> {
        let mut out = Vec::new();
        for r in 0..rows {
            for left in lefts {
                let rect = Rect::new(*left, 72.0 + r as f32 * 14.0, width, 10.0);
                let font = FontDescriptor::new("F", 10.0);
                out.push(Fragment::text(out.len(), 1, "text", rect, font));
            }
        }
        out
    }

    #[test]
    fn test_single_column() {
        let t = Thresholds::default();
        let frags = lines(&[72.0], 30, 450.0);
        let columns = ColumnDetector::new(&t).detect(&frags, 612.0);
        assert_eq!(columns.len(), 1);
        assert!((columns[0] - 72.0).abs() < 0.01);
    }

    #[test]
    fn test_two_columns() {
        let t = Thresholds::default();
        let frags = lines(&[72.0, 320.0], 30, 220.0);
        let columns = ColumnDetector::new(&t).detect(&frags, 612.0);
        assert_eq!(columns, vec![72.0, 320.0]);
    }

    #[test]
    fn test_short_cluster_rejected() {
        let t = Thresholds::default();
        let mut frags = lines(&[72.0], 30, 220.0);
        // a margin note spanning only 5 baselines
        frags.extend(lines(&[540.0], 5, 40.0));
        let columns = ColumnDetector::new(&t).detect(&frags, 612.0);
        assert_eq!(columns.len(), 1);
    }

    #[test]
    fn test_too_few_rows_is_single_column() {
        let t = Thresholds::default();
        let frags = lines(&[72.0, 320.0], 8, 220.0);
        assert!(ColumnDetector::new(&t).detect(&frags, 612.0).is_empty());
    }

    #[test]
    fn test_minor_cluster_folded_into_nearest_major() {
        let t = Thresholds::default();
        let mut frags = lines(&[72.0], 30, 150.0);
        // Tall enough to survive the extent check, too small to be major
        frags.extend(lines(&[250.0], 13, 150.0));
        let columns = ColumnDetector::new(&t).detect(&frags, 612.0);
        assert_eq!(columns.len(), 1);
        // The absorbed lefts pull the surviving mean to the right
        let expected = (30.0 * 72.0 + 13.0 * 250.0) / 43.0;
        assert!((columns[0] - expected).abs() < 0.01);
    }

    #[test]
    fn test_cluster_cap() {
        let t = Thresholds {
            max_columns: 2,
            column_cluster_ratio: 0.05,
            ..Default::default()
        };
        let frags = lines(&[50.0, 250.0, 300.0], 20, 40.0);
        let columns = ColumnDetector::new(&t).detect(&frags, 612.0);
        assert_eq!(columns.len(), 2);
        assert!((columns[1] - 275.0).abs() < 0.01);
    }

    #[test]
    fn test_degenerate_ignored() {
        let t = Thresholds::default();
        let mut frags = lines(&[72.0], 20, 300.0);
        for f in &mut frags {
            f.degenerate = true;
        }
        assert!(ColumnDetector::new(&t).detect(&frags, 612.0).is_empty());
    }
}
