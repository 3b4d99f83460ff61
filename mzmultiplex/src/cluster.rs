//! Grid-based clustering of filter hits in the (RT, m/z) plane
//!
//! The probe positions one pattern accepts trace out the mono-isotopic mass
//! trace of each multiplet. Hits are binned onto a coarse grid and cells are
//! merged agglomeratively: two cells join when their point centroids lie
//! within one elution width in RT and one scaled tolerance in m/z, so a long
//! trace grows through its chain of neighbouring cells. Merges are applied
//! in ascending distance order with a fixed tie order, keeping the outcome
//! independent of input and scheduling order.

use std::collections::BTreeMap;

use crate::config::{MultiplexParams, MzUnit};
use crate::filter::PatternFilterResult;

/// One cluster of filter-hit indices
#[derive(Debug, Clone)]
pub struct GridCluster {
    /// Indices into the pattern's [`PatternFilterResult::peaks`], ascending
    pub points: Vec<usize>,
    pub centroid_rt: f64,
    pub centroid_mz: f64,
    pub rt_start: f64,
    pub rt_end: f64,
}

impl GridCluster {
    fn from_points(points: Vec<usize>, positions: &[(f64, f64)]) -> Self {
        let n = points.len() as f64;
        let (mut sum_rt, mut sum_mz) = (0.0, 0.0);
        let mut rt_start = f64::INFINITY;
        let mut rt_end = f64::NEG_INFINITY;
        for &p in &points {
            let (rt, mz) = positions[p];
            sum_rt += rt;
            sum_mz += mz;
            rt_start = rt_start.min(rt);
            rt_end = rt_end.max(rt);
        }
        Self {
            points,
            centroid_rt: sum_rt / n,
            centroid_mz: sum_mz / n,
            rt_start,
            rt_end,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn rt_span(&self) -> f64 {
        self.rt_end - self.rt_start
    }
}

/// The clusterer for one pattern's filter results
pub struct GridClusterer {
    rt_typical: f64,
    rt_min: f64,
    mz_cell: f64,
}

impl GridClusterer {
    /// Cell sizes derive from the typical elution width and the search
    /// tolerance scaled to the centre of the measured m/z range.
    pub fn new(params: &MultiplexParams, mz_center: f64) -> Self {
        let mz_cell = match params.mz_unit {
            MzUnit::PPM => params.mz_tolerance * 1e-6 * mz_center,
            MzUnit::Da => params.mz_tolerance,
        };
        Self {
            rt_typical: params.rt_typical.max(f64::EPSILON),
            rt_min: params.rt_min,
            mz_cell: mz_cell.max(f64::EPSILON),
        }
    }

    /// Cluster one pattern's hits. Returns `cluster id → cluster`, ids
    /// assigned in (RT, m/z) order of the cluster centroids.
    pub fn cluster(&self, result: &PatternFilterResult) -> BTreeMap<usize, GridCluster> {
        let positions: Vec<(f64, f64)> = result.peaks.iter().map(|p| (p.rt, p.mz)).collect();

        // bin onto the coarse grid; BTreeMap iteration fixes the cell order
        let mut cells: BTreeMap<(i64, i64), Vec<usize>> = BTreeMap::new();
        for (index, (rt, mz)) in positions.iter().enumerate() {
            let cell = (
                (rt / self.rt_typical).floor() as i64,
                (mz / self.mz_cell).floor() as i64,
            );
            cells.entry(cell).or_default().push(index);
        }
        let seeds: Vec<GridCluster> = cells
            .into_values()
            .map(|points| GridCluster::from_points(points, &positions))
            .collect();

        // collect every mergeable cell pair, ascending distance in grid
        // units, ties by the (rt, mz) of the endpoints
        let mut edges: Vec<(f64, usize, usize)> = Vec::new();
        for i in 0..seeds.len() {
            for j in i + 1..seeds.len() {
                let drt = (seeds[i].centroid_rt - seeds[j].centroid_rt).abs();
                let dmz = (seeds[i].centroid_mz - seeds[j].centroid_mz).abs();
                if drt <= self.rt_typical && dmz <= self.mz_cell {
                    let x = drt / self.rt_typical;
                    let y = dmz / self.mz_cell;
                    edges.push(((x * x + y * y).sqrt(), i, j));
                }
            }
        }
        edges.sort_by(|a, b| {
            a.0.total_cmp(&b.0).then_with(|| {
                let ka = (
                    seeds[a.1].centroid_rt,
                    seeds[a.1].centroid_mz,
                    seeds[a.2].centroid_rt,
                    seeds[a.2].centroid_mz,
                );
                let kb = (
                    seeds[b.1].centroid_rt,
                    seeds[b.1].centroid_mz,
                    seeds[b.2].centroid_rt,
                    seeds[b.2].centroid_mz,
                );
                ka.partial_cmp(&kb).unwrap()
            })
        });

        let mut merger = UnionFind::new(seeds.len());
        for (_, i, j) in edges {
            merger.union(i, j);
        }

        let mut grouped: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, seed) in seeds.iter().enumerate() {
            grouped
                .entry(merger.find(i))
                .or_default()
                .extend(seed.points.iter().copied());
        }

        let mut clusters: Vec<GridCluster> = grouped
            .into_values()
            .map(|mut points| {
                points.sort_unstable();
                GridCluster::from_points(points, &positions)
            })
            .filter(|c| c.rt_span() >= self.rt_min)
            .collect();
        clusters.sort_by(|a, b| {
            (a.centroid_rt, a.centroid_mz)
                .partial_cmp(&(b.centroid_rt, b.centroid_mz))
                .unwrap()
        });
        clusters.into_iter().enumerate().collect()
    }
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, i: usize, j: usize) {
        let ri = self.find(i);
        let rj = self.find(j);
        // the smaller root wins, keeping labels stable
        if ri < rj {
            self.parent[rj] = ri;
        } else {
            self.parent[ri] = rj;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::filter::{PatternFilterPeak, PatternFilterResult};
    use crate::grid::PeakRef;
    use crate::pattern::{MassPattern, PeakPattern};

    fn result_with_points(points: &[(f64, f64)]) -> PatternFilterResult {
        let pattern = PeakPattern::new(
            2,
            3,
            MassPattern::singlet(),
            0,
            crate::config::ISOTOPE_SPACING,
        );
        let peaks = points
            .iter()
            .map(|(rt, mz)| PatternFilterPeak {
                rt: *rt,
                mz: *mz,
                probe: PeakRef {
                    spectrum: 0,
                    peak: 0,
                },
                peak_refs: vec![],
                intensities: vec![],
                mz_shifts: vec![],
                raws: vec![],
            })
            .collect();
        PatternFilterResult { pattern, peaks }
    }

    fn params() -> MultiplexParams {
        MultiplexParams {
            rt_typical: 30.0,
            rt_min: 5.0,
            mz_tolerance: 10.0,
            mz_unit: MzUnit::PPM,
            ..Default::default()
        }
    }

    #[test]
    fn test_one_mass_trace_one_cluster() {
        // a 100 s trace spans several grid cells, joined through the chain
        let points: Vec<(f64, f64)> = (0..11).map(|i| (100.0 + 10.0 * i as f64, 500.0)).collect();
        let result = result_with_points(&points);
        let clusters = GridClusterer::new(&params(), 500.0).cluster(&result);
        assert_eq!(clusters.len(), 1);
        let cluster = &clusters[&0];
        assert_eq!(cluster.len(), 11);
        assert_eq!(cluster.points, (0..11).collect::<Vec<_>>());
        assert!((cluster.centroid_rt - 150.0).abs() < 1e-9);
        assert!((cluster.rt_span() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_distant_mz_stays_separate() {
        let mut points: Vec<(f64, f64)> =
            (0..5).map(|i| (100.0 + 10.0 * i as f64, 500.0)).collect();
        points.extend((0..5).map(|i| (100.0 + 10.0 * i as f64, 600.0)));
        let result = result_with_points(&points);
        let clusters = GridClusterer::new(&params(), 550.0).cluster(&result);
        assert_eq!(clusters.len(), 2);
        assert!(clusters[&0].centroid_mz < clusters[&1].centroid_mz);
    }

    #[test]
    fn test_rt_gap_splits_traces() {
        let mut points: Vec<(f64, f64)> =
            (0..4).map(|i| (100.0 + 10.0 * i as f64, 500.0)).collect();
        points.extend((0..4).map(|i| (400.0 + 10.0 * i as f64, 500.0)));
        let result = result_with_points(&points);
        let clusters = GridClusterer::new(&params(), 500.0).cluster(&result);
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn test_short_cluster_discarded() {
        let points = [(100.0, 500.0), (101.0, 500.0)];
        let result = result_with_points(&points);
        let clusters = GridClusterer::new(&params(), 500.0).cluster(&result);
        assert!(clusters.is_empty());
    }

    #[test]
    fn test_deterministic_under_input_permutation() {
        let forward: Vec<(f64, f64)> =
            (0..8).map(|i| (100.0 + 12.0 * i as f64, 500.0)).collect();
        let mut reversed = forward.clone();
        reversed.reverse();

        let a = GridClusterer::new(&params(), 500.0).cluster(&result_with_points(&forward));
        let b = GridClusterer::new(&params(), 500.0).cluster(&result_with_points(&reversed));
        assert_eq!(a.len(), b.len());
        for (id, cluster) in &a {
            let other = &b[id];
            assert_eq!(cluster.centroid_rt, other.centroid_rt);
            assert_eq!(cluster.centroid_mz, other.centroid_mz);
            assert_eq!(cluster.len(), other.len());
        }
    }
}
