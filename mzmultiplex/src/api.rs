//! High level API for running the multiplet detection pipeline
//!
//! [`MultiplexEngine`] ties the components together: it enumerates the peak
//! patterns once, then fans the per-pattern filter → cluster → quantify
//! pipeline out over a thread pool. The spectrum grid is shared read-only;
//! each worker owns its averagine cache. The merged output is sorted by
//! (RT, m/z) with a fixed tie order, so identical inputs produce identical
//! output no matter how the work was scheduled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::cluster::GridClusterer;
use crate::config::MultiplexParams;
use crate::error::MultiplexError;
use crate::filter::{PatternFilter, PatternFilterResult};
use crate::grid::SpectrumGrid;
use crate::isotopic_model::CachingAveragine;
use crate::labels::SampleDescription;
use crate::pattern::{generate_mass_patterns, generate_peak_patterns};
use crate::quantify::{quantify_cluster, ConsensusFeature, PeptideFeature};
use crate::spline::SplineProfile;

/// Cooperative cancellation flag, checked between spectra and between
/// cluster constructions. Cancelled runs return
/// [`MultiplexError::Cancelled`]; partial results are dropped.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The full output of a run: consensus features sorted by (RT, m/z), ids
/// assigned after the sort.
#[derive(Debug, Clone, Default)]
pub struct MultiplexSolution {
    pub consensus: Vec<ConsensusFeature>,
}

impl MultiplexSolution {
    pub fn len(&self) -> usize {
        self.consensus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consensus.is_empty()
    }

    /// The per-peptide feature map: every peptide of every multiplet, sorted
    /// by (RT, m/z) with the same tie order as the consensus map.
    pub fn peptide_features(&self) -> Vec<PeptideFeature> {
        let mut features: Vec<(usize, usize, PeptideFeature)> = self
            .consensus
            .iter()
            .flat_map(|c| {
                c.features
                    .iter()
                    .map(|f| (c.pattern_id, c.cluster_id, f.clone()))
            })
            .collect();
        features.sort_by(|(pa, ca, a), (pb, cb, b)| {
            a.rt.total_cmp(&b.rt)
                .then_with(|| a.mz.total_cmp(&b.mz))
                .then_with(|| (pa, ca, a.map_index).cmp(&(pb, cb, b.map_index)))
        });
        features.into_iter().map(|(_, _, f)| f).collect()
    }
}

/// The engine for one validated parameter set, reusable across grids
#[derive(Debug, Clone)]
pub struct MultiplexEngine {
    params: MultiplexParams,
}

impl MultiplexEngine {
    /// Validates the parameters and the sample description up front, so a
    /// misconfigured run fails before any data is touched.
    pub fn new(mut params: MultiplexParams) -> Result<Self, MultiplexError> {
        params.validate()?;
        SampleDescription::parse(&params.labels, &params.label_table)?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &MultiplexParams {
        &self.params
    }

    pub fn run(&self, grid: &SpectrumGrid) -> Result<MultiplexSolution, MultiplexError> {
        self.run_cancellable(grid, &CancellationToken::new())
    }

    pub fn run_cancellable(
        &self,
        grid: &SpectrumGrid,
        token: &CancellationToken,
    ) -> Result<MultiplexSolution, MultiplexError> {
        let description = SampleDescription::parse(&self.params.labels, &self.params.label_table)?;
        let mass_patterns = generate_mass_patterns(&description, &self.params)?;
        let patterns = generate_peak_patterns(&mass_patterns, &self.params);
        info!(
            "Searching {} peak patterns from {} mass patterns over {} spectra",
            patterns.len(),
            mass_patterns.len(),
            grid.len()
        );
        for pattern in &mass_patterns {
            debug!("mass pattern: {:?}", pattern.shifts());
        }

        let profiles: Vec<SplineProfile> = grid
            .spectra()
            .par_iter()
            .map(SplineProfile::new)
            .collect();
        let filter = PatternFilter::new(grid, &profiles, &self.params);
        let clusterer = GridClusterer::new(&self.params, grid.mz_center());

        let per_pattern: Vec<Vec<ConsensusFeature>> = patterns
            .par_iter()
            .enumerate()
            .map(|(pattern_id, pattern)| {
                let mut averagine = CachingAveragine::peptide();
                let mut peaks = Vec::new();
                for spectrum in 0..grid.len() {
                    if token.is_cancelled() {
                        return Err(MultiplexError::Cancelled);
                    }
                    filter.filter_spectrum(pattern, &mut averagine, spectrum, &mut peaks);
                }
                let result = PatternFilterResult {
                    pattern: pattern.clone(),
                    peaks,
                };
                let clusters = clusterer.cluster(&result);
                let mut features = Vec::with_capacity(clusters.len());
                for (cluster_id, cluster) in &clusters {
                    if token.is_cancelled() {
                        return Err(MultiplexError::Cancelled);
                    }
                    features.push(quantify_cluster(&result, cluster, pattern_id, *cluster_id));
                }
                Ok(features)
            })
            .collect::<Result<_, _>>()?;

        let mut consensus: Vec<ConsensusFeature> = per_pattern.into_iter().flatten().collect();
        consensus.sort_by(|a, b| {
            a.rt.total_cmp(&b.rt)
                .then_with(|| a.mz.total_cmp(&b.mz))
                .then_with(|| (a.pattern_id, a.cluster_id).cmp(&(b.pattern_id, b.cluster_id)))
        });
        for (id, feature) in consensus.iter_mut().enumerate() {
            feature.id = id as u64;
        }
        info!("Found {} consensus features", consensus.len());

        Ok(MultiplexSolution { consensus })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::MultiplexParams;

    #[test]
    fn test_engine_rejects_unknown_label() {
        let params = MultiplexParams {
            labels: "[][Lys9]".into(),
            ..Default::default()
        };
        assert!(matches!(
            MultiplexEngine::new(params),
            Err(MultiplexError::UnknownLabel(_))
        ));
    }

    #[test]
    fn test_engine_rejects_mixed_labelling() {
        let params = MultiplexParams {
            labels: "[Lys8][Dimethyl4]".into(),
            ..Default::default()
        };
        assert!(matches!(
            MultiplexEngine::new(params),
            Err(MultiplexError::MixedLabelling(_))
        ));
    }

    #[test]
    fn test_cancellation_token() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
