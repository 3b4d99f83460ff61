//! Quantitation of clustered multiplets
//!
//! Each cluster of filter hits becomes one consensus feature. The peptide
//! intensity ratios come from a linear regression through the origin over
//! the spline-sampled profile intensities, pairing each labelled peptide
//! against the light one; the raw intensity sums are then reconciled with
//! the fitted ratios.

use crate::cluster::GridCluster;
use crate::filter::PatternFilterResult;

/// Simple linear regression through the origin, `y = slope · x`
#[derive(Debug, Default, Clone)]
pub struct OriginRegression {
    sum_xx: f64,
    sum_xy: f64,
    n: usize,
}

impl OriginRegression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, x: f64, y: f64) {
        self.sum_xx += x * x;
        self.sum_xy += x * y;
        self.n += 1;
    }

    /// NaN when under-determined or degenerate, the caller drops the peptide
    pub fn slope(&self) -> f64 {
        if self.n < 2 || self.sum_xx == 0.0 {
            return f64::NAN;
        }
        self.sum_xy / self.sum_xx
    }
}

/// One peptide of a quantified multiplet
#[derive(Debug, Clone)]
pub struct PeptideFeature {
    pub rt: f64,
    pub mz: f64,
    pub intensity: f64,
    pub charge: i32,
    /// Position of the peptide within its multiplet, light = 0
    pub map_index: usize,
    pub quality: f64,
}

/// A quantified multiplet: position of the lightest peptide's mono-isotopic
/// mass trace, the reconciled per-peptide features, and a rough quality in
/// [0, 1] that grows with cluster size.
#[derive(Debug, Clone)]
pub struct ConsensusFeature {
    pub id: u64,
    pub rt: f64,
    pub mz: f64,
    pub intensity: f64,
    pub charge: i32,
    pub quality: f64,
    /// Sequence number of the peak pattern that produced this feature
    pub pattern_id: usize,
    pub cluster_id: usize,
    pub features: Vec<PeptideFeature>,
}

/// Peptide intensities from the profile-intensity table, one row per
/// peptide, columns aligned across peptides. Ratios are fitted light
/// against labelled over the pairwise non-NaN columns, then the raw sums
/// are corrected to agree with the fit.
///
/// Panics if the rows are not the same length; the filter emits aligned
/// rows by construction.
pub fn peptide_intensities(profile_intensities: &[Vec<f64>]) -> Vec<f64> {
    let count = profile_intensities[0].len();
    for row in profile_intensities {
        assert_eq!(row.len(), count, "misaligned profile intensity rows");
    }

    let mut ratios = Vec::with_capacity(profile_intensities.len());
    let mut intensities = Vec::with_capacity(profile_intensities.len());
    for row in profile_intensities {
        let mut regression = OriginRegression::new();
        let mut intensity = 0.0;
        for (light, value) in profile_intensities[0].iter().zip(row.iter()) {
            if light.is_nan() || value.is_nan() {
                continue;
            }
            regression.add(*light, *value);
            intensity += value;
        }
        ratios.push(regression.slope());
        intensities.push(intensity);
    }

    match intensities.len() {
        1 => vec![intensities[0]],
        2 => {
            let r = ratios[1];
            if r.is_nan() {
                // degenerate fit, the labelled peptide drops out
                return vec![intensities[0], f64::NAN];
            }
            let light = (intensities[0] + r * intensities[1]) / (1.0 + r * r);
            vec![light, r * light]
        }
        _ => {
            // light stays fixed, the labelled peptides follow their ratios;
            // a NaN ratio drops its peptide
            let mut corrected = vec![intensities[0]];
            corrected.extend(ratios.iter().skip(1).map(|r| r * intensities[0]));
            corrected
        }
    }
}

/// Turn one cluster into a consensus feature. `pattern_id` is the sequence
/// number of the peak pattern within the run, used only as a stable sort
/// key downstream.
pub fn quantify_cluster(
    result: &PatternFilterResult,
    cluster: &GridCluster,
    pattern_id: usize,
    cluster_id: usize,
) -> ConsensusFeature {
    let pattern = &result.pattern;
    let n_peptides = pattern.peptide_count();
    let k_max = pattern.isotopes_per_peptide;

    // centre of mass of each peptide's mono-isotopic trace
    let mut sum_intensity_mz = vec![0.0; n_peptides];
    let mut sum_intensity_rt = vec![0.0; n_peptides];
    let mut sum_intensity = vec![0.0; n_peptides];
    // profile intensity table for the regression
    let mut profile_intensities: Vec<Vec<f64>> = vec![Vec::new(); n_peptides];

    for &point in &cluster.points {
        let peak = &result.peaks[point];
        for peptide in 0..n_peptides {
            let mono = pattern.isotope_slot(peptide, 0);
            let intensity = peak.intensities[mono];
            let shift = peak.mz_shifts[mono];
            if !intensity.is_nan() && !shift.is_nan() {
                sum_intensity_mz[peptide] += (peak.mz + shift) * intensity;
                sum_intensity_rt[peptide] += peak.rt * intensity;
                sum_intensity[peptide] += intensity;
            }
        }
        for raw in &peak.raws {
            for isotope in 0..k_max {
                for (peptide, row) in profile_intensities.iter_mut().enumerate() {
                    row.push(raw.intensities[pattern.isotope_slot(peptide, isotope)]);
                }
            }
        }
    }

    let corrected = peptide_intensities(&profile_intensities);
    let quality = (1.0 - 1.0 / cluster.len() as f64).clamp(0.0, 1.0);

    let light_rt = sum_intensity_rt[0] / sum_intensity[0];
    let light_mz = sum_intensity_mz[0] / sum_intensity[0];

    let features: Vec<PeptideFeature> = (0..n_peptides)
        .map(|peptide| {
            let (rt, mz) = if sum_intensity[peptide] > 0.0 {
                (
                    sum_intensity_rt[peptide] / sum_intensity[peptide],
                    sum_intensity_mz[peptide] / sum_intensity[peptide],
                )
            } else {
                // mono-isotope absent across the whole cluster, fall back to
                // the expected position
                (
                    light_rt,
                    light_mz + pattern.mass_pattern.shift(peptide) / pattern.charge as f64,
                )
            };
            PeptideFeature {
                rt,
                mz,
                intensity: corrected[peptide],
                charge: pattern.charge,
                map_index: peptide,
                quality,
            }
        })
        .collect();

    // dropped peptides do not count towards the consensus intensity
    let quantified: Vec<f64> = corrected.iter().copied().filter(|i| !i.is_nan()).collect();
    let intensity = if quantified.is_empty() {
        f64::NAN
    } else {
        quantified.iter().sum::<f64>() / quantified.len() as f64
    };

    ConsensusFeature {
        id: 0,
        rt: light_rt,
        mz: light_mz,
        intensity,
        charge: pattern.charge,
        quality,
        pattern_id,
        cluster_id,
        features,
    }
}
