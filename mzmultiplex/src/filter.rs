//! The multiplet pattern filter
//!
//! For one [`PeakPattern`] the filter scans every centroid of every spectrum
//! as a candidate light mono-isotope and keeps the positions where the whole
//! multiplet is present: every expected isotope peak is found, no stronger
//! peak sits one isotope below the mono, each peptide's envelope resembles
//! the averagine model, and all envelope members share the peak shape of the
//! probe.

use itertools::Itertools;
use tracing::debug;

use crate::config::MultiplexParams;
use crate::grid::{PeakRef, SpectrumGrid};
use crate::isotopic_model::CachingAveragine;
use crate::pattern::PeakPattern;
use crate::spline::SplineProfile;

/// Spline-sampled intensities at one m/z sample position. Slots follow the
/// pattern's flat layout; unmatched slots hold NaN.
#[derive(Debug, Clone)]
pub struct PatternFilterRaw {
    pub mz: f64,
    pub intensities: Vec<f64>,
}

/// One accepted probe position, with everything observed at it.
///
/// `peak_refs`, `intensities` and `mz_shifts` follow the pattern's flat slot
/// layout; missing slots hold `None`/NaN.
#[derive(Debug, Clone)]
pub struct PatternFilterPeak {
    pub rt: f64,
    pub mz: f64,
    pub probe: PeakRef,
    pub peak_refs: Vec<Option<PeakRef>>,
    pub intensities: Vec<f64>,
    pub mz_shifts: Vec<f64>,
    pub raws: Vec<PatternFilterRaw>,
}

/// Every probe position a pattern matched, in (spectrum, peak) scan order
#[derive(Debug, Clone)]
pub struct PatternFilterResult {
    pub pattern: PeakPattern,
    pub peaks: Vec<PatternFilterPeak>,
}

impl PatternFilterResult {
    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }
}

/// The filter over one shared grid. Cheap to construct; one instance serves
/// every pattern.
pub struct PatternFilter<'a> {
    grid: &'a SpectrumGrid,
    profiles: &'a [SplineProfile],
    params: &'a MultiplexParams,
}

impl<'a> PatternFilter<'a> {
    pub fn new(
        grid: &'a SpectrumGrid,
        profiles: &'a [SplineProfile],
        params: &'a MultiplexParams,
    ) -> Self {
        assert_eq!(grid.len(), profiles.len());
        Self {
            grid,
            profiles,
            params,
        }
    }

    /// Run one pattern over the whole grid
    pub fn filter_pattern(
        &self,
        pattern: &PeakPattern,
        averagine: &mut CachingAveragine,
    ) -> PatternFilterResult {
        let mut peaks = Vec::new();
        for spectrum in 0..self.grid.len() {
            self.filter_spectrum(pattern, averagine, spectrum, &mut peaks);
        }
        debug!(
            "pattern {} ({}x charge {}) matched {} positions",
            pattern.id,
            pattern.peptide_count(),
            pattern.charge,
            peaks.len()
        );
        PatternFilterResult {
            pattern: pattern.clone(),
            peaks,
        }
    }

    pub(crate) fn filter_spectrum(
        &self,
        pattern: &PeakPattern,
        averagine: &mut CachingAveragine,
        spectrum: usize,
        out: &mut Vec<PatternFilterPeak>,
    ) {
        let n_peaks = self.grid.spectrum(spectrum).len();
        for peak in 0..n_peaks {
            let probe = PeakRef { spectrum, peak };
            if self.grid.peak_intensity(probe) < self.params.intensity_cutoff {
                continue;
            }
            if let Some(hit) = self.check_candidate(pattern, averagine, probe) {
                out.push(hit);
            }
        }
    }

    fn check_candidate(
        &self,
        pattern: &PeakPattern,
        averagine: &mut CachingAveragine,
        probe: PeakRef,
    ) -> Option<PatternFilterPeak> {
        let probe_mz = self.grid.peak_mz(probe);
        let tolerance = self.params.tolerance();
        let k_max = pattern.isotopes_per_peptide;
        let n_peptides = pattern.peptide_count();

        // resolve every slot to its nearest centroid
        let mut peak_refs: Vec<Option<PeakRef>> = vec![None; pattern.slot_count()];
        let mut intensities = vec![f64::NAN; pattern.slot_count()];
        let mut mz_shifts = vec![f64::NAN; pattern.slot_count()];
        for slot in 0..pattern.slot_count() {
            let expected = probe_mz + pattern.mz_shift(slot);
            if let Some(peak) =
                self.grid
                    .nearest_peak_within(probe.spectrum, expected, tolerance)
            {
                let index = PeakRef {
                    spectrum: probe.spectrum,
                    peak,
                };
                peak_refs[slot] = Some(index);
                intensities[slot] = self.grid.peak_intensity(index);
                mz_shifts[slot] = self.grid.peak_mz(index) - probe_mz;
            }
        }

        // every isotope slot must be present, or at least the configured
        // minimum per peptide when missing peaks are tolerated
        for peptide in 0..n_peptides {
            let present = (0..k_max)
                .filter(|i| peak_refs[pattern.isotope_slot(peptide, *i)].is_some())
                .count();
            if !self.params.allow_missing_peaks && present < k_max {
                return None;
            }
            if present < self.params.isotopes_per_peptide_min {
                return None;
            }
        }

        // the averagine ratios at each peptide's mono-isotope position
        let n_ratios = k_max.max(2);
        let ratios_per_peptide: Vec<Vec<f64>> = (0..n_peptides)
            .map(|peptide| {
                let mono_mz = probe_mz + pattern.mz_shift(pattern.isotope_slot(peptide, 0));
                averagine
                    .isotopic_ratios(mono_mz, pattern.charge, n_ratios)
                    .to_vec()
            })
            .collect();

        // below-mono-isotope veto: a real peak one isotope below the mono,
        // strong enough that the envelope read one step lower would still
        // fit averagine, means the probe is not the true mono-isotope
        for peptide in 0..n_peptides {
            let veto = intensities[pattern.veto_slot(peptide)];
            if veto.is_nan() {
                continue;
            }
            let mono = intensities[pattern.isotope_slot(peptide, 0)];
            let ratios = &ratios_per_peptide[peptide];
            let threshold = mono * (ratios[0] / ratios[1]).min(1.0);
            if mono.is_nan() || veto >= threshold {
                return None;
            }
        }

        // each envelope must resemble the averagine model
        for peptide in 0..n_peptides {
            let observed: Vec<f64> = (0..k_max)
                .map(|i| intensities[pattern.isotope_slot(peptide, i)])
                .collect();
            let similarity = pearson_similarity(&observed, &ratios_per_peptide[peptide][..k_max]);
            if similarity < self.params.averagine_similarity {
                return None;
            }
        }

        // the envelopes of different peptides must resemble each other
        for (p, q) in (0..n_peptides).tuple_combinations() {
            let a: Vec<f64> = (0..k_max)
                .map(|i| intensities[pattern.isotope_slot(p, i)])
                .collect();
            let b: Vec<f64> = (0..k_max)
                .map(|i| intensities[pattern.isotope_slot(q, i)])
                .collect();
            if pearson_similarity(&a, &b) < self.params.peptide_similarity {
                return None;
            }
        }

        // every envelope member must share the probe's profile shape: sample
        // the splines at matching offsets across the probe's boundary and
        // require all pairs of shapes to correlate
        let raws = self.sample_profiles(pattern, probe, &peak_refs, &mz_shifts);
        let sampled_slots: Vec<usize> = (0..n_peptides)
            .flat_map(|p| (0..k_max).map(move |i| (p, i)))
            .map(|(p, i)| pattern.isotope_slot(p, i))
            .filter(|slot| peak_refs[*slot].is_some())
            .collect();
        for (&slot_a, &slot_b) in sampled_slots.iter().tuple_combinations() {
            let shape_a: Vec<f64> = raws.iter().map(|r| r.intensities[slot_a]).collect();
            let shape_b: Vec<f64> = raws.iter().map(|r| r.intensities[slot_b]).collect();
            if pearson_similarity(&shape_a, &shape_b) < self.params.peptide_similarity {
                return None;
            }
        }

        Some(PatternFilterPeak {
            rt: self.grid.rt(probe.spectrum),
            mz: probe_mz,
            probe,
            peak_refs,
            intensities,
            mz_shifts,
            raws,
        })
    }

    /// Spline intensities for every matched slot at regular positions across
    /// the probe centroid's boundary. These samples double as the profile
    /// data quantitation regresses over.
    fn sample_profiles(
        &self,
        pattern: &PeakPattern,
        probe: PeakRef,
        peak_refs: &[Option<PeakRef>],
        mz_shifts: &[f64],
    ) -> Vec<PatternFilterRaw> {
        let spectrum = self.grid.spectrum(probe.spectrum);
        let profile = &self.profiles[probe.spectrum];
        let boundary = spectrum.boundary(probe.peak);
        let (points, _) = spectrum.profile_points(boundary);
        let n_samples = points.len().max(2);
        let step = boundary.width() / (n_samples - 1) as f64;

        (0..n_samples)
            .map(|s| {
                let mz = boundary.mz_min + s as f64 * step;
                let intensities = (0..pattern.slot_count())
                    .map(|slot| match peak_refs[slot] {
                        Some(index) => profile.intensity_in(index.peak, mz + mz_shifts[slot]),
                        None => f64::NAN,
                    })
                    .collect();
                PatternFilterRaw { mz, intensities }
            })
            .collect()
    }
}

/// Pearson correlation over the pairwise non-NaN entries, accumulated with
/// Welford updates for stability. Zero-variance input counts as perfectly
/// correlated, as does an empty overlap.
pub(crate) fn pearson_similarity(x: &[f64], y: &[f64]) -> f64 {
    debug_assert_eq!(x.len(), y.len());
    let mut n = 0.0f64;
    let mut mean_x = 0.0;
    let mut mean_y = 0.0;
    let mut m2_x = 0.0;
    let mut m2_y = 0.0;
    let mut cov = 0.0;
    for (&xi, &yi) in x.iter().zip(y.iter()) {
        if xi.is_nan() || yi.is_nan() {
            continue;
        }
        n += 1.0;
        let dx = xi - mean_x;
        mean_x += dx / n;
        let dy = yi - mean_y;
        mean_y += dy / n;
        m2_x += dx * (xi - mean_x);
        m2_y += dy * (yi - mean_y);
        cov += dx * (yi - mean_y);
    }
    if n == 0.0 || m2_x == 0.0 || m2_y == 0.0 {
        return 1.0;
    }
    cov / (m2_x.sqrt() * m2_y.sqrt())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::grid::{GridSpectrum, PeakBoundary};
    use crate::isotopic_model::Averagine;
    use crate::pattern::MassPattern;
    use mzpeaks::CentroidPeak;

    #[test]
    fn test_pearson_perfect_correlation() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [10.0, 20.0, 30.0, 40.0];
        assert!((pearson_similarity(&x, &y) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pearson_anticorrelation() {
        let x = [1.0, 2.0, 3.0];
        let y = [3.0, 2.0, 1.0];
        assert!((pearson_similarity(&x, &y) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pearson_skips_nan_pairs() {
        let x = [1.0, f64::NAN, 2.0, 3.0];
        let y = [2.0, 100.0, 4.0, 6.0];
        assert!((pearson_similarity(&x, &y) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pearson_zero_variance_is_one() {
        let x = [5.0, 5.0, 5.0];
        let y = [1.0, 2.0, 3.0];
        assert_eq!(pearson_similarity(&x, &y), 1.0);
        assert_eq!(pearson_similarity(&y, &x), 1.0);
    }

    /// Build a spectrum holding Gaussian profile peaks at the given
    /// (m/z, height) positions
    fn synthetic_spectrum(rt: f64, peaks: &[(f64, f64)]) -> GridSpectrum {
        let sigma = 0.01;
        let dx = 0.002;
        let mut raw_mz = Vec::new();
        let mut raw_intensity = Vec::new();
        let mut centroids = Vec::new();
        let mut boundaries = Vec::new();
        for (i, (center, height)) in peaks.iter().enumerate() {
            let lo = center - 4.0 * sigma;
            let mut mz = lo;
            while mz <= center + 4.0 * sigma {
                raw_mz.push(mz);
                raw_intensity
                    .push(height * (-(mz - center).powi(2) / (2.0 * sigma * sigma)).exp());
                mz += dx;
            }
            centroids.push(CentroidPeak::new(*center, *height as f32, i as u32));
            boundaries.push(PeakBoundary::new(
                center - 4.0 * sigma,
                center + 4.0 * sigma,
            ));
        }
        GridSpectrum::new(rt, raw_mz, raw_intensity, centroids, boundaries)
    }

    fn doublet_pattern(k: usize) -> PeakPattern {
        PeakPattern::new(
            2,
            k,
            MassPattern::new(vec![0.0, 8.0141988132]),
            0,
            crate::config::ISOTOPE_SPACING,
        )
    }

    /// A noiseless SILAC doublet at 500 m/z, 2+, with averagine-shaped
    /// envelopes and the given heavy/light ratio
    fn doublet_spectrum(rt: f64, ratio: f64) -> GridSpectrum {
        let mut model = Averagine::peptide();
        let r = model.isotopic_ratios(500.0, 2, 3);
        let spacing = crate::config::ISOTOPE_SPACING / 2.0;
        let shift = 8.0141988132 / 2.0;
        let mut peaks = Vec::new();
        for (i, ri) in r.iter().enumerate() {
            peaks.push((500.0 + i as f64 * spacing, 2.0e4 * ri));
        }
        for (i, ri) in r.iter().enumerate() {
            peaks.push((500.0 + shift + i as f64 * spacing, 2.0e4 * ratio * ri));
        }
        synthetic_spectrum(rt, &peaks)
    }

    fn test_params() -> MultiplexParams {
        MultiplexParams {
            charge_min: 2,
            charge_max: 2,
            isotopes_per_peptide_min: 3,
            isotopes_per_peptide_max: 3,
            intensity_cutoff: 100.0,
            ..Default::default()
        }
    }

    fn run_filter(
        spectra: Vec<GridSpectrum>,
        pattern: &PeakPattern,
        params: &MultiplexParams,
    ) -> PatternFilterResult {
        let grid = SpectrumGrid::new(spectra).unwrap();
        let profiles: Vec<SplineProfile> = grid.iter().map(SplineProfile::new).collect();
        let filter = PatternFilter::new(&grid, &profiles, params);
        let mut averagine = CachingAveragine::peptide();
        filter.filter_pattern(pattern, &mut averagine)
    }

    #[test]
    fn test_doublet_found() {
        let result = run_filter(
            vec![doublet_spectrum(150.0, 1.0)],
            &doublet_pattern(3),
            &test_params(),
        );
        assert_eq!(result.len(), 1);
        let hit = &result.peaks[0];
        assert!((hit.mz - 500.0).abs() < 1e-6);
        assert_eq!(hit.rt, 150.0);
        // all six isotope slots resolved
        let pattern = &result.pattern;
        for peptide in 0..2 {
            for isotope in 0..3 {
                assert!(hit.peak_refs[pattern.isotope_slot(peptide, isotope)].is_some());
            }
        }
        assert!(!hit.raws.is_empty());
    }

    #[test]
    fn test_low_intensity_probe_rejected() {
        let mut params = test_params();
        params.intensity_cutoff = 1.0e9;
        let result = run_filter(
            vec![doublet_spectrum(150.0, 1.0)],
            &doublet_pattern(3),
            &params,
        );
        assert!(result.is_empty());
    }

    #[test]
    fn test_missing_heavy_envelope_rejected() {
        let mut model = Averagine::peptide();
        let r = model.isotopic_ratios(500.0, 2, 3);
        let spacing = crate::config::ISOTOPE_SPACING / 2.0;
        let peaks: Vec<(f64, f64)> = r
            .iter()
            .enumerate()
            .map(|(i, ri)| (500.0 + i as f64 * spacing, 2.0e4 * ri))
            .collect();
        let result = run_filter(
            vec![synthetic_spectrum(150.0, &peaks)],
            &doublet_pattern(3),
            &test_params(),
        );
        assert!(result.is_empty());
    }

    #[test]
    fn test_below_mono_peak_vetoes() {
        // an equal-intensity peak one isotope below the light mono
        let mut model = Averagine::peptide();
        let r = model.isotopic_ratios(500.0, 2, 3);
        let spacing = crate::config::ISOTOPE_SPACING / 2.0;
        let shift = 8.0141988132 / 2.0;
        let mut peaks = vec![(500.0 - spacing, 2.0e4 * r[0])];
        for (i, ri) in r.iter().enumerate() {
            peaks.push((500.0 + i as f64 * spacing, 2.0e4 * ri));
        }
        for (i, ri) in r.iter().enumerate() {
            peaks.push((500.0 + shift + i as f64 * spacing, 2.0e4 * ri));
        }
        let result = run_filter(
            vec![synthetic_spectrum(150.0, &peaks)],
            &doublet_pattern(3),
            &test_params(),
        );
        assert!(result
            .peaks
            .iter()
            .all(|hit| (hit.mz - 500.0).abs() > 1e-6));
    }

    #[test]
    fn test_distorted_envelope_rejected() {
        // an inverted envelope cannot correlate with averagine
        let spacing = crate::config::ISOTOPE_SPACING / 2.0;
        let shift = 8.0141988132 / 2.0;
        let heights = [1.0e3, 5.0e3, 2.0e4];
        let mut peaks = Vec::new();
        for (i, h) in heights.iter().enumerate() {
            peaks.push((500.0 + i as f64 * spacing, *h));
        }
        for (i, h) in heights.iter().enumerate() {
            peaks.push((500.0 + shift + i as f64 * spacing, *h));
        }
        let mut params = test_params();
        params.averagine_similarity = 0.9;
        let result = run_filter(
            vec![synthetic_spectrum(150.0, &peaks)],
            &doublet_pattern(3),
            &params,
        );
        assert!(result.is_empty());
    }

    #[test]
    fn test_dissimilar_peptides_rejected() {
        // light envelope falls, heavy envelope rises
        let spacing = crate::config::ISOTOPE_SPACING / 2.0;
        let shift = 8.0141988132 / 2.0;
        let light = [2.0e4, 1.2e4, 0.5e4];
        let heavy = [0.5e4, 1.2e4, 2.0e4];
        let mut peaks = Vec::new();
        for (i, h) in light.iter().enumerate() {
            peaks.push((500.0 + i as f64 * spacing, *h));
        }
        for (i, h) in heavy.iter().enumerate() {
            peaks.push((500.0 + shift + i as f64 * spacing, *h));
        }
        let mut params = test_params();
        params.averagine_similarity = 0.0;
        params.peptide_similarity = 0.8;
        let result = run_filter(
            vec![synthetic_spectrum(150.0, &peaks)],
            &doublet_pattern(3),
            &params,
        );
        assert!(result.is_empty());
    }
}
