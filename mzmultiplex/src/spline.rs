//! Spline-interpolated access to the raw profile signal
//!
//! The filter needs intensities at arbitrary m/z positions, not just at the
//! recorded profile points. For every centroid a natural cubic spline is fit
//! through the raw points inside the centroid's boundary; evaluation outside
//! every boundary is 0.

use crate::grid::{GridSpectrum, PeakBoundary};

/// One centroid's spline: the profile points under it and the second
/// derivatives of the interpolant at those points.
#[derive(Debug, Clone)]
struct SplineSegment {
    boundary: PeakBoundary,
    x: Vec<f64>,
    y: Vec<f64>,
    y2: Vec<f64>,
}

impl SplineSegment {
    fn new(x: Vec<f64>, y: Vec<f64>, boundary: PeakBoundary) -> Self {
        let y2 = natural_second_derivatives(&x, &y);
        Self { boundary, x, y, y2 }
    }

    fn contains(&self, mz: f64) -> bool {
        self.boundary.contains(mz)
    }

    fn eval(&self, mz: f64) -> f64 {
        match self.x.len() {
            0 => 0.0,
            1 => self.y[0],
            _ => {
                let hi = self
                    .x
                    .partition_point(|x| *x < mz)
                    .clamp(1, self.x.len() - 1);
                let lo = hi - 1;
                let h = self.x[hi] - self.x[lo];
                let a = (self.x[hi] - mz) / h;
                let b = (mz - self.x[lo]) / h;
                a * self.y[lo]
                    + b * self.y[hi]
                    + ((a * a * a - a) * self.y2[lo] + (b * b * b - b) * self.y2[hi]) * h * h
                        / 6.0
            }
        }
    }
}

/// Second derivatives of a natural cubic spline through `(x, y)`, by the
/// usual tridiagonal forward sweep / back substitution.
fn natural_second_derivatives(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();
    let mut y2 = vec![0.0; n];
    if n < 3 {
        return y2;
    }
    let mut u = vec![0.0; n - 1];
    for i in 1..n - 1 {
        let sig = (x[i] - x[i - 1]) / (x[i + 1] - x[i - 1]);
        let p = sig * y2[i - 1] + 2.0;
        y2[i] = (sig - 1.0) / p;
        let du = (y[i + 1] - y[i]) / (x[i + 1] - x[i]) - (y[i] - y[i - 1]) / (x[i] - x[i - 1]);
        u[i] = (6.0 * du / (x[i + 1] - x[i - 1]) - sig * u[i - 1]) / p;
    }
    y2[n - 1] = 0.0;
    for k in (0..n - 1).rev() {
        y2[k] = y2[k] * y2[k + 1] + u[k];
    }
    y2
}

/// Spline interpolants for every centroid of one spectrum
#[derive(Debug, Clone)]
pub struct SplineProfile {
    segments: Vec<SplineSegment>,
}

impl SplineProfile {
    pub fn new(spectrum: &GridSpectrum) -> Self {
        let segments = (0..spectrum.len())
            .map(|i| {
                let boundary = spectrum.boundary(i);
                let (x, y) = spectrum.profile_points(boundary);
                SplineSegment::new(x.to_vec(), y.to_vec(), boundary)
            })
            .collect();
        Self { segments }
    }

    /// Interpolated intensity at `mz`, 0 outside every centroid's boundary.
    ///
    /// Boundaries of neighbouring centroids do not overlap, so at most one
    /// segment can contain the position.
    pub fn intensity(&self, mz: f64) -> f64 {
        let idx = self.segments.partition_point(|s| s.boundary.mz_min <= mz);
        if idx == 0 {
            return 0.0;
        }
        let segment = &self.segments[idx - 1];
        if segment.contains(mz) {
            segment.eval(mz)
        } else {
            0.0
        }
    }

    /// Interpolated intensity inside the boundary of a specific centroid
    pub fn intensity_in(&self, peak: usize, mz: f64) -> f64 {
        let segment = &self.segments[peak];
        if segment.contains(mz) {
            segment.eval(mz)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::grid::GridSpectrum;
    use mzpeaks::CentroidPeak;

    fn gauss(x: f64, center: f64, sigma: f64) -> f64 {
        (-(x - center).powi(2) / (2.0 * sigma * sigma)).exp()
    }

    /// Two Gaussian packages sampled at 0.1 m/z steps
    fn two_package_spectrum() -> GridSpectrum {
        let mut raw_mz = Vec::new();
        let mut raw_intensity = Vec::new();
        for i in 0..11 {
            let mz = 416.3 + 0.1 * i as f64;
            raw_mz.push(mz);
            raw_intensity.push(gauss(mz, 416.8, 0.15));
        }
        for i in 0..11 {
            let mz = 418.2 + 0.1 * i as f64;
            raw_mz.push(mz);
            raw_intensity.push(gauss(mz, 418.7, 0.15));
        }
        GridSpectrum::new(
            100.0,
            raw_mz,
            raw_intensity,
            vec![
                CentroidPeak::new(416.8, 1.0, 0),
                CentroidPeak::new(418.7, 1.0, 1),
            ],
            vec![
                PeakBoundary::new(416.3, 417.3),
                PeakBoundary::new(418.2, 419.2),
            ],
        )
    }

    #[test]
    fn test_zero_outside_boundaries() {
        let profile = SplineProfile::new(&two_package_spectrum());
        assert_eq!(profile.intensity(400.0), 0.0);
        // the gap between the packages
        assert_eq!(profile.intensity(417.8), 0.0);
        assert_eq!(profile.intensity(500.0), 0.0);
    }

    #[test]
    fn test_matches_profile_points() {
        let profile = SplineProfile::new(&two_package_spectrum());
        // the interpolant passes through the data, so the apex sample is exact
        assert!((profile.intensity(416.8) - 1.0).abs() < 1e-12);
        let expected = gauss(417.0, 416.8, 0.15);
        assert!((profile.intensity(417.0) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_interpolation_between_points() {
        let profile = SplineProfile::new(&two_package_spectrum());
        let at = 416.81;
        let expected = gauss(at, 416.8, 0.15);
        let got = profile.intensity(at);
        assert!(
            (got - expected).abs() / expected < 0.01,
            "{got} vs {expected}"
        );
    }

    #[test]
    fn test_second_package_independent() {
        let profile = SplineProfile::new(&two_package_spectrum());
        let got = profile.intensity(418.7);
        assert!((got - 1.0).abs() < 1e-12);
        assert_eq!(profile.intensity_in(0, 418.7), 0.0);
        assert!((profile.intensity_in(1, 418.7) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_point_counts() {
        let spectrum = GridSpectrum::new(
            50.0,
            vec![100.0, 100.1, 200.0],
            vec![5.0, 7.0, 3.0],
            vec![
                CentroidPeak::new(100.05, 7.0, 0),
                CentroidPeak::new(200.0, 3.0, 1),
            ],
            vec![
                PeakBoundary::new(100.0, 100.1),
                PeakBoundary::new(199.9, 200.1),
            ],
        );
        let profile = SplineProfile::new(&spectrum);
        // two points: linear
        assert!((profile.intensity(100.05) - 6.0).abs() < 1e-12);
        // one point: constant across the boundary
        assert!((profile.intensity(199.95) - 3.0).abs() < 1e-12);
    }
}
