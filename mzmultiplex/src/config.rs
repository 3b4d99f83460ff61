//! Run configuration for the multiplet finder

use mzpeaks::Tolerance;
use tracing::warn;

use crate::error::MultiplexError;
use crate::labels::LabelTable;

/// The unit the `mz_tolerance` parameter is expressed in
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum MzUnit {
    #[default]
    PPM,
    Da,
}

/// The spacing between successive isotopes of a singly charged ion, a
/// rounded C12 → C13 mass difference.
pub const ISOTOPE_SPACING: f64 = 1.00235;

/// The complete parameter set for one run.
///
/// All fields are plain data; [`MultiplexParams::validate`] normalizes the
/// ranges and checks the bounds once, after which the rest of the pipeline
/// may trust them.
#[derive(Debug, Clone)]
pub struct MultiplexParams {
    /// Sample description string, e.g. `"[][Lys8,Arg10]"`. Brackets delimit
    /// samples, labels within a sample are separated by `,;: `.
    pub labels: String,
    /// Minimum charge state searched
    pub charge_min: i32,
    /// Maximum charge state searched
    pub charge_max: i32,
    /// Fewest isotopic peaks a peptide must show
    pub isotopes_per_peptide_min: usize,
    /// Most isotopic peaks considered per peptide
    pub isotopes_per_peptide_max: usize,
    /// Typical retention time width of an eluting peptide, in seconds
    pub rt_typical: f64,
    /// Minimum retention time span of a cluster, shorter clusters are dropped
    pub rt_min: f64,
    /// m/z search tolerance, in `mz_unit` units
    pub mz_tolerance: f64,
    pub mz_unit: MzUnit,
    /// Intensity floor for the mono-isotopic anchor peak
    pub intensity_cutoff: f64,
    /// Lower bound on the isotope-profile correlation between peptides
    pub peptide_similarity: f64,
    /// Lower bound on the correlation with the averagine model
    pub averagine_similarity: f64,
    /// Maximum number of missed cleavages
    pub missed_cleavages: u32,
    /// Also search for patterns with knocked-out peptides
    pub knock_out: bool,
    /// Tolerate absent low-intensity isotope peaks
    pub allow_missing_peaks: bool,
    /// Mass difference between successive isotopes of a 1+ ion
    pub isotope_spacing: f64,
    /// Label name → mass shift registry
    pub label_table: LabelTable,
}

impl Default for MultiplexParams {
    fn default() -> Self {
        Self {
            labels: "[][Lys8,Arg10]".into(),
            charge_min: 1,
            charge_max: 4,
            isotopes_per_peptide_min: 3,
            isotopes_per_peptide_max: 6,
            rt_typical: 90.0,
            rt_min: 5.0,
            mz_tolerance: 6.0,
            mz_unit: MzUnit::PPM,
            intensity_cutoff: 1000.0,
            peptide_similarity: 0.7,
            averagine_similarity: 0.6,
            missed_cleavages: 0,
            knock_out: false,
            allow_missing_peaks: false,
            isotope_spacing: ISOTOPE_SPACING,
            label_table: LabelTable::default(),
        }
    }
}

impl MultiplexParams {
    /// Normalize and check the parameter set, warning about inverted ranges
    /// which are swapped rather than rejected.
    pub fn validate(&mut self) -> Result<(), MultiplexError> {
        if self.charge_min > self.charge_max {
            warn!(
                "Charge range {}:{} is inverted, swapping",
                self.charge_min, self.charge_max
            );
            std::mem::swap(&mut self.charge_min, &mut self.charge_max);
        }
        if self.isotopes_per_peptide_min > self.isotopes_per_peptide_max {
            warn!(
                "Isotopes-per-peptide range {}:{} is inverted, swapping",
                self.isotopes_per_peptide_min, self.isotopes_per_peptide_max
            );
            std::mem::swap(
                &mut self.isotopes_per_peptide_min,
                &mut self.isotopes_per_peptide_max,
            );
        }
        if self.charge_min < 1 {
            return Err(MultiplexError::InvalidParameter(format!(
                "charge must be at least 1, got {}",
                self.charge_min
            )));
        }
        if self.isotopes_per_peptide_min < 1 {
            return Err(MultiplexError::InvalidParameter(format!(
                "isotopes_per_peptide must be at least 1, got {}",
                self.isotopes_per_peptide_min
            )));
        }
        for (name, value) in [
            ("peptide_similarity", self.peptide_similarity),
            ("averagine_similarity", self.averagine_similarity),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(MultiplexError::InvalidParameter(format!(
                    "{name} must lie in [0, 1], got {value}"
                )));
            }
        }
        for (name, value) in [
            ("rt_typical", self.rt_typical),
            ("rt_min", self.rt_min),
            ("mz_tolerance", self.mz_tolerance),
            ("intensity_cutoff", self.intensity_cutoff),
            ("isotope_spacing", self.isotope_spacing),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(MultiplexError::InvalidParameter(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// The m/z search window as an [`mzpeaks::Tolerance`]
    pub fn tolerance(&self) -> Tolerance {
        match self.mz_unit {
            MzUnit::PPM => Tolerance::PPM(self.mz_tolerance),
            MzUnit::Da => Tolerance::Da(self.mz_tolerance),
        }
    }
}

/// Parse a `min:max` range as used by the `charge` and
/// `isotopes_per_peptide` options.
pub fn parse_range(text: &str) -> Result<(u32, u32), MultiplexError> {
    let err = || {
        MultiplexError::InvalidParameter(format!(
            "expected a min:max range, got {text:?}"
        ))
    };
    let (lo, hi) = text.split_once(':').ok_or_else(err)?;
    let lo: u32 = lo.trim().parse().map_err(|_| err())?;
    let hi: u32 = hi.trim().parse().map_err(|_| err())?;
    Ok((lo, hi))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let mut params = MultiplexParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.charge_min, 1);
        assert_eq!(params.charge_max, 4);
    }

    #[test]
    fn test_inverted_charge_range_swaps() {
        let mut params = MultiplexParams {
            charge_min: 4,
            charge_max: 2,
            ..Default::default()
        };
        params.validate().unwrap();
        assert_eq!((params.charge_min, params.charge_max), (2, 4));
    }

    #[test]
    fn test_similarity_bounds() {
        let mut params = MultiplexParams {
            peptide_similarity: 1.4,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(MultiplexError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("1:4").unwrap(), (1, 4));
        assert_eq!(parse_range("3:3").unwrap(), (3, 3));
        assert!(parse_range("14").is_err());
        assert!(parse_range("a:z").is_err());
    }
}
