use std::fmt::Display;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use mzmultiplex::config::{parse_range, MultiplexParams};
use mzmultiplex::error::MultiplexError;
use mzmultiplex::MzUnit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum ArgMzUnit {
    #[default]
    Ppm,
    Da,
}

impl From<ArgMzUnit> for MzUnit {
    fn from(value: ArgMzUnit) -> MzUnit {
        match value {
            ArgMzUnit::Ppm => MzUnit::PPM,
            ArgMzUnit::Da => MzUnit::Da,
        }
    }
}

impl Display for ArgMzUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ArgMzUnit::Ppm => "ppm",
            ArgMzUnit::Da => "da",
        };
        write!(f, "{}", s)
    }
}

/// Detection and relative quantitation of isotopically labelled peptide
/// multiplets in LC-MS data.
///
/// Reads an mzML file, restricts it to MS1 spectra, centroids the profile
/// signal, and searches for co-eluting peptide multiplets as described by
/// the labelling. No prior peptide identification is required.
#[derive(Parser, Debug)]
#[command(author, version)]
pub struct MZMultiplexerArgs {
    /// The profile-mode mzML file to analyze
    pub input_file: PathBuf,

    /// Where to write the consensus table, "-" for stdout
    #[arg(short = 'o', long = "output-file", default_value = "-")]
    pub output_file: String,

    /// Where to write the per-peptide feature table
    #[arg(long = "output-features")]
    pub output_features: Option<PathBuf>,

    /// Labels per sample, e.g. "[][Lys8,Arg10]" for SILAC,
    /// "[Dimethyl0][Dimethyl6]" for dimethyl labelling
    #[arg(short = 'l', long = "labels", default_value = "[][Lys8,Arg10]")]
    pub labels: String,

    /// Charge states to search, min:max
    #[arg(short = 'c', long = "charge", default_value = "1:4")]
    pub charge: String,

    /// Isotopic peaks per peptide, min:max
    #[arg(long = "isotopes-per-peptide", default_value = "3:6")]
    pub isotopes_per_peptide: String,

    /// Typical elution time in seconds
    #[arg(long = "rt-typical", default_value_t = 90.0)]
    pub rt_typical: f64,

    /// Minimum elution time in seconds, shorter features are dropped
    #[arg(long = "rt-min", default_value_t = 5.0)]
    pub rt_min: f64,

    /// m/z search tolerance
    #[arg(short = 't', long = "mz-tolerance", default_value_t = 6.0)]
    pub mz_tolerance: f64,

    /// Unit of the m/z tolerance
    #[arg(long = "mz-unit", default_value_t = ArgMzUnit::Ppm)]
    pub mz_unit: ArgMzUnit,

    /// Intensity floor for mono-isotopic peaks
    #[arg(short = 'i', long = "intensity-cutoff", default_value_t = 1000.0)]
    pub intensity_cutoff: f64,

    /// Lower bound on the envelope correlation between peptides
    #[arg(long = "peptide-similarity", default_value_t = 0.7)]
    pub peptide_similarity: f64,

    /// Lower bound on the correlation with the averagine model
    #[arg(long = "averagine-similarity", default_value_t = 0.6)]
    pub averagine_similarity: f64,

    /// Maximum number of missed cleavages
    #[arg(long = "missed-cleavages", default_value_t = 0)]
    pub missed_cleavages: u32,

    /// Also search for patterns with knocked-out peptides
    #[arg(short = 'k', long = "knock-out", default_value_t = false)]
    pub knock_out: bool,

    /// Tolerate absent low-intensity isotope peaks
    #[arg(long = "allow-missing-peaks", default_value_t = false)]
    pub allow_missing_peaks: bool,
}

impl MZMultiplexerArgs {
    pub fn to_params(&self) -> Result<MultiplexParams, MultiplexError> {
        let (charge_min, charge_max) = parse_range(&self.charge)?;
        let (isotopes_min, isotopes_max) = parse_range(&self.isotopes_per_peptide)?;
        Ok(MultiplexParams {
            labels: self.labels.clone(),
            charge_min: charge_min as i32,
            charge_max: charge_max as i32,
            isotopes_per_peptide_min: isotopes_min as usize,
            isotopes_per_peptide_max: isotopes_max as usize,
            rt_typical: self.rt_typical,
            rt_min: self.rt_min,
            mz_tolerance: self.mz_tolerance,
            mz_unit: self.mz_unit.into(),
            intensity_cutoff: self.intensity_cutoff,
            peptide_similarity: self.peptide_similarity,
            averagine_similarity: self.averagine_similarity,
            missed_cleavages: self.missed_cleavages,
            knock_out: self.knock_out,
            allow_missing_peaks: self.allow_missing_peaks,
            ..Default::default()
        })
    }
}
