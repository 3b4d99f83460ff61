use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use thiserror::Error;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use mzdata::prelude::*;
use mzdata::spectrum::SignalContinuity;
use mzdata::MZReader;
use mzpeaks::CentroidPeak;
use mzsignal::peak_picker::{PeakFitType, PeakPicker};
use mzsignal::FittedPeak;

use mzmultiplex::{
    GridSpectrum, MultiplexEngine, MultiplexError, MultiplexSolution, PeakBoundary, SpectrumGrid,
};

mod args;
use args::MZMultiplexerArgs;

#[derive(Debug, Error)]
pub enum MZMultiplexerError {
    #[error("An IO error occurred: {0}")]
    IOError(
        #[source]
        #[from]
        io::Error,
    ),
    #[error("{0}")]
    Multiplex(
        #[source]
        #[from]
        MultiplexError,
    ),
    #[error("The spectrum {0} carries centroided data, profile data is required")]
    CentroidedInput(String),
    #[error("Failed to read the signal arrays of {0}: {1}")]
    ArrayError(String, String),
    #[error("Peak picking failed on {0}: {1}")]
    PeakPickerError(String, String),
}

/// Read the MS1 spectra of an mzML file into the engine's grid, centroiding
/// the profile signal. Peak boundaries derive from the fitted peak widths,
/// clamped to the midpoint towards each neighbour so they stay disjoint.
fn load_grid(path: &Path) -> Result<SpectrumGrid, MZMultiplexerError> {
    let reader = MZReader::open_path(path)?;
    let picker = PeakPicker {
        fit_type: PeakFitType::Quadratic,
        signal_to_noise_threshold: 1.0,
        ..Default::default()
    };

    let mut spectra = Vec::new();
    for scan in reader {
        if scan.ms_level() != 1 {
            continue;
        }
        if scan.signal_continuity() != SignalContinuity::Profile {
            return Err(MZMultiplexerError::CentroidedInput(scan.id().to_string()));
        }
        let arrays = scan.raw_arrays().ok_or_else(|| {
            MZMultiplexerError::ArrayError(scan.id().to_string(), "no raw arrays".into())
        })?;
        let raw_mz: Vec<f64> = arrays
            .mzs()
            .map_err(|e| MZMultiplexerError::ArrayError(scan.id().to_string(), e.to_string()))?
            .into_owned();
        let raw_intensity: Vec<f32> = arrays
            .intensities()
            .map_err(|e| MZMultiplexerError::ArrayError(scan.id().to_string(), e.to_string()))?
            .into_owned();

        let mut fitted: Vec<FittedPeak> = Vec::new();
        picker
            .discover_peaks(&raw_mz, &raw_intensity, &mut fitted)
            .map_err(|e| {
                MZMultiplexerError::PeakPickerError(scan.id().to_string(), e.to_string())
            })?;
        fitted.sort_by(|a, b| a.mz.total_cmp(&b.mz));

        let mut centroids = Vec::with_capacity(fitted.len());
        let mut boundaries = Vec::with_capacity(fitted.len());
        for (i, peak) in fitted.iter().enumerate() {
            let half = (peak.full_width_at_half_max as f64).max(1e-4);
            let mut lo = peak.mz - half;
            let mut hi = peak.mz + half;
            if i > 0 {
                lo = lo.max((fitted[i - 1].mz + peak.mz) / 2.0);
            }
            if i + 1 < fitted.len() {
                hi = hi.min((peak.mz + fitted[i + 1].mz) / 2.0);
            }
            centroids.push(CentroidPeak::new(peak.mz, peak.intensity, i as u32));
            boundaries.push(PeakBoundary::new(lo, hi));
        }

        // mzdata reports start times in minutes, retention parameters are
        // in seconds
        let rt = scan.start_time() * 60.0;
        debug!(
            "Loaded {} at {rt:0.2} s with {} centroids",
            scan.id(),
            centroids.len()
        );
        spectra.push(GridSpectrum::new(
            rt,
            raw_mz,
            raw_intensity.into_iter().map(|i| i as f64).collect(),
            centroids,
            boundaries,
        ));
    }
    Ok(SpectrumGrid::new(spectra)?)
}

fn write_consensus<W: io::Write>(
    mut writer: W,
    solution: &MultiplexSolution,
) -> io::Result<()> {
    writeln!(
        writer,
        "id\trt\tmz\tcharge\tintensity\tquality\tpeptides"
    )?;
    for consensus in &solution.consensus {
        writeln!(
            writer,
            "{}\t{:0.4}\t{:0.6}\t{}\t{:0.4}\t{:0.4}\t{}",
            consensus.id,
            consensus.rt,
            consensus.mz,
            consensus.charge,
            consensus.intensity,
            consensus.quality,
            consensus.features.len()
        )?;
    }
    Ok(())
}

fn write_features<W: io::Write>(mut writer: W, solution: &MultiplexSolution) -> io::Result<()> {
    writeln!(
        writer,
        "id\trt\tmz\tcharge\tmap_index\tintensity\tquality"
    )?;
    for (id, feature) in solution.peptide_features().iter().enumerate() {
        writeln!(
            writer,
            "{}\t{:0.4}\t{:0.6}\t{}\t{}\t{:0.4}\t{:0.4}",
            id,
            feature.rt,
            feature.mz,
            feature.charge,
            feature.map_index,
            feature.intensity,
            feature.quality
        )?;
    }
    Ok(())
}

fn run(args: MZMultiplexerArgs) -> Result<(), MZMultiplexerError> {
    let engine = MultiplexEngine::new(args.to_params()?)?;

    let started = Instant::now();
    let grid = load_grid(&args.input_file)?;
    info!(
        "Loaded {} MS1 spectra in {:0.3?}",
        grid.len(),
        started.elapsed()
    );

    let solution = engine.run(&grid)?;
    info!(
        "Found {} consensus features in {:0.3?}",
        solution.len(),
        started.elapsed()
    );

    if args.output_file == "-" {
        write_consensus(io::stdout().lock(), &solution)?;
    } else {
        write_consensus(
            BufWriter::new(fs::File::create(&args.output_file)?),
            &solution,
        )?;
    }
    if let Some(path) = &args.output_features {
        write_features(BufWriter::new(fs::File::create(path)?), &solution)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = MZMultiplexerArgs::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
