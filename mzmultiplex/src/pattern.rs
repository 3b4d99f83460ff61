//! Mass-shift and m/z peak patterns searched for in the data
//!
//! A [`MassPattern`] is the list of mass shifts, in Da, that separate the
//! members of one peptide multiplet, always anchored at 0 for the lightest
//! peptide. A [`PeakPattern`] crosses a mass pattern with a charge state and
//! an isotope count, yielding the flattened list of m/z offsets the filter
//! probes, one "zeroth" below-mono-isotope veto slot included per peptide.

use crate::config::MultiplexParams;
use crate::error::MultiplexError;
use crate::labels::{LabellingMode, SampleDescription};

/// Mass shifts in Da of the peptides in one multiplet, lightest first.
/// The first entry is always 0.
#[derive(Debug, Clone, PartialEq)]
pub struct MassPattern {
    shifts: Vec<f64>,
}

impl MassPattern {
    pub fn new(shifts: Vec<f64>) -> Self {
        debug_assert!(
            shifts.first().map(|s| *s == 0.0).unwrap_or(false),
            "mass patterns are anchored at 0"
        );
        Self { shifts }
    }

    pub fn singlet() -> Self {
        Self::new(vec![0.0])
    }

    /// Number of peptides in the multiplet
    pub fn len(&self) -> usize {
        self.shifts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shifts.is_empty()
    }

    pub fn shift(&self, peptide: usize) -> f64 {
        self.shifts[peptide]
    }

    pub fn shifts(&self) -> &[f64] {
        &self.shifts
    }

    fn isclose(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .shifts
                .iter()
                .zip(other.shifts.iter())
                .all(|(a, b)| (a - b).abs() < 1e-6)
    }
}

/// Enumerate every mass pattern the sample description can produce,
/// including missed-cleavage multiples and, when requested, knock-out
/// patterns for partially absent multiplets.
pub fn generate_mass_patterns(
    description: &SampleDescription,
    params: &MultiplexParams,
) -> Result<Vec<MassPattern>, MultiplexError> {
    let mut list = match description.mode {
        LabellingMode::Silac => silac_patterns(description, params.missed_cleavages),
        LabellingMode::Dimethyl | LabellingMode::Icpl => {
            per_sample_patterns(description, params.missed_cleavages)
        }
        LabellingMode::None => vec![MassPattern::singlet()],
    };

    if params.knock_out && description.mode != LabellingMode::None {
        knock_out_expansion(&mut list)?;
    }

    dedup(&mut list);
    Ok(list)
}

/// SILAC: a peptide carries `a` labelled arginines and `l` labelled lysines,
/// `a + l` bounded by the missed-cleavage cap plus one. A sample contributes
/// a shift only if it carries a label for every residue class the peptide
/// uses.
fn silac_patterns(description: &SampleDescription, missed_cleavages: u32) -> Vec<MassPattern> {
    let mc = missed_cleavages as usize;
    let mut list = Vec::new();
    for arg_per_peptide in 0..=mc + 1 {
        for lys_per_peptide in 0..=mc + 1 {
            if arg_per_peptide + lys_per_peptide > mc + 1 {
                continue;
            }
            let mut shifts = vec![0.0];
            for i in 0..description.len() {
                let arg_shift = description.shift_in_sample(i, "Arg6")
                    + description.shift_in_sample(i, "Arg10");
                let lys_shift = description.shift_in_sample(i, "Lys4")
                    + description.shift_in_sample(i, "Lys6")
                    + description.shift_in_sample(i, "Lys8");
                let mass_shift =
                    arg_per_peptide as f64 * arg_shift + lys_per_peptide as f64 * lys_shift;

                let go_ahead_arg = arg_per_peptide == 0 || description.sample_has_prefix(i, "Arg");
                let go_ahead_lys = lys_per_peptide == 0 || description.sample_has_prefix(i, "Lys");
                if go_ahead_arg && go_ahead_lys && mass_shift != 0.0 {
                    shifts.push(mass_shift);
                }
            }
            if shifts.len() > 1 {
                list.push(MassPattern::new(shifts));
            }
        }
    }
    list
}

/// Dimethyl / ICPL: every sample carries exactly one label; a missed
/// cleavage multiplies the whole shift.
fn per_sample_patterns(description: &SampleDescription, missed_cleavages: u32) -> Vec<MassPattern> {
    let reference = description.samples[0][0].mass_shift;
    (0..=missed_cleavages)
        .map(|mc| {
            MassPattern::new(
                (0..description.len())
                    .map(|i| {
                        (mc + 1) as f64 * (description.samples[i][0].mass_shift - reference)
                    })
                    .collect(),
            )
        })
        .collect()
}

/// Add the patterns produced when one or more multiplet members are absent:
/// for a quadruplet its observable triplets and doublets, for a triplet its
/// doublets, each rebased so the smallest remaining shift is 0, plus the
/// bare singlet.
fn knock_out_expansion(list: &mut Vec<MassPattern>) -> Result<(), MultiplexError> {
    let m = list.len();
    for i in 0..m {
        let s = list[i].shifts().to_vec();
        match s.len() {
            0..=2 => {}
            3 => {
                list.push(MassPattern::new(vec![0.0, s[1]]));
                list.push(MassPattern::new(vec![0.0, s[2] - s[1]]));
                list.push(MassPattern::new(vec![0.0, s[2]]));
            }
            4 => {
                list.push(MassPattern::new(vec![0.0, s[2] - s[1], s[3] - s[1]]));
                list.push(MassPattern::new(vec![0.0, s[2], s[3]]));
                list.push(MassPattern::new(vec![0.0, s[1], s[2]]));

                list.push(MassPattern::new(vec![0.0, s[1]]));
                list.push(MassPattern::new(vec![0.0, s[2]]));
                list.push(MassPattern::new(vec![0.0, s[3]]));
                list.push(MassPattern::new(vec![0.0, s[2] - s[1]]));
                list.push(MassPattern::new(vec![0.0, s[3] - s[1]]));
                list.push(MassPattern::new(vec![0.0, s[3] - s[2]]));
            }
            n => return Err(MultiplexError::KnockOutArity(n)),
        }
    }
    list.push(MassPattern::singlet());
    Ok(())
}

fn dedup(list: &mut Vec<MassPattern>) {
    let mut kept: Vec<MassPattern> = Vec::with_capacity(list.len());
    for pattern in list.drain(..) {
        if !kept.iter().any(|k| k.isclose(&pattern)) {
            kept.push(pattern);
        }
    }
    *list = kept;
}

/// A mass pattern instantiated at a particular charge state.
///
/// The expected m/z offsets from the probe position are laid out flat: for
/// each peptide a block of `isotopes_per_peptide + 1` slots, the first being
/// the below-mono-isotope veto slot, followed by the mono-isotope and the
/// higher isotopes.
#[derive(Debug, Clone)]
pub struct PeakPattern {
    pub charge: i32,
    pub isotopes_per_peptide: usize,
    pub mass_pattern: MassPattern,
    /// Index of the mass pattern this was generated from
    pub id: usize,
    mz_shifts: Vec<f64>,
}

impl PeakPattern {
    pub fn new(
        charge: i32,
        isotopes_per_peptide: usize,
        mass_pattern: MassPattern,
        id: usize,
        isotope_spacing: f64,
    ) -> Self {
        let c = charge as f64;
        let spacing = isotope_spacing / c;
        let mut mz_shifts = Vec::with_capacity(mass_pattern.len() * (isotopes_per_peptide + 1));
        for peptide in 0..mass_pattern.len() {
            let base = mass_pattern.shift(peptide) / c;
            mz_shifts.push(base - spacing);
            for isotope in 0..isotopes_per_peptide {
                mz_shifts.push(base + isotope as f64 * spacing);
            }
        }
        Self {
            charge,
            isotopes_per_peptide,
            mass_pattern,
            id,
            mz_shifts,
        }
    }

    /// Number of peptides in the multiplet
    pub fn peptide_count(&self) -> usize {
        self.mass_pattern.len()
    }

    /// Width of one peptide's slot block
    pub fn block_size(&self) -> usize {
        self.isotopes_per_peptide + 1
    }

    /// Total number of (peptide, isotope) slots, veto slots included
    pub fn slot_count(&self) -> usize {
        self.mz_shifts.len()
    }

    /// Flat slot index of the below-mono-isotope veto slot of `peptide`
    pub fn veto_slot(&self, peptide: usize) -> usize {
        peptide * self.block_size()
    }

    /// Flat slot index of isotope `isotope` (0 = mono-isotope) of `peptide`
    pub fn isotope_slot(&self, peptide: usize, isotope: usize) -> usize {
        peptide * self.block_size() + isotope + 1
    }

    /// Expected m/z offset of a flat slot from the probe position
    pub fn mz_shift(&self, slot: usize) -> f64 {
        self.mz_shifts[slot]
    }

    pub fn mz_shifts(&self) -> &[f64] {
        &self.mz_shifts
    }
}

/// Cross mass patterns with the configured charge range. Charges iterate
/// high to low: a 4+ pattern can be mistaken for 2+, but not the other way
/// around, so the higher charge must claim its peaks first.
pub fn generate_peak_patterns(
    mass_patterns: &[MassPattern],
    params: &MultiplexParams,
) -> Vec<PeakPattern> {
    let mut list =
        Vec::with_capacity(mass_patterns.len() * (params.charge_max - params.charge_min + 1) as usize);
    for charge in (params.charge_min..=params.charge_max).rev() {
        for (id, pattern) in mass_patterns.iter().enumerate() {
            list.push(PeakPattern::new(
                charge,
                params.isotopes_per_peptide_max,
                pattern.clone(),
                id,
                params.isotope_spacing,
            ));
        }
    }
    list
}
