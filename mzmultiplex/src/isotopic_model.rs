//! Averagine isotopic intensity ratios
//!
//! The filter compares observed isotopic envelopes against the ratios an
//! "averagine" peptide of the same mass would show. The model scales a
//! fractional average amino-acid composition to the probe's neutral mass
//! and generates the theoretical pattern from it, normalized so the first
//! `k` isotopes sum to 1.

use std::collections::btree_map::{BTreeMap, Entry};
use std::collections::HashMap;

use chemical_elements::isotopic_pattern::BafflingRecursiveIsotopicPatternGenerator;
use chemical_elements::{
    neutral_mass, ChemicalComposition, ElementSpecification, PROTON as _PROTON,
};

pub const PROTON: f64 = _PROTON;

pub type FractionalComposition<'a> = HashMap<ElementSpecification<'a>, f64>;

fn fractional_mass(comp: &FractionalComposition) -> f64 {
    comp.iter()
        .map(|(e, c)| e.element.most_abundant_mass * *c)
        .sum()
}

/// Intensities are renormalized over the first `k` isotopes, so every entry
/// is strictly positive and they sum to 1.
#[derive(Debug, Clone)]
pub struct Averagine<'lifespan> {
    pub base_composition: FractionalComposition<'lifespan>,
    pub base_mass: f64,
    hydrogen: ElementSpecification<'lifespan>,
    generator: BafflingRecursiveIsotopicPatternGenerator<'lifespan>,
}

impl<'lifespan: 'transient, 'transient> Averagine<'lifespan> {
    pub fn new(base_composition: FractionalComposition<'lifespan>) -> Self {
        Self {
            base_mass: fractional_mass(&base_composition),
            base_composition,
            hydrogen: ElementSpecification::parse("H").unwrap(),
            generator: BafflingRecursiveIsotopicPatternGenerator::new(),
        }
    }

    /// The Senko averagine peptide composition
    pub fn peptide() -> Self {
        vec![
            ("H", 7.7583f64),
            ("C", 4.9384),
            ("S", 0.0417),
            ("O", 1.4773),
            ("N", 1.3577),
        ]
        .into()
    }

    /// Scale the base composition to the neutral mass implied by `mz` and
    /// `charge`, rounding to integral element counts and padding the mass
    /// discrepancy with hydrogens.
    pub fn scale(&self, mz: f64, charge: i32) -> ChemicalComposition<'transient> {
        let neutral = neutral_mass(mz, charge, PROTON);
        let scale = neutral / self.base_mass;

        let mut scaled = ChemicalComposition::new();
        for (elt, count) in self.base_composition.iter() {
            scaled.set(*elt, (*count * scale).round() as i32);
        }
        let scaled_mass = scaled.mass();
        let delta = (scaled_mass - neutral).round() as i32;
        let hydrogens = scaled[&self.hydrogen];
        if hydrogens > delta {
            scaled[&self.hydrogen] -= delta;
        } else {
            scaled[&self.hydrogen] = 0;
        }
        scaled
    }

    /// Relative intensities of the first `n_isotopes` isotopes of an
    /// averagine peptide observed at `mz` with `charge`.
    pub fn isotopic_ratios(&mut self, mz: f64, charge: i32, n_isotopes: usize) -> Vec<f64> {
        let composition = self.scale(mz, charge);
        let peaks = self
            .generator
            .isotopic_variants(composition, 0, charge, PROTON);
        let mut ratios: Vec<f64> = peaks
            .iter()
            .take(n_isotopes)
            .map(|p| p.intensity)
            .collect();
        // only reachable for absurdly small probe masses
        while ratios.len() < n_isotopes {
            ratios.push(f64::MIN_POSITIVE);
        }
        let total: f64 = ratios.iter().sum();
        ratios.iter_mut().for_each(|r| *r /= total);
        ratios
    }
}

impl<'lifespan, T: IntoIterator<Item = (&'static str, f64)>> From<T> for Averagine<'lifespan> {
    fn from(iter: T) -> Self {
        let mut f = FractionalComposition::new();
        for (e, c) in iter {
            f.insert(e.parse().expect("Failed to parse element specification"), c);
        }
        Averagine::new(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct RatioKey {
    mz_bin: i64,
    charge: i32,
    n_isotopes: usize,
}

/// An [`Averagine`] with a cache over m/z bins. Two probes within the same
/// bin share one ratio vector, which is plenty of resolution for envelope
/// similarity tests while keeping the recursive generator off the hot path.
#[derive(Debug, Clone)]
pub struct CachingAveragine<'lifespan> {
    pub bin_width: f64,
    inner: Averagine<'lifespan>,
    cache: BTreeMap<RatioKey, Vec<f64>>,
}

impl<'lifespan> CachingAveragine<'lifespan> {
    pub fn new(inner: Averagine<'lifespan>, bin_width: f64) -> Self {
        Self {
            bin_width,
            inner,
            cache: BTreeMap::new(),
        }
    }

    pub fn peptide() -> Self {
        Self::new(Averagine::peptide(), 1.0)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    fn make_key(&self, mz: f64, charge: i32, n_isotopes: usize) -> RatioKey {
        RatioKey {
            mz_bin: (mz / self.bin_width).round() as i64,
            charge,
            n_isotopes,
        }
    }

    pub fn isotopic_ratios(&mut self, mz: f64, charge: i32, n_isotopes: usize) -> &[f64] {
        let key = self.make_key(mz, charge, n_isotopes);
        match self.cache.entry(key) {
            Entry::Occupied(ent) => ent.into_mut(),
            Entry::Vacant(ent) => {
                let bin_center = key.mz_bin as f64 * self.bin_width;
                ent.insert(self.inner.isotopic_ratios(bin_center, charge, n_isotopes))
            }
        }
    }
}

impl<'a> From<Averagine<'a>> for CachingAveragine<'a> {
    fn from(inst: Averagine<'a>) -> CachingAveragine<'a> {
        CachingAveragine::new(inst, 1.0)
    }
}
