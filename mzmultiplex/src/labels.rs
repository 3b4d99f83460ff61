//! Isotopic label registry and sample-description parsing
//!
//! A labelling experiment is described by a string such as
//! `"[][Lys8,Arg10]"`: each bracketed group is one sample, listing the
//! labels applied to it, in light-to-heavy order. The registry maps label
//! names to their Unimod mass shifts and may be extended or overridden at
//! configuration time.

use std::collections::HashMap;

use crate::error::MultiplexError;

/// Built-in labels and their mass shifts in Da
const BUILTIN_LABELS: [(&str, f64); 13] = [
    // Label:13C(6) | unimod #188
    ("Arg6", 6.0201290268),
    // Label:13C(6)15N(4) | unimod #267
    ("Arg10", 10.008268600),
    // Label:2H(4) | unimod #481
    ("Lys4", 4.0251069836),
    // Label:13C(6) | unimod #188
    ("Lys6", 6.0201290268),
    // Label:13C(6)15N(2) | unimod #259
    ("Lys8", 8.0141988132),
    // Dimethyl | unimod #36
    ("Dimethyl0", 28.031300),
    // Dimethyl:2H(4) | unimod #199
    ("Dimethyl4", 32.056407),
    // Dimethyl:2H(4)13C(2) | unimod #510
    ("Dimethyl6", 34.063117),
    // Dimethyl:2H(6)13C(2) | unimod #330
    ("Dimethyl8", 36.075670),
    // ICPL | unimod #365
    ("ICPL0", 105.021464),
    // ICPL:2H(4) | unimod #687
    ("ICPL4", 109.046571),
    // ICPL:13C(6) | unimod #364
    ("ICPL6", 111.041593),
    // ICPL:13C(6)2H(4) | unimod #866
    ("ICPL10", 115.066700),
];

/// Label name → mass shift registry
#[derive(Debug, Clone, PartialEq)]
pub struct LabelTable {
    shifts: HashMap<String, f64>,
}

impl Default for LabelTable {
    fn default() -> Self {
        Self {
            shifts: BUILTIN_LABELS
                .iter()
                .map(|(name, mass)| (name.to_string(), *mass))
                .collect(),
        }
    }
}

impl LabelTable {
    /// Register a label, replacing any previous mass for the same name
    pub fn insert(&mut self, name: impl Into<String>, mass_shift: f64) {
        self.shifts.insert(name.into(), mass_shift);
    }

    pub fn mass_shift(&self, name: &str) -> Option<f64> {
        self.shifts.get(name).copied()
    }

    fn require(&self, name: &str) -> Result<f64, MultiplexError> {
        self.mass_shift(name)
            .ok_or_else(|| MultiplexError::UnknownLabel(name.to_string()))
    }
}

/// Which labelling chemistry a sample description uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabellingMode {
    Silac,
    Dimethyl,
    Icpl,
    /// Label-free singlet detection
    None,
}

/// A parsed sample description: one entry per sample, each holding that
/// sample's labels with their mass shifts, in the order written.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleDescription {
    pub mode: LabellingMode,
    pub samples: Vec<Vec<SampleLabel>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleLabel {
    pub name: String,
    pub mass_shift: f64,
}

impl SampleDescription {
    /// Parse a sample description string against a label registry.
    ///
    /// Any of `[] () {}` delimit samples; labels within a sample are
    /// separated by any of comma, semicolon, colon or space. Unknown label
    /// names and mixed chemistries are rejected.
    pub fn parse(text: &str, table: &LabelTable) -> Result<Self, MultiplexError> {
        let mut samples: Vec<Vec<SampleLabel>> = Vec::new();
        for group in text.split(['[', ']', '(', ')', '{', '}']) {
            if group.is_empty() {
                continue;
            }
            let mut labels = Vec::new();
            for name in group.split([',', ';', ':', ' ']).filter(|s| !s.is_empty()) {
                labels.push(SampleLabel {
                    name: name.to_string(),
                    mass_shift: table.require(name)?,
                });
            }
            samples.push(labels);
        }

        let mode = Self::classify(text, &samples)?;
        Ok(Self { mode, samples })
    }

    fn classify(
        text: &str,
        samples: &[Vec<SampleLabel>],
    ) -> Result<LabellingMode, MultiplexError> {
        let names = samples.iter().flatten().map(|l| l.name.as_str());
        let mut silac = false;
        let mut dimethyl = false;
        let mut icpl = false;
        for name in names {
            silac |= name.starts_with("Arg") || name.starts_with("Lys");
            dimethyl |= name.starts_with("Dimethyl");
            icpl |= name.starts_with("ICPL");
        }
        match (silac, dimethyl, icpl) {
            (true, false, false) => Ok(LabellingMode::Silac),
            (false, true, false) => Ok(LabellingMode::Dimethyl),
            (false, false, true) => Ok(LabellingMode::Icpl),
            (false, false, false) => Ok(LabellingMode::None),
            _ => Err(MultiplexError::MixedLabelling(text.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Mass shift of `label` in sample `index`, 0 when the sample does not
    /// carry it
    pub fn shift_in_sample(&self, index: usize, label: &str) -> f64 {
        self.samples[index]
            .iter()
            .find(|l| l.name == label)
            .map(|l| l.mass_shift)
            .unwrap_or(0.0)
    }

    /// Whether sample `index` carries any label whose name starts with
    /// `prefix`
    pub fn sample_has_prefix(&self, index: usize, prefix: &str) -> bool {
        self.samples[index].iter().any(|l| l.name.starts_with(prefix))
    }
}
