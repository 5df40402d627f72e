// ─────────────────────────────────────────────────────────────────────
// TARDIS-RS — Atomic Data
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Read-only macro atom reference tables.
//!
//! Columns are held behind `Arc` so solved states can share the static
//! topology with the dataset instead of copying it on every iteration.

use crate::error::{TardisError, TardisResult};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;

/// Macro atom transition kind, stored in atomic data as an integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionType {
    /// Code -1: the macro atom deactivates by emitting a line photon.
    RadiativeDeexcitation,
    /// Code 0: internal jump to a lower level.
    InternalDown,
    /// Code 1: internal jump to a higher level.
    InternalUp,
}

impl TransitionType {
    pub fn code(self) -> i64 {
        match self {
            TransitionType::RadiativeDeexcitation => -1,
            TransitionType::InternalDown => 0,
            TransitionType::InternalUp => 1,
        }
    }

    pub fn from_code(code: i64) -> TardisResult<Self> {
        match code {
            -1 => Ok(TransitionType::RadiativeDeexcitation),
            0 => Ok(TransitionType::InternalDown),
            1 => Ok(TransitionType::InternalUp),
            other => Err(TardisError::DataConsistency(format!(
                "unknown macro atom transition type code {other}"
            ))),
        }
    }

    pub fn is_internal(self) -> bool {
        !matches!(self, TransitionType::RadiativeDeexcitation)
    }
}

impl TryFrom<i64> for TransitionType {
    type Error = TardisError;

    fn try_from(code: i64) -> TardisResult<Self> {
        Self::from_code(code)
    }
}

/// One row per macro atom transition.
#[derive(Debug, Clone)]
pub struct MacroAtomData {
    pub transition_type: Arc<Array1<TransitionType>>,
    /// Macro atom level the transition leads to.
    pub destination_level_idx: Arc<Array1<usize>>,
    /// Line associated with the transition (row in the per-line shell tables).
    pub lines_idx: Arc<Array1<usize>>,
    /// Tabulated base rate of the transition, before radiation-field factors.
    pub transition_probability: Arc<Array1<f64>>,
}

impl MacroAtomData {
    pub fn len(&self) -> usize {
        self.transition_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-level offsets into the transition table.
#[derive(Debug, Clone)]
pub struct MacroAtomReferences {
    /// First transition row of each level's outgoing block.
    pub block_references: Arc<Array1<usize>>,
}

impl MacroAtomReferences {
    pub fn n_levels(&self) -> usize {
        self.block_references.len()
    }
}

/// Atomic dataset as seen by the macro atom solver.
#[derive(Debug, Clone)]
pub struct AtomicData {
    pub macro_atom_data: MacroAtomData,
    pub macro_atom_references: MacroAtomReferences,
    /// Macro atom level activated by absorption in each line.
    pub lines_upper2macro_reference_idx: Arc<Array1<usize>>,
}

impl AtomicData {
    /// Build and validate an atomic dataset.
    pub fn try_new(
        macro_atom_data: MacroAtomData,
        macro_atom_references: MacroAtomReferences,
        lines_upper2macro_reference_idx: Array1<usize>,
    ) -> TardisResult<Self> {
        let data = AtomicData {
            macro_atom_data,
            macro_atom_references,
            lines_upper2macro_reference_idx: Arc::new(lines_upper2macro_reference_idx),
        };
        data.validate()?;
        Ok(data)
    }

    /// Load an atomic dataset from its JSON form.
    pub fn from_file(path: &str) -> TardisResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> TardisResult<Self> {
        let record: AtomicDataRecord = serde_json::from_str(contents)?;
        record.into_atomic_data()
    }

    pub fn to_json(&self) -> TardisResult<String> {
        Ok(serde_json::to_string_pretty(&AtomicDataRecord::from(self))?)
    }

    pub fn n_transitions(&self) -> usize {
        self.macro_atom_data.len()
    }

    pub fn n_levels(&self) -> usize {
        self.macro_atom_references.n_levels()
    }

    pub fn n_lines(&self) -> usize {
        self.lines_upper2macro_reference_idx.len()
    }

    /// Transition rows belonging to `level`.
    pub fn block_range(&self, level: usize) -> TardisResult<Range<usize>> {
        block_range(
            &self.macro_atom_references.block_references,
            self.n_transitions(),
            level,
        )
    }

    /// Check the topology invariants the solver relies on.
    pub fn validate(&self) -> TardisResult<()> {
        let mad = &self.macro_atom_data;
        let n = mad.len();
        for (name, len) in [
            ("destination_level_idx", mad.destination_level_idx.len()),
            ("lines_idx", mad.lines_idx.len()),
            ("transition_probability", mad.transition_probability.len()),
        ] {
            if len != n {
                return Err(TardisError::DataConsistency(format!(
                    "macro_atom_data column {name} has {len} rows, transition_type has {n}"
                )));
            }
        }

        let refs = &self.macro_atom_references.block_references;
        let n_levels = refs.len();
        if n_levels == 0 && n > 0 {
            return Err(TardisError::DataConsistency(
                "macro_atom_data has transitions but no macro atom levels".to_string(),
            ));
        }
        if n_levels > 0 && refs[0] != 0 {
            return Err(TardisError::DataConsistency(format!(
                "block_references must start at 0, got {}",
                refs[0]
            )));
        }
        for level in 1..n_levels {
            if refs[level] < refs[level - 1] {
                return Err(TardisError::DataConsistency(format!(
                    "block_references decrease at level {level}: {} < {}",
                    refs[level],
                    refs[level - 1]
                )));
            }
        }
        if n_levels > 0 && refs[n_levels - 1] > n {
            return Err(TardisError::IndexOutOfBounds {
                table: "block_references",
                index: refs[n_levels - 1],
                len: n,
            });
        }

        if let Some(&bad) = mad.destination_level_idx.iter().find(|&&d| d >= n_levels) {
            return Err(TardisError::IndexOutOfBounds {
                table: "destination_level_idx",
                index: bad,
                len: n_levels,
            });
        }
        let n_lines = self.n_lines();
        if let Some(&bad) = mad.lines_idx.iter().find(|&&l| l >= n_lines) {
            return Err(TardisError::IndexOutOfBounds {
                table: "lines_idx",
                index: bad,
                len: n_lines,
            });
        }
        if let Some(&bad) = self
            .lines_upper2macro_reference_idx
            .iter()
            .find(|&&level| level >= n_levels)
        {
            return Err(TardisError::IndexOutOfBounds {
                table: "lines_upper2macro_reference_idx",
                index: bad,
                len: n_levels,
            });
        }
        if !mad
            .transition_probability
            .iter()
            .all(|p| p.is_finite() && *p >= 0.0)
        {
            return Err(TardisError::DataConsistency(
                "transition_probability must be finite and >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Rows of `level`'s block, given per-level start offsets.
///
/// The last level's block runs to the end of the transition table.
pub fn block_range(
    block_references: &Array1<usize>,
    n_transitions: usize,
    level: usize,
) -> TardisResult<Range<usize>> {
    let n_levels = block_references.len();
    if level >= n_levels {
        return Err(TardisError::IndexOutOfBounds {
            table: "block_references",
            index: level,
            len: n_levels,
        });
    }
    let start = block_references[level];
    let end = if level + 1 < n_levels {
        block_references[level + 1]
    } else {
        n_transitions
    };
    Ok(start..end)
}

/// JSON layout of an atomic dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AtomicDataRecord {
    macro_atom_data: MacroAtomDataRecord,
    macro_atom_references: MacroAtomReferencesRecord,
    lines_upper2macro_reference_idx: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MacroAtomDataRecord {
    transition_type: Vec<i64>,
    destination_level_idx: Vec<usize>,
    lines_idx: Vec<usize>,
    transition_probability: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MacroAtomReferencesRecord {
    block_references: Vec<usize>,
}

impl AtomicDataRecord {
    fn into_atomic_data(self) -> TardisResult<AtomicData> {
        let transition_type = self
            .macro_atom_data
            .transition_type
            .into_iter()
            .map(TransitionType::from_code)
            .collect::<TardisResult<Vec<_>>>()?;
        AtomicData::try_new(
            MacroAtomData {
                transition_type: Arc::new(Array1::from(transition_type)),
                destination_level_idx: Arc::new(Array1::from(
                    self.macro_atom_data.destination_level_idx,
                )),
                lines_idx: Arc::new(Array1::from(self.macro_atom_data.lines_idx)),
                transition_probability: Arc::new(Array1::from(
                    self.macro_atom_data.transition_probability,
                )),
            },
            MacroAtomReferences {
                block_references: Arc::new(Array1::from(
                    self.macro_atom_references.block_references,
                )),
            },
            Array1::from(self.lines_upper2macro_reference_idx),
        )
    }
}

impl From<&AtomicData> for AtomicDataRecord {
    fn from(data: &AtomicData) -> Self {
        let mad = &data.macro_atom_data;
        AtomicDataRecord {
            macro_atom_data: MacroAtomDataRecord {
                transition_type: mad.transition_type.iter().map(|t| t.code()).collect(),
                destination_level_idx: mad.destination_level_idx.to_vec(),
                lines_idx: mad.lines_idx.to_vec(),
                transition_probability: mad.transition_probability.to_vec(),
            },
            macro_atom_references: MacroAtomReferencesRecord {
                block_references: data.macro_atom_references.block_references.to_vec(),
            },
            lines_upper2macro_reference_idx: data.lines_upper2macro_reference_idx.to_vec(),
        }
    }
}
