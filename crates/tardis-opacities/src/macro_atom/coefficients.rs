// ─────────────────────────────────────────────────────────────────────
// TARDIS-RS — Macro Atom Transition Coefficients
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Per-transition coefficients derived once per atomic dataset.

use ndarray::Array1;
use std::ops::Range;
use tardis_types::atomic::{AtomicData, TransitionType};
use tardis_types::error::{TardisError, TardisResult};
use tracing::debug;

/// Static part of the transition probabilities.
///
/// Depends only on atomic data, so it is computed once and reused for every
/// radiation field the solver sees.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionCoefficients {
    /// Base rate of every transition, one row per macro atom transition.
    pub transition_probability_coef: Array1<f64>,
    /// Rows of upward internal transitions, which scale with J·(stimulated emission).
    pub transition_up_filter: Vec<usize>,
    /// Block start offsets terminated by the transition count (n_levels + 1 entries).
    pub block_references: Array1<usize>,
}

impl TransitionCoefficients {
    pub fn n_transitions(&self) -> usize {
        self.transition_probability_coef.len()
    }

    pub fn n_levels(&self) -> usize {
        self.block_references.len().saturating_sub(1)
    }

    /// Rows of the block belonging to `level`.
    pub fn block(&self, level: usize) -> TardisResult<Range<usize>> {
        if level >= self.n_levels() {
            return Err(TardisError::IndexOutOfBounds {
                table: "block_references",
                index: level,
                len: self.n_levels(),
            });
        }
        Ok(self.block_references[level]..self.block_references[level + 1])
    }
}

/// Derive transition coefficients and terminated block references.
pub fn initialize_transition_probabilities(
    atomic_data: &AtomicData,
) -> TardisResult<TransitionCoefficients> {
    atomic_data.validate()?;

    let mad = &atomic_data.macro_atom_data;
    let transition_probability_coef = (*mad.transition_probability).clone();
    let transition_up_filter: Vec<usize> = mad
        .transition_type
        .iter()
        .enumerate()
        .filter(|(_, t)| **t == TransitionType::InternalUp)
        .map(|(i, _)| i)
        .collect();

    let refs = &atomic_data.macro_atom_references.block_references;
    let mut block_references = Vec::with_capacity(refs.len() + 1);
    block_references.extend(refs.iter().copied());
    block_references.push(mad.len());

    debug!(
        n_transitions = mad.len(),
        n_levels = refs.len(),
        n_up = transition_up_filter.len(),
        "initialized macro atom transition coefficients"
    );

    Ok(TransitionCoefficients {
        transition_probability_coef,
        transition_up_filter,
        block_references: Array1::from(block_references),
    })
}
