// ─────────────────────────────────────────────────────────────────────
// TARDIS-RS — Macro Atom State
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Solved macro atom model handed to packet transport.
//!
//! A state is immutable once built. Each solve produces a new one; the
//! static topology columns are shared with the atomic dataset through `Arc`.

use super::probabilities::TransitionProbabilities;
use ndarray::Array1;
use rand::Rng;
use std::ops::Range;
use std::sync::Arc;
use tardis_types::atomic::{block_range, TransitionType};
use tardis_types::config::DEFAULT_MAX_JUMPS;
use tardis_types::error::{TardisError, TardisResult};

/// A single transition chosen from a macro atom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacroAtomTransition {
    /// Row in the transition table.
    pub transition_id: usize,
    pub transition_type: TransitionType,
    pub destination_level: usize,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct MacroAtomState {
    transition_probabilities: TransitionProbabilities,
    transition_type: Arc<Array1<TransitionType>>,
    destination_level_idx: Arc<Array1<usize>>,
    lines_idx: Arc<Array1<usize>>,
    block_references: Arc<Array1<usize>>,
    lines_upper2macro_reference_idx: Arc<Array1<usize>>,
    max_jumps: usize,
}

impl MacroAtomState {
    pub fn new(
        transition_probabilities: TransitionProbabilities,
        transition_type: Arc<Array1<TransitionType>>,
        destination_level_idx: Arc<Array1<usize>>,
        lines_idx: Arc<Array1<usize>>,
        block_references: Arc<Array1<usize>>,
        lines_upper2macro_reference_idx: Arc<Array1<usize>>,
    ) -> TardisResult<Self> {
        let n = transition_type.len();
        if transition_probabilities.n_transitions() != n
            || destination_level_idx.len() != n
            || lines_idx.len() != n
        {
            return Err(TardisError::DataConsistency(format!(
                "macro atom state rows disagree: probabilities={}, transition_type={}, \
                 destination_level_idx={}, lines_idx={}",
                transition_probabilities.n_transitions(),
                n,
                destination_level_idx.len(),
                lines_idx.len()
            )));
        }
        check_topology(
            &block_references,
            &destination_level_idx,
            &lines_upper2macro_reference_idx,
            n,
        )?;
        Ok(MacroAtomState {
            transition_probabilities,
            transition_type,
            destination_level_idx,
            lines_idx,
            block_references,
            lines_upper2macro_reference_idx,
            max_jumps: DEFAULT_MAX_JUMPS,
        })
    }

    /// Bound on internal jumps taken by [`MacroAtomState::emission_line`].
    pub fn with_max_jumps(mut self, max_jumps: usize) -> Self {
        self.max_jumps = max_jumps;
        self
    }

    pub fn max_jumps(&self) -> usize {
        self.max_jumps
    }

    pub fn transition_probabilities(&self) -> &TransitionProbabilities {
        &self.transition_probabilities
    }

    pub fn transition_type(&self) -> &Arc<Array1<TransitionType>> {
        &self.transition_type
    }

    pub fn destination_level_idx(&self) -> &Arc<Array1<usize>> {
        &self.destination_level_idx
    }

    pub fn lines_idx(&self) -> &Arc<Array1<usize>> {
        &self.lines_idx
    }

    pub fn block_references(&self) -> &Arc<Array1<usize>> {
        &self.block_references
    }

    pub fn lines_upper2macro_reference_idx(&self) -> &Arc<Array1<usize>> {
        &self.lines_upper2macro_reference_idx
    }

    pub fn n_transitions(&self) -> usize {
        self.transition_type.len()
    }

    pub fn n_levels(&self) -> usize {
        self.block_references.len()
    }

    pub fn n_shells(&self) -> usize {
        self.transition_probabilities.n_shells()
    }

    /// Transition rows leaving `level`.
    pub fn block_range(&self, level: usize) -> TardisResult<Range<usize>> {
        block_range(&self.block_references, self.n_transitions(), level)
    }

    /// Level a packet activates when absorbed in `line`.
    pub fn activation_level(&self, line: usize) -> TardisResult<usize> {
        self.lines_upper2macro_reference_idx
            .get(line)
            .copied()
            .ok_or(TardisError::IndexOutOfBounds {
                table: "lines_upper2macro_reference_idx",
                index: line,
                len: self.lines_upper2macro_reference_idx.len(),
            })
    }

    /// Pick the transition out of `level` in `shell` for a uniform deviate `xi` in [0, 1).
    ///
    /// The cumulative sum over the level's block is compared with `xi` times
    /// the block total, so unnormalized tables sample the same distribution.
    pub fn sample_transition(
        &self,
        level: usize,
        shell: usize,
        xi: f64,
    ) -> TardisResult<MacroAtomTransition> {
        if shell >= self.n_shells() {
            return Err(TardisError::IndexOutOfBounds {
                table: "transition_probabilities",
                index: shell,
                len: self.n_shells(),
            });
        }
        let block = self.block_range(level)?;
        let column = self.transition_probabilities.shell(shell);
        let total: f64 = block.clone().map(|t| column[t]).sum();
        if total <= 0.0 || !total.is_finite() {
            return Err(TardisError::DataConsistency(format!(
                "macro atom level {level} has no outgoing probability in shell {shell}"
            )));
        }

        let target = xi * total;
        let mut cumulative = 0.0;
        let mut last_nonzero = block.start;
        for t in block {
            let p = column[t];
            if p > 0.0 {
                last_nonzero = t;
            }
            cumulative += p;
            if cumulative > target {
                return Ok(self.transition(t));
            }
        }
        // xi at the top of the range can miss every row through rounding.
        Ok(self.transition(last_nonzero))
    }

    /// Follow internal jumps from `activation_level` until a radiative
    /// de-excitation is drawn; the returned transition carries the emission line.
    ///
    /// Fails once more than [`MacroAtomState::max_jumps`] internal jumps are taken.
    pub fn emission_line<R: Rng + ?Sized>(
        &self,
        activation_level: usize,
        shell: usize,
        rng: &mut R,
    ) -> TardisResult<MacroAtomTransition> {
        let max_jumps = self.max_jumps;
        let mut level = activation_level;
        for _ in 0..=max_jumps {
            let transition = self.sample_transition(level, shell, rng.gen::<f64>())?;
            if transition.transition_type == TransitionType::RadiativeDeexcitation {
                return Ok(transition);
            }
            level = transition.destination_level;
        }
        Err(TardisError::DataConsistency(format!(
            "macro atom walk from level {activation_level} exceeded {max_jumps} internal jumps"
        )))
    }

    fn transition(&self, t: usize) -> MacroAtomTransition {
        MacroAtomTransition {
            transition_id: t,
            transition_type: self.transition_type[t],
            destination_level: self.destination_level_idx[t],
            line: self.lines_idx[t],
        }
    }
}

/// Block offsets must stay inside the transition table and every level
/// reference must name an existing block.
fn check_topology(
    block_references: &Array1<usize>,
    destination_level_idx: &Array1<usize>,
    lines_upper2macro_reference_idx: &Array1<usize>,
    n_transitions: usize,
) -> TardisResult<()> {
    let n_levels = block_references.len();
    for level in 0..n_levels {
        let start = block_references[level];
        if start > n_transitions {
            return Err(TardisError::IndexOutOfBounds {
                table: "block_references",
                index: start,
                len: n_transitions,
            });
        }
        if level > 0 && start < block_references[level - 1] {
            return Err(TardisError::DataConsistency(format!(
                "block_references decrease at level {level}"
            )));
        }
    }
    if let Some(&level) = destination_level_idx.iter().find(|&&d| d >= n_levels) {
        return Err(TardisError::IndexOutOfBounds {
            table: "destination_level_idx",
            index: level,
            len: n_levels,
        });
    }
    if let Some(&level) = lines_upper2macro_reference_idx
        .iter()
        .find(|&&l| l >= n_levels)
    {
        return Err(TardisError::IndexOutOfBounds {
            table: "lines_upper2macro_reference_idx",
            index: level,
            len: n_levels,
        });
    }
    Ok(())
}
