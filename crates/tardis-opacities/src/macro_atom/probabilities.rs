// ─────────────────────────────────────────────────────────────────────
// TARDIS-RS — Macro Atom Transition Probabilities
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Per-shell macro atom transition probabilities.
//!
//! p[t, s] = coef[t] · β[line(t), s], and for upward internal jumps
//! additionally · J[line(t), s] · stim[line(t), s]. Rows are transitions,
//! columns are shells; per-shell inputs are indexed by line.

use super::coefficients::TransitionCoefficients;
use crate::sobolev::BetaSobolev;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};
use tardis_types::atomic::AtomicData;
use tardis_types::config::ZeroWeightPolicy;
use tardis_types::error::{TardisError, TardisResult};
use tracing::debug;

/// (transition, shell) probability table.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionProbabilities {
    values: Array2<f64>,
}

impl TransitionProbabilities {
    pub fn from_array(values: Array2<f64>) -> Self {
        TransitionProbabilities { values }
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn into_inner(self) -> Array2<f64> {
        self.values
    }

    pub fn n_transitions(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_shells(&self) -> usize {
        self.values.ncols()
    }

    pub fn get(&self, transition: usize, shell: usize) -> Option<f64> {
        self.values.get([transition, shell]).copied()
    }

    /// Probabilities of all transitions in one shell.
    pub fn shell(&self, shell: usize) -> ArrayView1<'_, f64> {
        self.values.column(shell)
    }
}

fn check_shape(
    table: &'static str,
    view: &ArrayView2<'_, f64>,
    expected: (usize, usize),
) -> TardisResult<()> {
    let actual = view.dim();
    if actual != expected {
        return Err(TardisError::ShapeMismatch {
            table,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Combine coefficients with the radiation field in every shell.
///
/// `mean_intensities`, `stimulated_emission_factor`, `tau_sobolev` and a
/// present `beta_sobolev` must share one (n_lines, n_shells) shape, and every
/// `lines_idx` must address a row of them. An absent `beta_sobolev` is derived
/// from `tau_sobolev`.
#[allow(clippy::too_many_arguments)]
pub fn calculate_transition_probabilities(
    atomic_data: &AtomicData,
    beta_sobolev: &BetaSobolev<'_>,
    mean_intensities: ArrayView2<'_, f64>,
    stimulated_emission_factor: ArrayView2<'_, f64>,
    tau_sobolev: ArrayView2<'_, f64>,
    coefficients: &TransitionCoefficients,
    normalize: bool,
    zero_weight_policy: ZeroWeightPolicy,
) -> TardisResult<TransitionProbabilities> {
    let (n_lines, n_shells) = mean_intensities.dim();
    check_shape("tau_sobolev", &tau_sobolev, (n_lines, n_shells))?;
    check_shape(
        "stimulated_emission_factor",
        &stimulated_emission_factor,
        (n_lines, n_shells),
    )?;
    if let BetaSobolev::Present(beta) = beta_sobolev {
        check_shape("beta_sobolev", beta, (n_lines, n_shells))?;
    }

    let lines_idx = &atomic_data.macro_atom_data.lines_idx;
    let n_transitions = lines_idx.len();
    if coefficients.n_transitions() != n_transitions {
        return Err(TardisError::DataConsistency(format!(
            "coefficient table has {} rows, atomic data has {} transitions",
            coefficients.n_transitions(),
            n_transitions
        )));
    }
    if let Some(&bad) = lines_idx.iter().find(|&&line| line >= n_lines) {
        return Err(TardisError::IndexOutOfBounds {
            table: "mean_intensities",
            index: bad,
            len: n_lines,
        });
    }
    if let Some(&bad) = coefficients
        .transition_up_filter
        .iter()
        .find(|&&t| t >= n_transitions)
    {
        return Err(TardisError::IndexOutOfBounds {
            table: "transition_up_filter",
            index: bad,
            len: n_transitions,
        });
    }

    let beta = beta_sobolev.resolve(tau_sobolev);

    let mut probabilities = Array2::zeros((n_transitions, n_shells));
    for (t, mut row) in probabilities.axis_iter_mut(Axis(0)).enumerate() {
        let coef = coefficients.transition_probability_coef[t];
        Zip::from(&mut row)
            .and(beta.row(lines_idx[t]))
            .for_each(|p, &b| *p = coef * b);
    }

    for &t in &coefficients.transition_up_filter {
        let line = lines_idx[t];
        Zip::from(probabilities.row_mut(t))
            .and(mean_intensities.row(line))
            .and(stimulated_emission_factor.row(line))
            .for_each(|p, &j, &stim| *p *= j * stim);
    }

    if normalize {
        normalize_transition_probabilities(
            &mut probabilities,
            &coefficients.block_references,
            zero_weight_policy,
        )?;
    }

    Ok(TransitionProbabilities::from_array(probabilities))
}

/// Rescale every (level block, shell) column to unit sum.
///
/// `block_references` is the terminated form with n_levels + 1 entries.
/// Non-empty blocks whose column sums to zero are handled per `policy`;
/// empty blocks are skipped. Returns how many zero-weight columns were left.
pub fn normalize_transition_probabilities(
    probabilities: &mut Array2<f64>,
    block_references: &Array1<usize>,
    policy: ZeroWeightPolicy,
) -> TardisResult<usize> {
    let n_rows = probabilities.nrows();
    for i in 1..block_references.len() {
        if block_references[i] < block_references[i - 1] {
            return Err(TardisError::DataConsistency(format!(
                "block_references decrease at level {i}"
            )));
        }
    }
    if let Some(&end) = block_references.iter().last() {
        if end != n_rows {
            return Err(TardisError::DataConsistency(format!(
                "block_references end at {end}, probability table has {n_rows} rows"
            )));
        }
    }

    let mut zero_weight = 0usize;
    for level in 0..block_references.len().saturating_sub(1) {
        let (start, end) = (block_references[level], block_references[level + 1]);
        if start == end {
            continue;
        }
        let mut block = probabilities.slice_mut(s![start..end, ..]);
        for (shell, mut column) in block.axis_iter_mut(Axis(1)).enumerate() {
            let norm = column.sum();
            if !norm.is_finite() {
                return Err(TardisError::DataConsistency(format!(
                    "macro atom level {level} has non-finite outgoing weight {norm} in shell {shell}"
                )));
            }
            if norm != 0.0 {
                column /= norm;
            } else {
                match policy {
                    ZeroWeightPolicy::LeaveZero => zero_weight += 1,
                    ZeroWeightPolicy::Reject => {
                        return Err(TardisError::ZeroWeightBlock { level, shell })
                    }
                }
            }
        }
    }

    if zero_weight > 0 {
        debug!(zero_weight, "macro atom blocks with zero outgoing weight left at zero");
    }
    Ok(zero_weight)
}
