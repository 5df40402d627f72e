// ─────────────────────────────────────────────────────────────────────
// TARDIS-RS — Sobolev Escape Probability
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Sobolev escape probability β = (1 − e^{−τ}) / τ.

use ndarray::{Array2, ArrayView2, CowArray, Ix2};

/// Above this optical depth β is taken as 1/τ.
const TAU_OPTICALLY_THICK: f64 = 1e3;

/// Below this optical depth β is expanded to first order, 1 − τ/2.
const TAU_OPTICALLY_THIN: f64 = 1e-4;

/// Escape probability for a single Sobolev optical depth.
pub fn beta_sobolev(tau: f64) -> f64 {
    if tau > TAU_OPTICALLY_THICK {
        1.0 / tau
    } else if tau < TAU_OPTICALLY_THIN {
        1.0 - 0.5 * tau
    } else {
        -(-tau).exp_m1() / tau
    }
}

/// Element-wise [`beta_sobolev`] over a (line, shell) table.
pub fn calculate_beta_sobolev(tau_sobolev: ArrayView2<'_, f64>) -> Array2<f64> {
    tau_sobolev.mapv(beta_sobolev)
}

/// Beta Sobolev table handed to the probability calculator.
#[derive(Debug, Clone)]
pub enum BetaSobolev<'a> {
    /// Precomputed (line, shell) table, used as-is.
    Present(ArrayView2<'a, f64>),
    /// Derive β from the Sobolev optical depths with [`calculate_beta_sobolev`].
    Absent,
}

impl<'a> BetaSobolev<'a> {
    pub fn is_present(&self) -> bool {
        matches!(self, BetaSobolev::Present(_))
    }

    /// Borrow the present table or compute one from `tau_sobolev`.
    pub fn resolve(&self, tau_sobolev: ArrayView2<'_, f64>) -> CowArray<'a, f64, Ix2> {
        match self {
            BetaSobolev::Present(view) => CowArray::from(view.clone()),
            BetaSobolev::Absent => CowArray::from(calculate_beta_sobolev(tau_sobolev)),
        }
    }
}

impl<'a> From<Option<&'a Array2<f64>>> for BetaSobolev<'a> {
    fn from(table: Option<&'a Array2<f64>>) -> Self {
        match table {
            Some(t) => BetaSobolev::Present(t.view()),
            None => BetaSobolev::Absent,
        }
    }
}
