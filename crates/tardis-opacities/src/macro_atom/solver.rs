// ─────────────────────────────────────────────────────────────────────
// TARDIS-RS — Macro Atom Solver
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Macro atom opacity solver.
//!
//! Owns the initialize/normalize policy and the coefficient cache, and
//! assembles a fresh [`MacroAtomState`] on every solve.

use super::coefficients::{initialize_transition_probabilities, TransitionCoefficients};
use super::probabilities::{calculate_transition_probabilities, TransitionProbabilities};
use super::state::MacroAtomState;
use crate::sobolev::BetaSobolev;
use ndarray::{Array1, ArrayView2};
use std::sync::Arc;
use tardis_types::atomic::AtomicData;
use tardis_types::config::{MacroAtomConfig, ZeroWeightPolicy, DEFAULT_MAX_JUMPS};
use tardis_types::error::{TardisError, TardisResult};
use tracing::{debug, info};

/// Coefficient lifecycle: computed at most once per (solver, dataset) unless
/// explicitly re-initialized.
#[derive(Debug, Clone)]
enum CoefficientCache {
    Uninitialized,
    Initialized(Arc<TransitionCoefficients>),
}

/// Solver for macro atom transition probabilities.
#[derive(Debug, Clone)]
pub struct MacroAtomSolver {
    initialize: bool,
    normalize: bool,
    zero_weight_policy: ZeroWeightPolicy,
    max_jumps: usize,
    cache: CoefficientCache,
    initializations: usize,
}

impl Default for MacroAtomSolver {
    fn default() -> Self {
        Self::from_config(&MacroAtomConfig::default())
    }
}

impl MacroAtomSolver {
    /// `initialize`: compute coefficients on the first solve.
    /// `normalize`: rescale each level's outgoing probabilities to unit sum.
    pub fn new(initialize: bool, normalize: bool) -> Self {
        MacroAtomSolver {
            initialize,
            normalize,
            zero_weight_policy: ZeroWeightPolicy::default(),
            max_jumps: DEFAULT_MAX_JUMPS,
            cache: CoefficientCache::Uninitialized,
            initializations: 0,
        }
    }

    pub fn from_config(config: &MacroAtomConfig) -> Self {
        Self::new(config.initialize, config.normalize)
            .with_zero_weight_policy(config.zero_weight_policy)
            .with_max_jumps(config.max_jumps)
    }

    /// Solver that reuses coefficients computed elsewhere, e.g. by another
    /// worker's solver over the same dataset.
    pub fn with_coefficients(
        config: &MacroAtomConfig,
        coefficients: Arc<TransitionCoefficients>,
    ) -> Self {
        let mut solver = Self::from_config(config);
        solver.initialize = false;
        solver.cache = CoefficientCache::Initialized(coefficients);
        solver
    }

    pub fn with_zero_weight_policy(mut self, policy: ZeroWeightPolicy) -> Self {
        self.zero_weight_policy = policy;
        self
    }

    /// Jump limit handed to every state this solver builds.
    pub fn with_max_jumps(mut self, max_jumps: usize) -> Self {
        self.max_jumps = max_jumps;
        self
    }

    /// Whether the next solve recomputes the coefficients first.
    pub fn needs_initialization(&self) -> bool {
        self.initialize
    }

    pub fn normalize(&self) -> bool {
        self.normalize
    }

    pub fn zero_weight_policy(&self) -> ZeroWeightPolicy {
        self.zero_weight_policy
    }

    pub fn max_jumps(&self) -> usize {
        self.max_jumps
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.cache, CoefficientCache::Initialized(_))
    }

    /// Number of times the coefficient table has been computed by this solver.
    pub fn initialization_count(&self) -> usize {
        self.initializations
    }

    pub fn coefficients(&self) -> Option<&Arc<TransitionCoefficients>> {
        match &self.cache {
            CoefficientCache::Initialized(coef) => Some(coef),
            CoefficientCache::Uninitialized => None,
        }
    }

    /// Terminated block references of the cached coefficients.
    pub fn block_references(&self) -> Option<&Array1<usize>> {
        self.coefficients().map(|coef| &coef.block_references)
    }

    /// Compute and cache the coefficients and block references.
    ///
    /// Always recomputes; on failure the previous cache is kept.
    pub fn initialize_transition_probabilities(
        &mut self,
        atomic_data: &AtomicData,
    ) -> TardisResult<()> {
        let coefficients = initialize_transition_probabilities(atomic_data)?;
        self.cache = CoefficientCache::Initialized(Arc::new(coefficients));
        self.initialize = false;
        self.initializations += 1;
        info!(
            n_transitions = atomic_data.n_transitions(),
            n_levels = atomic_data.n_levels(),
            "macro atom solver initialized"
        );
        Ok(())
    }

    /// Initialize if the policy asks for it, then return the cached coefficients.
    ///
    /// Fails with [`TardisError::StaleCache`] when initialization is disabled
    /// and nothing has been cached yet.
    pub fn ensure_initialized(
        &mut self,
        atomic_data: &AtomicData,
    ) -> TardisResult<Arc<TransitionCoefficients>> {
        if self.initialize {
            self.initialize_transition_probabilities(atomic_data)?;
        }
        match &self.cache {
            CoefficientCache::Initialized(coef) => Ok(Arc::clone(coef)),
            CoefficientCache::Uninitialized => Err(TardisError::StaleCache),
        }
    }

    /// Transition probabilities for every shell.
    pub fn solve_transition_probabilities(
        &mut self,
        atomic_data: &AtomicData,
        mean_intensities: ArrayView2<'_, f64>,
        tau_sobolev: ArrayView2<'_, f64>,
        beta_sobolev: BetaSobolev<'_>,
        stimulated_emission_factor: ArrayView2<'_, f64>,
    ) -> TardisResult<TransitionProbabilities> {
        let coefficients = self.ensure_initialized(atomic_data)?;

        let probabilities = calculate_transition_probabilities(
            atomic_data,
            &beta_sobolev,
            mean_intensities,
            stimulated_emission_factor,
            tau_sobolev,
            &coefficients,
            self.normalize,
            self.zero_weight_policy,
        )?;

        debug!(
            n_transitions = probabilities.n_transitions(),
            n_shells = probabilities.n_shells(),
            normalize = self.normalize,
            beta_sobolev_given = beta_sobolev.is_present(),
            "solved macro atom transition probabilities"
        );
        Ok(probabilities)
    }

    /// Full solve: transition probabilities plus the static topology.
    ///
    /// `atomic_data` is not modified; its topology columns are shared with
    /// the returned state, which rejects offsets or level references that
    /// no longer fit the transition table.
    pub fn solve(
        &mut self,
        mean_intensities: ArrayView2<'_, f64>,
        atomic_data: &AtomicData,
        tau_sobolev: ArrayView2<'_, f64>,
        stimulated_emission_factor: ArrayView2<'_, f64>,
        beta_sobolev: BetaSobolev<'_>,
    ) -> TardisResult<MacroAtomState> {
        let transition_probabilities = self.solve_transition_probabilities(
            atomic_data,
            mean_intensities,
            tau_sobolev,
            beta_sobolev,
            stimulated_emission_factor,
        )?;

        let macro_atom_info = &atomic_data.macro_atom_data;
        MacroAtomState::new(
            transition_probabilities,
            Arc::clone(&macro_atom_info.transition_type),
            Arc::clone(&macro_atom_info.destination_level_idx),
            Arc::clone(&macro_atom_info.lines_idx),
            Arc::clone(&atomic_data.macro_atom_references.block_references),
            Arc::clone(&atomic_data.lines_upper2macro_reference_idx),
        )
        .map(|state| state.with_max_jumps(self.max_jumps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tardis_types::atomic::TransitionType::*;
    use tardis_types::atomic::{MacroAtomData, MacroAtomReferences};

    /// Level 0 has two outgoing transitions, level 1 has one.
    fn toy_atomic_data() -> AtomicData {
        AtomicData::try_new(
            MacroAtomData {
                transition_type: Arc::new(array![
                    RadiativeDeexcitation,
                    InternalUp,
                    RadiativeDeexcitation
                ]),
                destination_level_idx: Arc::new(array![0, 1, 0]),
                lines_idx: Arc::new(array![0, 1, 1]),
                transition_probability: Arc::new(array![2.0, 1.0, 3.0]),
            },
            MacroAtomReferences {
                block_references: Arc::new(array![0, 2]),
            },
            array![0, 1],
        )
        .unwrap()
    }

    fn uniform(n_lines: usize, n_shells: usize) -> Array2<f64> {
        Array2::ones((n_lines, n_shells))
    }

    #[test]
    fn test_toy_scenario_normalizes_each_level() {
        let data = toy_atomic_data();
        let ones = uniform(2, 2);
        let mut solver = MacroAtomSolver::new(true, true);

        let state = solver
            .solve(ones.view(), &data, ones.view(), ones.view(), BetaSobolev::Absent)
            .unwrap();

        let p = state.transition_probabilities();
        assert_eq!(p.values().dim(), (3, 2));
        for shell in 0..2 {
            let level0 = p.get(0, shell).unwrap() + p.get(1, shell).unwrap();
            assert!((level0 - 1.0).abs() < 1e-10);
            assert!((p.get(2, shell).unwrap() - 1.0).abs() < 1e-10);
            // Uniform field: level 0 splits by base rate, 2:1.
            assert!((p.get(0, shell).unwrap() - 2.0 / 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_unnormalized_solve_keeps_raw_rates() {
        let data = toy_atomic_data();
        let ones = uniform(2, 1);
        let beta = Array2::from_elem((2, 1), 0.5);
        let mut solver = MacroAtomSolver::new(true, false);

        let p = solver
            .solve_transition_probabilities(
                &data,
                ones.view(),
                ones.view(),
                BetaSobolev::Present(beta.view()),
                ones.view(),
            )
            .unwrap();
        assert!((p.get(0, 0).unwrap() - 1.0).abs() < 1e-15);
        assert!((p.get(1, 0).unwrap() - 0.5).abs() < 1e-15);
        assert!((p.get(2, 0).unwrap() - 1.5).abs() < 1e-15);
    }

    #[test]
    fn test_lazy_initialization_runs_once() {
        let mut data = toy_atomic_data();
        let ones = uniform(2, 2);
        let mut solver = MacroAtomSolver::new(true, true);
        assert!(solver.needs_initialization());
        assert!(!solver.is_initialized());

        let first = solver
            .solve(ones.view(), &data, ones.view(), ones.view(), BetaSobolev::Absent)
            .unwrap();
        assert_eq!(solver.initialization_count(), 1);
        assert!(!solver.needs_initialization());

        // The cached coefficients must survive a change to the dataset.
        data.macro_atom_data.transition_probability = Arc::new(array![5.0, 5.0, 5.0]);
        let second = solver
            .solve(ones.view(), &data, ones.view(), ones.view(), BetaSobolev::Absent)
            .unwrap();
        assert_eq!(solver.initialization_count(), 1);
        assert_eq!(first.transition_probabilities(), second.transition_probabilities());
    }

    #[test]
    fn test_explicit_reinitialization_picks_up_new_data() {
        let mut data = toy_atomic_data();
        let ones = uniform(2, 1);
        let mut solver = MacroAtomSolver::new(true, true);
        solver
            .solve(ones.view(), &data, ones.view(), ones.view(), BetaSobolev::Absent)
            .unwrap();

        data.macro_atom_data.transition_probability = Arc::new(array![5.0, 5.0, 5.0]);
        solver.initialize_transition_probabilities(&data).unwrap();
        let state = solver
            .solve(ones.view(), &data, ones.view(), ones.view(), BetaSobolev::Absent)
            .unwrap();
        assert_eq!(solver.initialization_count(), 2);
        assert!((state.transition_probabilities().get(0, 0).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_initialization_is_idempotent() {
        let data = toy_atomic_data();
        let mut solver = MacroAtomSolver::default();
        solver.initialize_transition_probabilities(&data).unwrap();
        let first = TransitionCoefficients::clone(solver.coefficients().unwrap());
        solver.initialize_transition_probabilities(&data).unwrap();
        assert_eq!(**solver.coefficients().unwrap(), first);
        assert_eq!(solver.block_references().unwrap(), &array![0, 2, 3]);
    }

    #[test]
    fn test_stale_cache_without_initialization() {
        let data = toy_atomic_data();
        let ones = uniform(2, 1);
        let mut solver = MacroAtomSolver::new(false, true);
        let err = solver
            .solve(ones.view(), &data, ones.view(), ones.view(), BetaSobolev::Absent)
            .unwrap_err();
        assert!(matches!(err, TardisError::StaleCache));
        assert_eq!(solver.initialization_count(), 0);
    }

    #[test]
    fn test_topology_is_shared_with_atomic_data() {
        let data = toy_atomic_data();
        let ones = uniform(2, 3);
        let mut solver = MacroAtomSolver::default();
        let state = solver
            .solve(ones.view(), &data, ones.view(), ones.view(), BetaSobolev::Absent)
            .unwrap();

        let mad = &data.macro_atom_data;
        assert!(Arc::ptr_eq(state.transition_type(), &mad.transition_type));
        assert!(Arc::ptr_eq(state.destination_level_idx(), &mad.destination_level_idx));
        assert!(Arc::ptr_eq(state.lines_idx(), &mad.lines_idx));
        assert!(Arc::ptr_eq(
            state.block_references(),
            &data.macro_atom_references.block_references
        ));
        assert!(Arc::ptr_eq(
            state.lines_upper2macro_reference_idx(),
            &data.lines_upper2macro_reference_idx
        ));
        assert_eq!(state.n_shells(), 3);
        assert_eq!(state.n_transitions(), 3);
    }

    #[test]
    fn test_shape_mismatch_produces_no_state() {
        let data = toy_atomic_data();
        let ones = uniform(2, 2);
        let tau = uniform(2, 3);
        let mut solver = MacroAtomSolver::default();
        let err = solver
            .solve(ones.view(), &data, tau.view(), ones.view(), BetaSobolev::Absent)
            .unwrap_err();
        assert!(matches!(
            err,
            TardisError::ShapeMismatch {
                table: "tau_sobolev",
                ..
            }
        ));
    }

    #[test]
    fn test_failed_initialization_keeps_previous_cache() {
        let mut data = toy_atomic_data();
        let mut solver = MacroAtomSolver::default();
        solver.initialize_transition_probabilities(&data).unwrap();

        data.macro_atom_data.lines_idx = Arc::new(array![0, 1]);
        assert!(solver.initialize_transition_probabilities(&data).is_err());
        assert!(solver.is_initialized());
        assert_eq!(solver.initialization_count(), 1);
    }

    #[test]
    fn test_shared_coefficients_skip_initialization() {
        let data = toy_atomic_data();
        let ones = uniform(2, 2);
        let config = MacroAtomConfig::default();
        let mut leader = MacroAtomSolver::from_config(&config);
        let coef = leader.ensure_initialized(&data).unwrap();

        let mut worker = MacroAtomSolver::with_coefficients(&config, Arc::clone(&coef));
        assert!(!worker.needs_initialization());
        let a = leader
            .solve(ones.view(), &data, ones.view(), ones.view(), BetaSobolev::Absent)
            .unwrap();
        let b = worker
            .solve(ones.view(), &data, ones.view(), ones.view(), BetaSobolev::Absent)
            .unwrap();
        assert_eq!(worker.initialization_count(), 0);
        assert_eq!(a.transition_probabilities(), b.transition_probabilities());
    }

    #[test]
    fn test_reject_policy_from_config() {
        let data = toy_atomic_data();
        let zeros = Array2::zeros((2, 1));
        let ones = uniform(2, 1);
        let config = MacroAtomConfig {
            zero_weight_policy: ZeroWeightPolicy::Reject,
            ..MacroAtomConfig::default()
        };
        let mut solver = MacroAtomSolver::from_config(&config);
        let err = solver
            .solve(
                ones.view(),
                &data,
                ones.view(),
                ones.view(),
                BetaSobolev::Present(zeros.view()),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            TardisError::ZeroWeightBlock { level: 0, shell: 0 }
        ));
    }

    #[test]
    fn test_block_references_changed_after_init_rejected() {
        let mut data = toy_atomic_data();
        let ones = uniform(2, 1);
        let mut solver = MacroAtomSolver::default();
        solver
            .solve(ones.view(), &data, ones.view(), ones.view(), BetaSobolev::Absent)
            .unwrap();

        data.macro_atom_references.block_references = Arc::new(array![0, 5]);
        let err = solver
            .solve(ones.view(), &data, ones.view(), ones.view(), BetaSobolev::Absent)
            .unwrap_err();
        assert!(matches!(
            err,
            TardisError::IndexOutOfBounds {
                table: "block_references",
                index: 5,
                len: 3
            }
        ));
    }

    #[test]
    fn test_config_jump_limit_reaches_emission_walk() {
        // Two levels that only jump into each other.
        let data = AtomicData::try_new(
            MacroAtomData {
                transition_type: Arc::new(array![InternalDown, InternalDown]),
                destination_level_idx: Arc::new(array![1, 0]),
                lines_idx: Arc::new(array![0, 1]),
                transition_probability: Arc::new(array![1.0, 1.0]),
            },
            MacroAtomReferences {
                block_references: Arc::new(array![0, 1]),
            },
            array![0, 1],
        )
        .unwrap();
        let config = MacroAtomConfig::from_json(
            &serde_json::json!({ "max_jumps": 8 }).to_string(),
        )
        .unwrap();
        let ones = uniform(2, 1);
        let mut solver = MacroAtomSolver::from_config(&config);
        assert_eq!(solver.max_jumps(), 8);

        let state = solver
            .solve(ones.view(), &data, ones.view(), ones.view(), BetaSobolev::Absent)
            .unwrap();
        assert_eq!(state.max_jumps(), 8);
        let mut rng = StdRng::seed_from_u64(3);
        let err = state.emission_line(0, 0, &mut rng).unwrap_err();
        match err {
            TardisError::DataConsistency(msg) => assert!(msg.contains("8 internal jumps")),
            _ => panic!("Expected DataConsistency for endless internal walk"),
        }
    }

    #[test]
    fn test_default_solver_uses_default_jump_limit() {
        assert_eq!(MacroAtomSolver::new(true, true).max_jumps(), DEFAULT_MAX_JUMPS);
    }
}
