//! Macro atom line interaction model.
//!
//! Coefficients are derived once from atomic data, combined with the
//! per-shell radiation field into transition probabilities, and packaged
//! into an immutable [`MacroAtomState`] for packet transport.

pub mod coefficients;
pub mod probabilities;
pub mod solver;
pub mod state;

pub use coefficients::{initialize_transition_probabilities, TransitionCoefficients};
pub use probabilities::{
    calculate_transition_probabilities, normalize_transition_probabilities,
    TransitionProbabilities,
};
pub use solver::MacroAtomSolver;
pub use state::{MacroAtomState, MacroAtomTransition};
