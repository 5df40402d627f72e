//! Opacity state construction for the Monte Carlo transport loop.
//!
//! Macro atom transition probabilities and Sobolev line helpers.

pub mod macro_atom;
pub mod sobolev;
