//! # State
//!
//! Derives current/desired key state per GroupResource (spec.md §4.1).

mod state_deriver;

pub use state_deriver::{DerivedState, StateDeriver};
