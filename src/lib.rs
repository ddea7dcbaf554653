//! Stochastic grammar expansion — generates varied token sequences from
//! named production rules.
//!
//! Each rule picks one of its items according to a selection policy
//! (uniform, weighted, conditional, sequential or permuted) and items
//! expand recursively into literal tokens.

pub mod core;
