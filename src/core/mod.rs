pub mod cond;
pub mod grammar;
pub mod item;
pub mod rule;
pub mod rules;
pub mod state;
