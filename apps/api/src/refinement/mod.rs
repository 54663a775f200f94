// Refinement: turns user feedback on an extraction into either a clarifying
// question or a rewritten instruction set.

pub mod engine;
pub mod prompts;

pub use engine::{RefinementEngine, RefinementError};
