pub mod ai_output;

pub use ai_output::*;
