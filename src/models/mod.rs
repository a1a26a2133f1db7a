pub mod ai_output;
pub mod enums;
pub mod patient;

pub use ai_output::*;
pub use enums::*;
pub use patient::*;
