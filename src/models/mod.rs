pub mod enums;
pub mod patient;
pub mod clinical;
pub mod plan;
pub mod qc_flag;
pub mod workflow;
pub mod finalization;

pub use enums::*;
pub use patient::*;
pub use clinical::*;
pub use plan::*;
pub use qc_flag::*;
pub use workflow::*;
pub use finalization::*;
