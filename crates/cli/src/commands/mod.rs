pub mod analyze;
pub mod decide;
pub mod inspect;
pub mod plan;
pub mod trace;

pub use analyze::*;
pub use decide::*;
pub use inspect::*;
pub use plan::*;
pub use trace::*;
