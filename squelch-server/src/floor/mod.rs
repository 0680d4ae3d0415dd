mod arbiter;
mod control;

pub use arbiter::{FloorArbiter, FloorRelease, FloorRequest};
pub use control::FloorControl;
