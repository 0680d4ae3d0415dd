mod registry;
mod ws_handler;

pub use registry::{ClientHandle, Registry};
pub use ws_handler::ws_handler;
