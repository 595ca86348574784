pub mod app_state;
pub mod event_bus;

pub use app_state::*;
pub use event_bus::*;
