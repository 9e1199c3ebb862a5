// Re-export all model types from submodules.

pub use display::DisplayOptions;
pub use interface::{InterfaceRecord, LinkRemoved, Message, StatsSample};

mod display;
mod interface;
