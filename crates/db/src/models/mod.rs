pub mod trigger;
pub mod trigger_event;

pub use trigger::Trigger;
pub use trigger_event::TriggerEvent;
