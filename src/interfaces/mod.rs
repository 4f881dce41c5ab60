// ============================================================================
// Interfaces Module
// Contains all trait definitions, contracts and inbound request types
// ============================================================================

mod event_handler;
mod matching_control;
mod requests;

pub use event_handler::{
    ChannelEventHandler, EventHandler, LoggingEventHandler, NoOpEventHandler, OrderEvent,
    RecordingEventHandler,
};
pub use matching_control::{ControlError, ControlResult, EntryKind, MatchingControl};
pub use requests::{ChangeMatchingStateRq, DeleteOrderRq, EnterOrderRq, RequestKind};
