//! Call-session lifecycle: the per-call state machine, the session
//! registry, the meeting store, and session event fan-out.

pub mod events;
pub mod manager;
pub mod state;
pub mod store;

pub use events::{EventBus, EventKind, EventSink, SessionEvent};
pub use manager::CallSessionManager;
pub use state::{CallSessionConfig, CallSessionState, SessionStatus, SessionSummary};
pub use store::MeetingStore;
