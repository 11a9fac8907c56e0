pub mod constants;
pub mod envelope;
pub mod events;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use constants::Method;
pub use envelope::{ErrorShape, EventFrame, Frame, RequestFrame, ResponseFrame};
pub use events::{ChatEvent, ChatRole, GatewayEvent, StreamState, ThinkingEvent, ToolEvent, ToolState};
pub use messages::{ClientInfo, ConnectAuth, ConnectParams, HelloOk};
