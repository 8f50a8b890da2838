//! The chat orchestration core of RelayChat.
//!
//! One user turn flows through three pieces:
//!
//! 1. **Window**: pick the bounded slice of history replayed upstream
//! 2. **Relay**: drive the provider call, emit fragments as they decode,
//!    and persist the final or partial assistant turn
//! 3. **Turn controller**: append the user turn, resolve the model, and
//!    dispatch to the streaming or non-streaming relay path

pub mod relay;
pub mod stream_event;
pub mod turn;
pub mod window;

#[cfg(test)]
mod test_helpers;

pub use relay::{RelayReport, RelayState, StreamingRelay};
pub use stream_event::{RelayEvent, SsePayload};
pub use turn::{TurnController, TurnOutcome, TurnRequest, TurnSettings};
