//! History window selection.
//!
//! Bounds how much stored history is replayed upstream with each turn.

use relaychat_core::message::Message;

/// Default number of trailing messages considered per turn.
pub const DEFAULT_HISTORY_LIMIT: usize = 5;

/// The trailing `limit` messages, in original order.
pub fn select(messages: &[Message], limit: usize) -> &[Message] {
    let start = messages.len().saturating_sub(limit);
    &messages[start..]
}

/// The history sent upstream alongside the current user turn.
///
/// The current turn has already been appended to `messages`, so it is the
/// last element of the selection and is dropped here; adapters add it back
/// explicitly as the outgoing turn.
pub fn context_window(messages: &[Message], limit: usize) -> Vec<Message> {
    let selected = select(messages, limit);
    match selected.split_last() {
        Some((_current, history)) => history.to_vec(),
        None => Vec::new(),
    }
}
