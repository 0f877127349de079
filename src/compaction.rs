//! Logical context compression: ask the model to summarize a discussion

use crate::format::Message;

/// Instruction prepended to a discussion that should be summarized
pub const LOGICAL_COMPRESS_PROMPT: &str = "Compress logically (summarize) context of this discussion so it will contain only important details dropping noise for further discussion. Return only single message.";

/// Sampling temperature used for summaries
pub const LOGICAL_COMPRESS_TEMPERATURE: f64 = 0.3;

/// Build the outgoing sequence for a compression call: the fixed system
/// instruction followed by the discussion itself
pub fn compression_request(discussion: &[Message]) -> Vec<Message> {
    let mut request = Vec::with_capacity(discussion.len() + 1);
    request.push(Message::system(LOGICAL_COMPRESS_PROMPT));
    request.extend_from_slice(discussion);
    request
}
