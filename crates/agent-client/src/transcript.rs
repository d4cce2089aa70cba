//! Transcript formatting for the analysis prompt.

use cm_domain::Message;

const PREAMBLE: &str = "Please analyze and evaluate the following conversation:\n\n";

/// Render the selected messages as a role-prefixed transcript wrapped in
/// the analysis prompt. `user` senders render as `User:`, everything
/// else as `Assistant:`, one message per paragraph.
pub fn format_transcript(messages: &[Message]) -> String {
    let dialog = messages
        .iter()
        .map(|m| format!("{}: {}", m.role(), m.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("{PREAMBLE}{dialog}")
}
