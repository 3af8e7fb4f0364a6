//! Context assembly: stored history plus a new prompt into a message sequence

use crate::config::HistoryAttribution;
use crate::record::{ChatMessage, ContextRecord};

/// System-role marker announcing that prior context follows
pub const CONTEXT_MARKER: &str = "This is the past context for the conversation.";

/// Linearizes a user's stored history and a new prompt into the ordered
/// message sequence a generation call consumes.
///
/// No caching, deduplication, or size-bounding is performed: every past turn
/// is re-sent on every request. The assembler never touches the store; the
/// caller appends the new turn after generation completes.
pub struct ContextAssembler {
    attribution: HistoryAttribution,
}

impl ContextAssembler {
    pub fn new(attribution: HistoryAttribution) -> Self {
        Self { attribution }
    }

    /// Build the message sequence for a generation call.
    ///
    /// Shape: one system marker when history is non-empty, two entries per
    /// historical turn in stored order, then the new prompt as a user entry.
    pub fn assemble(&self, history: &[ContextRecord], prompt: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(1 + 2 * history.len() + 1);

        if !history.is_empty() {
            messages.push(ChatMessage::system(CONTEXT_MARKER));

            for record in history {
                match self.attribution {
                    HistoryAttribution::Collapsed => {
                        messages.push(ChatMessage::assistant(format!(
                            "Prompt: {}",
                            record.prompt
                        )));
                        messages.push(ChatMessage::assistant(format!(
                            "Response: {}",
                            record.response
                        )));
                    }
                    HistoryAttribution::Split => {
                        messages.push(ChatMessage::user(record.prompt.clone()));
                        messages.push(ChatMessage::assistant(record.response.clone()));
                    }
                }
            }
        }

        messages.push(ChatMessage::user(prompt));
        messages
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(HistoryAttribution::Collapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Role;

    fn history(turns: &[(&str, &str)]) -> Vec<ContextRecord> {
        turns
            .iter()
            .map(|(p, r)| ContextRecord::new("u1", *p, *r))
            .collect()
    }

    #[test]
    fn empty_history_yields_single_user_entry() {
        let assembler = ContextAssembler::default();
        let messages = assembler.assemble(&[], "hi");

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0], ChatMessage::user("hi"));
    }

    #[test]
    fn sequence_shape_is_marker_plus_two_per_turn_plus_prompt() {
        let assembler = ContextAssembler::default();
        let history = history(&[("a", "b"), ("c", "d"), ("e", "f")]);

        let messages = assembler.assemble(&history, "next");
        assert_eq!(messages.len(), 1 + 2 * 3 + 1);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, CONTEXT_MARKER);
        assert_eq!(messages.last().unwrap(), &ChatMessage::user("next"));
    }

    #[test]
    fn collapsed_attribution_echoes_both_sides_as_assistant() {
        let assembler = ContextAssembler::new(HistoryAttribution::Collapsed);
        let history = history(&[("hi", "hello")]);

        let messages = assembler.assemble(&history, "bye");
        assert_eq!(messages[1], ChatMessage::assistant("Prompt: hi"));
        assert_eq!(messages[2], ChatMessage::assistant("Response: hello"));
    }

    /// Documents the deliberate departure from the collapsed source behavior:
    /// split mode restores user/assistant attribution without prefixes.
    #[test]
    fn split_attribution_restores_roles() {
        let assembler = ContextAssembler::new(HistoryAttribution::Split);
        let history = history(&[("hi", "hello")]);

        let messages = assembler.assemble(&history, "bye");
        assert_eq!(messages[1], ChatMessage::user("hi"));
        assert_eq!(messages[2], ChatMessage::assistant("hello"));
    }

    #[test]
    fn history_keeps_stored_order() {
        let assembler = ContextAssembler::default();
        let history = history(&[("first", "1"), ("second", "2")]);

        let messages = assembler.assemble(&history, "third");
        assert_eq!(messages[1].content, "Prompt: first");
        assert_eq!(messages[3].content, "Prompt: second");
    }
}
