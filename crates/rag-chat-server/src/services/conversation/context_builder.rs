use super::types::RetrievedPassage;
use crate::models::chat::ChatMessage;

/// Renders ranked passages into the labeled context block of a prompt
#[derive(Debug, Clone)]
pub struct ContextFormatter {
    char_limit: usize,
}

impl ContextFormatter {
    pub fn new(char_limit: usize) -> Self {
        Self { char_limit }
    }

    /// `[Source i: <source>]` header line, trimmed content, blank line between
    /// segments. Truncation counts characters, not bytes.
    pub fn format(&self, passages: &[RetrievedPassage]) -> String {
        passages
            .iter()
            .enumerate()
            .map(|(i, passage)| {
                format!(
                    "[Source {}: {}]\n{}",
                    i + 1,
                    passage.source_id,
                    truncate_chars(passage.content.trim(), self.char_limit)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl Default for ContextFormatter {
    fn default() -> Self {
        Self::new(500)
    }
}

/// Cut `text` to at most `limit` chars, appending `...` when anything was cut
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Deterministic prompt assembly
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system_prompt: String,
    context_header: String,
    history_window: usize,
}

impl PromptBuilder {
    pub fn new(
        system_prompt: impl Into<String>,
        context_header: impl Into<String>,
        history_window: usize,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            context_header: context_header.into(),
            history_window,
        }
    }

    pub fn build(&self, user_query: &str, context: &str, history: &[ChatMessage]) -> String {
        let mut parts: Vec<String> = vec![self.system_prompt.clone()];

        if !context.trim().is_empty() {
            parts.push(format!("\n{}\n{}", self.context_header, context));
        }

        if !history.is_empty() {
            parts.push("\nConversation history:".to_string());
            let start = history.len().saturating_sub(self.history_window);
            for turn in &history[start..] {
                parts.push(format!("{}: {}", turn.role.speaker(), turn.content));
            }
        }

        parts.push(format!("\nHuman: {}", user_query));
        parts.push("\nAssistant: ".to_string());

        parts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(content: &str, source: &str, rank: usize) -> RetrievedPassage {
        RetrievedPassage {
            content: content.to_string(),
            source_id: source.to_string(),
            rank,
        }
    }

    fn builder() -> PromptBuilder {
        PromptBuilder::new("SYSTEM", "Relevant information:", 6)
    }

    #[test]
    fn test_format_labels_and_joins_passages() {
        let formatter = ContextFormatter::new(500);
        let context = formatter.format(&[
            passage("  Petrarch wrote letters.\n", "handbook.pdf", 1),
            passage("Erasmus edited texts.", "companion.pdf", 2),
        ]);

        assert_eq!(
            context,
            "[Source 1: handbook.pdf]\nPetrarch wrote letters.\n\n[Source 2: companion.pdf]\nErasmus edited texts."
        );
    }

    #[test]
    fn test_format_empty_is_empty() {
        assert_eq!(ContextFormatter::default().format(&[]), "");
    }

    #[test]
    fn test_truncation_counts_chars_not_bytes() {
        let formatter = ContextFormatter::new(3);
        let context = formatter.format(&[passage("ææææ", "a.pdf", 1)]);
        assert_eq!(context, "[Source 1: a.pdf]\næææ...");

        assert_eq!(truncate_chars("abc", 3), "abc");
        assert_eq!(truncate_chars("abcd", 3), "abc...");
    }

    #[test]
    fn test_build_without_context_or_history() {
        let prompt = builder().build("What is humanism?", "", &[]);
        assert_eq!(prompt, "SYSTEM\n\nHuman: What is humanism?\n\nAssistant: ");
        assert!(!prompt.contains("Relevant information"));
        assert!(!prompt.contains("Conversation history"));
    }

    #[test]
    fn test_build_with_context_and_history_window() {
        let history: Vec<ChatMessage> = (0..5)
            .flat_map(|i| {
                vec![
                    ChatMessage::user(format!("q{}", i)),
                    ChatMessage::assistant(format!("a{}", i)),
                ]
            })
            .collect();

        let prompt = builder().build("next", "[Source 1: x.pdf]\nbody", &history);

        assert!(prompt.starts_with("SYSTEM\n\nRelevant information:\n[Source 1: x.pdf]\nbody\n"));
        assert!(prompt.contains(
            "\nConversation history:\nHuman: q2\nAssistant: a2\nHuman: q3\nAssistant: a3\nHuman: q4\nAssistant: a4\n"
        ));
        assert!(!prompt.contains("q1"));
        assert!(prompt.ends_with("\nHuman: next\n\nAssistant: "));
    }

    #[test]
    fn test_blank_context_is_omitted() {
        let prompt = builder().build("q", "   \n", &[]);
        assert!(!prompt.contains("Relevant information"));
    }
}
