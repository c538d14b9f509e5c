use super::AgentConfig;

/// Characters of an attached file forwarded with a chat turn.
pub const FILE_EXCERPT_CHARS: usize = 2000;
pub const TRUNCATION_MARKER: &str = "... [truncated]";

const FILE_BEGIN: &str = "--- BEGIN FILE CONTENT ---";
const FILE_END: &str = "--- END FILE CONTENT ---";

pub fn chat_system_prompt(agent: &AgentConfig, file_context: bool) -> String {
    let file_line = if file_context {
        "Current file context available for reference."
    } else {
        "No file currently loaded."
    };
    format!(
        "You are {}, {}.\n\n\
         You can help users understand and analyze text files. Be helpful, accurate, and concise.\n\
         {}",
        agent.name,
        agent.description,
        file_line
    )
}

/// The final user message of a chat turn, with the file excerpt appended when present.
pub fn chat_user_message(message: &str, file_content: Option<&str>) -> String {
    let content = match file_content {
        Some(content) => content,
        None => return message.to_string(),
    };

    let (excerpt, truncated) = excerpt(content, FILE_EXCERPT_CHARS);
    let mut result = format!("User message: {}\n\nFile content for reference:\n{}\n{}", message, FILE_BEGIN, excerpt);
    if truncated {
        result.push('\n');
        result.push_str(TRUNCATION_MARKER);
    }
    result.push('\n');
    result.push_str(FILE_END);
    result
}

/// First `limit` characters of `content` and whether anything was cut.
pub fn excerpt(content: &str, limit: usize) -> (&str, bool) {
    match content.char_indices().nth(limit) {
        Some((byte_index, _)) => (&content[..byte_index], true),
        None => (content, false),
    }
}

pub fn analysis_system_prompt(agent: &AgentConfig) -> String {
    format!(
        "You are {}, {}.\n\n\
         Your task is to analyze the provided text content and provide a structured analysis.\n\n\
         Please provide:\n\
         1. A summary of the content\n\
         2. Key topics or themes identified\n\
         3. Important insights or findings\n\
         4. Suggested actions or next steps (if applicable)\n\n\
         Format your response in a clear, structured manner.",
        agent.name,
        agent.description
    )
}

pub fn analysis_user_prompt(content: &str, instructions: Option<&str>) -> String {
    let mut prompt = format!("Please analyze the following text content:\n\n{}\n", content);
    if let Some(instructions) = instructions.map(str::trim).filter(|i| !i.is_empty()) {
        prompt.push_str(&format!("\nAdditional instructions: {}\n", instructions));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> AgentConfig {
        AgentConfig {
            name: "FileProcessorAgent".into(),
            description: "AI agent for processing and analyzing text files".into(),
            model: "m".into(),
            base_url: "http://localhost".into(),
            api_key: None,
        }
    }

    #[test]
    fn system_prompt_states_file_availability_only() {
        let with_file = chat_system_prompt(&agent(), true);
        let without = chat_system_prompt(&agent(), false);
        assert!(with_file.starts_with("You are FileProcessorAgent"));
        assert!(with_file.contains("Current file context available"));
        assert!(without.contains("No file currently loaded"));
    }

    #[test]
    fn plain_message_is_forwarded_verbatim() {
        assert_eq!(chat_user_message("Hello", None), "Hello");
        assert_eq!(chat_user_message("", None), "");
    }

    #[test]
    fn short_file_is_embedded_whole_without_marker() {
        let msg = chat_user_message("Summarize", Some("line one\nline two"));
        assert!(msg.contains("User message: Summarize"));
        assert!(msg.contains("line one\nline two"));
        assert!(msg.contains(FILE_BEGIN));
        assert!(msg.contains(FILE_END));
        assert!(!msg.contains(TRUNCATION_MARKER));
    }

    #[test]
    fn long_file_is_cut_at_excerpt_limit() {
        let content = format!("{}{}", "a".repeat(FILE_EXCERPT_CHARS), "b".repeat(500));
        let msg = chat_user_message("Summarize", Some(&content));
        assert!(msg.contains(&"a".repeat(FILE_EXCERPT_CHARS)));
        assert!(!msg.contains('b'));
        assert!(msg.contains(TRUNCATION_MARKER));
    }

    #[test]
    fn excerpt_counts_characters_not_bytes() {
        let content = "é".repeat(3);
        assert_eq!(excerpt(&content, 2), ("éé", true));
        assert_eq!(excerpt(&content, 3), ("ééé", false));
    }

    #[test]
    fn analysis_prompt_appends_instructions_when_given() {
        let prompt = analysis_user_prompt("body", Some("Focus on dates"));
        assert!(prompt.contains("body"));
        assert!(prompt.ends_with("Additional instructions: Focus on dates\n"));
        assert!(!analysis_user_prompt("body", Some("  ")).contains("Additional instructions"));
        assert!(analysis_system_prompt(&agent()).contains("1. A summary of the content"));
    }
}
