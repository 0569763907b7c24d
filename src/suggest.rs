use tracing::warn;

pub const INSTRUCTION: &str = "Based on the conversation so far and the last user message, generate a list of short possible user prompts/questions the user might want to ask next.
- Keep each prompt under 10 words.
- Respond with a raw JSON array of strings, for example: [\"Question 1\", \"Question 2\"].
- The first character of your response must be '[' and the last must be ']'.
- Output must be valid JSON without backticks, code fences, markdown, or commentary.
- If no prompts apply, respond with [].";

/// Extracts suggested prompts from a model reply.
///
/// Models sometimes wrap the array in a Markdown fence despite being told not
/// to, so one fence is stripped before parsing. Anything that is not a JSON
/// array of strings yields an empty list.
pub fn parse_suggestions(raw: &str) -> Vec<String> {
    let body = strip_code_fence(raw.trim());
    if body.is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<Vec<String>>(body) {
        Ok(prompts) => prompts
            .into_iter()
            .map(|prompt| prompt.trim().to_string())
            .filter(|prompt| !prompt.is_empty())
            .collect(),
        Err(err) => {
            warn!(error = %err, reply_len = raw.len(), "unable to parse suggestions as JSON array");
            Vec::new()
        }
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop an optional language tag on the opening fence line.
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::parse_suggestions;

    #[test]
    fn parses_plain_json_array() {
        assert_eq!(
            parse_suggestions(r#"["What is karma?", "Explain dharma"]"#),
            vec!["What is karma?", "Explain dharma"]
        );
    }

    #[test]
    fn strips_markdown_fence() {
        let raw = "```json\n[\"What is moksha?\"]\n```";
        assert_eq!(parse_suggestions(raw), vec!["What is moksha?"]);
    }

    #[test]
    fn drops_blank_entries() {
        assert_eq!(
            parse_suggestions(r#"["  ", " Who was Vyasa? "]"#),
            vec!["Who was Vyasa?"]
        );
    }

    #[test]
    fn empty_array_and_empty_reply_yield_nothing() {
        assert!(parse_suggestions("[]").is_empty());
        assert!(parse_suggestions("   ").is_empty());
    }

    #[test]
    fn rejects_prose_and_other_shapes() {
        assert!(parse_suggestions("Here are some questions: 1. What is yoga?").is_empty());
        assert!(parse_suggestions(r#"{"prompts": ["a"]}"#).is_empty());
        assert!(parse_suggestions(r#"[1, 2]"#).is_empty());
    }
}
