use crate::model::{Role, Turn};
use crate::server::request::ChatRequest;
use crate::suggest;

/// Append-only conversation history with a fixed seed prefix.
///
/// The seed is never trimmed; once the transcript grows past `max_turns`,
/// the oldest turns after the seed are dropped.
#[derive(Debug, Clone)]
pub struct Transcript {
    seed: Vec<Turn>,
    turns: Vec<Turn>,
    max_turns: usize,
}

impl Transcript {
    pub fn new(system_prompt: &str, max_turns: usize) -> Self {
        let seed = seed_turns(system_prompt);
        Self {
            turns: seed.clone(),
            seed,
            max_turns,
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::user(text));
        self.trim();
    }

    pub fn push_model(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::model(text));
        self.trim();
    }

    /// Removes the most recent turn unless it belongs to the seed.
    pub fn pop_last(&mut self) -> Option<Turn> {
        if self.turns.len() <= self.seed.len() {
            return None;
        }
        self.turns.pop()
    }

    pub fn reset(&mut self) {
        self.turns = self.seed.clone();
    }

    fn trim(&mut self) {
        if self.turns.len() <= self.max_turns {
            return;
        }

        // The newest turn always survives, and the kept tail opens on a user
        // turn whenever it holds more than one.
        let keep_tail = self.max_turns.saturating_sub(self.seed.len()).max(1);
        let mut tail_start = self.turns.len().saturating_sub(keep_tail).max(self.seed.len());
        while tail_start + 1 < self.turns.len() && self.turns[tail_start].role == Role::Model {
            tail_start += 1;
        }

        let mut trimmed = self.seed.clone();
        trimmed.extend_from_slice(&self.turns[tail_start..]);
        self.turns = trimmed;
    }
}

fn seed_turns(system_prompt: &str) -> Vec<Turn> {
    if system_prompt.trim().is_empty() {
        Vec::new()
    } else {
        vec![Turn::user(system_prompt)]
    }
}

fn history_turns(request: &ChatRequest) -> impl Iterator<Item = Turn> + '_ {
    request.history().iter().filter_map(|entry| {
        let text = entry.content.trim();
        if text.is_empty() {
            None
        } else {
            Some(Turn {
                role: Role::from_label(&entry.role),
                text: text.to_string(),
            })
        }
    })
}

/// Seed, prior history, then the new message.
pub fn contents_for_chat(request: &ChatRequest, system_prompt: &str) -> Vec<Turn> {
    let mut contents = seed_turns(system_prompt);
    contents.extend(history_turns(request));
    if let Some(message) = request.trimmed_message() {
        contents.push(Turn::user(message));
    }
    contents
}

/// Like [`contents_for_chat`], with the suggestion instruction placed just
/// before the new message.
pub fn contents_for_prompts(request: &ChatRequest, system_prompt: &str) -> Vec<Turn> {
    let mut contents = seed_turns(system_prompt);
    contents.extend(history_turns(request));
    contents.push(Turn::user(suggest::INSTRUCTION));
    if let Some(message) = request.trimmed_message() {
        contents.push(Turn::user(message));
    }
    contents
}

#[cfg(test)]
mod tests {
    use super::{Transcript, contents_for_chat, contents_for_prompts};
    use crate::model::Role;
    use crate::server::request::ChatRequest;
    use crate::suggest;

    fn request(json: &str) -> ChatRequest {
        serde_json::from_str(json).expect("request should parse")
    }

    #[test]
    fn new_transcript_starts_with_seed() {
        let transcript = Transcript::new("be wise", 10);
        assert_eq!(transcript.turns().len(), 1);
        assert_eq!(transcript.turns()[0].text, "be wise");
        assert_eq!(transcript.turns()[0].role, Role::User);
    }

    #[test]
    fn blank_system_prompt_yields_empty_seed() {
        let transcript = Transcript::new("   ", 10);
        assert!(transcript.turns().is_empty());
    }

    #[test]
    fn trim_keeps_seed_and_most_recent_turns() {
        let mut transcript = Transcript::new("seed", 4);
        for idx in 0..5 {
            transcript.push_user(format!("q{idx}"));
            transcript.push_model(format!("a{idx}"));
        }

        let texts: Vec<&str> = transcript
            .turns()
            .iter()
            .map(|turn| turn.text.as_str())
            .collect();
        assert_eq!(texts, vec!["seed", "q4", "a4"]);
    }

    #[test]
    fn trim_keeps_newest_turn_when_cap_leaves_no_room() {
        let mut transcript = Transcript::new("seed", 1);
        transcript.push_user("what is dharma?");

        let texts: Vec<&str> = transcript
            .turns()
            .iter()
            .map(|turn| turn.text.as_str())
            .collect();
        assert_eq!(texts, vec!["seed", "what is dharma?"]);

        transcript.push_model("duty");
        transcript.push_user("and karma?");
        assert_eq!(
            transcript.turns().last().map(|turn| turn.text.as_str()),
            Some("and karma?")
        );
        assert_eq!(transcript.turns().len(), 2);
    }

    #[test]
    fn trimmed_history_never_opens_on_a_model_turn() {
        for cap in 2..8 {
            let mut transcript = Transcript::new("seed", cap);
            for idx in 0..6 {
                transcript.push_user(format!("q{idx}"));
                transcript.push_model(format!("a{idx}"));
                let after_seed = &transcript.turns()[1..];
                assert!(after_seed.len() <= cap.max(2), "cap {cap}: {after_seed:?}");
                if after_seed.len() > 1 {
                    assert_eq!(after_seed[0].role, Role::User, "cap {cap}: {after_seed:?}");
                }
            }
        }
    }

    #[test]
    fn pop_last_never_removes_seed() {
        let mut transcript = Transcript::new("seed", 10);
        transcript.push_user("hello");
        assert_eq!(
            transcript.pop_last().map(|turn| turn.text),
            Some("hello".to_string())
        );
        assert!(transcript.pop_last().is_none());
        assert_eq!(transcript.turns().len(), 1);
    }

    #[test]
    fn reset_restores_seed_only() {
        let mut transcript = Transcript::new("seed", 10);
        transcript.push_user("hello");
        transcript.push_model("hi");
        transcript.reset();
        assert_eq!(transcript.turns().len(), 1);
        assert_eq!(transcript.turns()[0].text, "seed");
    }

    #[test]
    fn contents_for_chat_maps_history_and_skips_blank_entries() {
        let req = request(
            r#"{
                "message": "  what is dharma?  ",
                "history": [
                    {"role": "user", "content": "hi"},
                    {"role": "assistant", "content": "namaste"},
                    {"role": "model", "content": "   "},
                    {"role": "system", "content": "stay calm"}
                ]
            }"#,
        );

        let contents = contents_for_chat(&req, "seed");
        let summary: Vec<(Role, &str)> = contents
            .iter()
            .map(|turn| (turn.role, turn.text.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (Role::User, "seed"),
                (Role::User, "hi"),
                (Role::Model, "namaste"),
                (Role::User, "stay calm"),
                (Role::User, "what is dharma?"),
            ]
        );
    }

    #[test]
    fn contents_for_chat_omits_blank_message() {
        let req = request(r#"{"message": " ", "history": [{"role": "user", "content": "hi"}]}"#);
        let contents = contents_for_chat(&req, "seed");
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[1].text, "hi");
    }

    #[test]
    fn contents_for_prompts_places_instruction_before_message() {
        let req = request(r#"{"message": "tell me about karma"}"#);
        let contents = contents_for_prompts(&req, "seed");
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1].text, suggest::INSTRUCTION);
        assert_eq!(contents[2].text, "tell me about karma");
    }
}
