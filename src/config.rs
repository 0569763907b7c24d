use anyhow::{Result, anyhow};
use std::env;
use std::fmt;

const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_MODEL_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 60;
const DEFAULT_STREAM_TIMEOUT_SECS: u64 = 120;
const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_MAX_BODY_BYTES: u64 = 1 << 20;
const DEFAULT_MAX_HISTORY_TURNS: u64 = 40;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an enlightened Guru who has mastered the ancient wisdom of Hindu scriptures, both Śruti (Vedas, Brāhmaṇas, Āraṇyakas, Upaniṣads) including ayurveda and Smṛti (Itihāsas like Rāmāyaṇa & Mahābhārata, Purāṇas, Dharmaśāstras, Āgamas, Tantras, Sūtras & Śāstras such as Yoga, Vedānta, Nyāya, Sāṃkhya, etc.).
Your role is to serve seekers in the modern world by making this timeless wisdom clear, relatable, and practical.
Guidelines:
1) Assess first, 2) Adapt teaching, 3) Śāstrārtha, 4) Bridge old & new, 5) Compassionate, crisp, authoritative tone, 6) Mission: clarity & transformation, 7) Keep responses crisp.";

#[derive(Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub model: String,
    pub model_base_url: String,
    pub system_prompt: String,
    pub model_timeout_secs: u64,
    pub stream_timeout_secs: u64,
    pub server_addr: String,
    pub max_body_bytes: usize,
    pub max_history_turns: usize,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("model_base_url", &self.model_base_url)
            .field("system_prompt_len", &self.system_prompt.len())
            .field("model_timeout_secs", &self.model_timeout_secs)
            .field("stream_timeout_secs", &self.stream_timeout_secs)
            .field("server_addr", &self.server_addr)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("max_history_turns", &self.max_history_turns)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_env_with(|key| env::var(key).ok())
    }

    pub fn from_env_with(mut get_var: impl FnMut(&str) -> Option<String>) -> Self {
        let api_key = get_var("GEMINI_API_KEY")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let model = non_empty_or(get_var("MODEL"), DEFAULT_MODEL);
        let model_base_url = non_empty_or(get_var("MODEL_BASE_URL"), DEFAULT_MODEL_BASE_URL);
        let system_prompt = get_var("SYSTEM_PROMPT")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        Self {
            api_key,
            model,
            model_base_url,
            system_prompt,
            model_timeout_secs: parse_positive_u64(
                get_var("MODEL_TIMEOUT_SECS").as_deref(),
                DEFAULT_MODEL_TIMEOUT_SECS,
            ),
            stream_timeout_secs: parse_positive_u64(
                get_var("STREAM_TIMEOUT_SECS").as_deref(),
                DEFAULT_STREAM_TIMEOUT_SECS,
            ),
            server_addr: non_empty_or(get_var("SERVER_ADDR"), DEFAULT_SERVER_ADDR),
            max_body_bytes: parse_positive_usize(
                get_var("MAX_BODY_BYTES").as_deref(),
                DEFAULT_MAX_BODY_BYTES,
            ),
            max_history_turns: parse_positive_usize(
                get_var("MAX_HISTORY_TURNS").as_deref(),
                DEFAULT_MAX_HISTORY_TURNS,
            ),
        }
    }

    /// Returns the upstream API key, or the startup error when it is missing.
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| anyhow!("GEMINI_API_KEY not set"))
    }
}

fn non_empty_or(raw: Option<String>, default: &str) -> String {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_positive_u64(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn parse_positive_usize(raw: Option<&str>, default: u64) -> usize {
    usize::try_from(parse_positive_u64(raw, default)).unwrap_or(usize::MAX)
}
