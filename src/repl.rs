use anyhow::{Context, Result};
use chrono::Local;
use std::io::{self, BufRead, Write};
use tracing::{debug, warn};

use crate::config::Config;
use crate::model::{ModelRequest, Turn};
use crate::model_gateway::ModelGateway;
use crate::terminal::{self, BOLD, CYAN, DIM, GREEN, RED, RESET, Spinner, YELLOW};
use crate::transcript::Transcript;

pub async fn run_repl(gateway: &dyn ModelGateway, cfg: &Config) -> Result<()> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut out = io::stdout();
    run_session(gateway, cfg, &mut input, &mut out).await
}

/// Drives one conversation over `input`, echoing replies to `out`.
pub async fn run_session(
    gateway: &dyn ModelGateway,
    cfg: &Config,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<()> {
    let mut transcript = Transcript::new(&cfg.system_prompt, cfg.max_history_turns);
    writeln!(out, "{}", terminal::banner(&cfg.model)).context("Failed to write banner")?;

    loop {
        write!(out, "{GREEN}{BOLD}You:{RESET} ").context("Failed to write prompt")?;
        out.flush().context("Failed to flush stdout")?;

        let mut line = String::new();
        let read = input
            .read_line(&mut line)
            .context("Failed to read stdin")?;
        if read == 0 {
            break;
        }

        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }
        if prompt.eq_ignore_ascii_case("exit") || prompt.eq_ignore_ascii_case("quit") {
            writeln!(out, "{CYAN}🙏 Goodbye!{RESET}")?;
            break;
        }
        if prompt.eq_ignore_ascii_case("/reset") {
            transcript.reset();
            writeln!(out, "{DIM}conversation reset{RESET}\n")?;
            continue;
        }
        if prompt.eq_ignore_ascii_case("/history") {
            print_history(out, transcript.turns())?;
            continue;
        }

        transcript.push_user(prompt);
        let request = ModelRequest {
            model: cfg.model.clone(),
            contents: transcript.turns().to_vec(),
        };
        debug!(turn_count = request.contents.len(), "sending repl turn");

        let spinner = Spinner::start();
        let result = gateway.generate(request).await;
        spinner.stop().await;

        match result {
            Ok(reply) => {
                let text = reply.text.trim();
                if text.is_empty() {
                    transcript.pop_last();
                    writeln!(
                        out,
                        "{YELLOW}(empty model reply: blocked or no text parts){RESET}\n"
                    )?;
                    continue;
                }
                let stamp = Local::now().format("%H:%M:%S");
                writeln!(out, "{CYAN}{BOLD}AI [{stamp}]{RESET}")?;
                writeln!(out, "{text}\n")?;
                transcript.push_model(text);
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "repl model call failed");
                transcript.pop_last();
                writeln!(out, "{RED}Error: {err:#}{RESET}\n")?;
            }
        }
    }

    Ok(())
}

fn print_history(out: &mut impl Write, turns: &[Turn]) -> Result<()> {
    if turns.is_empty() {
        writeln!(out, "(history is empty)\n")?;
        return Ok(());
    }

    for (idx, turn) in turns.iter().enumerate() {
        writeln!(out, "[{}] {}: {}", idx, turn.role.as_str(), turn.text)?;
    }
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::run_session;
    use crate::config::Config;
    use crate::model::Role;
    use crate::model_gateway::testing::StubGateway;

    fn test_config() -> Config {
        Config {
            api_key: Some("test-key".to_string()),
            model: "gemini-2.5-flash".to_string(),
            model_base_url: "http://127.0.0.1:9".to_string(),
            system_prompt: "You are a guru.".to_string(),
            model_timeout_secs: 5,
            stream_timeout_secs: 5,
            server_addr: "127.0.0.1:0".to_string(),
            max_body_bytes: 1024,
            max_history_turns: 40,
        }
    }

    async fn run(gateway: &StubGateway, script: &str) -> String {
        let mut input = Cursor::new(script.as_bytes().to_vec());
        let mut out = Vec::new();
        run_session(gateway, &test_config(), &mut input, &mut out)
            .await
            .expect("session should succeed");
        String::from_utf8(out).expect("output should be utf-8")
    }

    #[tokio::test]
    async fn replies_are_printed_and_remembered() {
        let gateway = StubGateway::ok(["  Namaste.  "]);
        let out = run(&gateway, "hello\n\n   \nwho am I?\nexit\n").await;

        assert!(out.contains("Namaste."));
        assert!(out.contains("AI ["));
        assert!(out.contains("Goodbye!"));

        let calls = gateway.recorded();
        assert_eq!(calls.len(), 2, "blank lines should not reach the model");
        let second: Vec<(Role, &str)> = calls[1]
            .contents
            .iter()
            .map(|turn| (turn.role, turn.text.as_str()))
            .collect();
        assert_eq!(
            second,
            vec![
                (Role::User, "You are a guru."),
                (Role::User, "hello"),
                (Role::Model, "Namaste."),
                (Role::User, "who am I?"),
            ]
        );
    }

    #[tokio::test]
    async fn errors_are_reported_and_turn_is_rolled_back() {
        let gateway = StubGateway::err("quota exhausted");
        let out = run(&gateway, "first\nsecond\nquit\n").await;

        assert!(out.contains("Error: quota exhausted"));
        let calls = gateway.recorded();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].contents.len(), 2, "failed turn should not linger");
        assert_eq!(calls[1].contents[1].text, "second");
    }

    #[tokio::test]
    async fn reset_and_history_commands_stay_local() {
        let gateway = StubGateway::ok(["ok"]);
        let out = run(&gateway, "hi\n/RESET\n/history\n").await;

        assert_eq!(gateway.recorded().len(), 1);
        assert!(out.contains("conversation reset"));
        assert!(out.contains("[0] user: You are a guru."));
        assert!(!out.contains("[1]"), "history should only hold the seed after reset");
    }

    #[tokio::test]
    async fn eof_ends_session_without_goodbye() {
        let gateway = StubGateway::ok(["ok"]);
        let out = run(&gateway, "").await;
        assert!(!out.contains("Goodbye"));
        assert!(gateway.recorded().is_empty());
    }

    #[tokio::test]
    async fn empty_reply_is_flagged_and_not_stored() {
        let gateway = StubGateway::ok([" "]);
        let out = run(&gateway, "hi\nagain\n").await;

        assert!(out.contains("empty model reply"));
        let calls = gateway.recorded();
        assert_eq!(calls[1].contents.len(), 2);
    }
}
