use std::io::{self, IsTerminal, Write};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const RED: &str = "\x1b[31m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const CYAN: &str = "\x1b[36m";

const SPINNER_FRAMES: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
const SPINNER_INTERVAL: Duration = Duration::from_millis(80);

pub fn paint(color: &str, text: &str) -> String {
    format!("{color}{text}{RESET}")
}

pub fn banner(model: &str) -> String {
    format!(
        "{BOLD}{CYAN}🕉  Guru{RESET} {DIM}({model}){RESET}\n\
         {DIM}Ask anything. '/history' shows the conversation, '/reset' starts over, 'exit' quits.{RESET}\n"
    )
}

pub fn stdout_is_terminal() -> bool {
    io::stdout().is_terminal()
}

/// Animated "thinking…" indicator drawn on the current line.
///
/// Only animates when stdout is a terminal; otherwise it is inert so piped
/// output stays clean.
pub struct Spinner {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Spinner {
    pub fn start() -> Self {
        if !stdout_is_terminal() {
            return Self {
                stop: None,
                task: None,
            };
        }

        let (stop, mut stopped) = oneshot::channel();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SPINNER_INTERVAL);
            let mut frame = 0usize;
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {
                        let glyph = SPINNER_FRAMES[frame % SPINNER_FRAMES.len()];
                        print!("\r{YELLOW}{glyph}{RESET} {DIM}thinking…{RESET}");
                        let _ = io::stdout().flush();
                        frame += 1;
                    }
                }
            }
            print!("\r\x1b[2K");
            let _ = io::stdout().flush();
        });

        Self {
            stop: Some(stop),
            task: Some(task),
        }
    }

    /// Stops the animation and clears its line before returning.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}
