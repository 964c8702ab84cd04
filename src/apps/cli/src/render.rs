//! Terminal rendering of a streaming session

use parley_stream::types::MessageSnapshot;
use parley_stream::{SessionObserver, StreamError};
use std::io::Write;
use std::sync::Mutex;

#[derive(Default)]
struct Printed {
    reasoning: usize,
    answer: usize,
}

/// Prints new reasoning text to stderr and new answer text to stdout.
#[derive(Default)]
pub struct TerminalRenderer {
    printed: Mutex<Printed>,
}

impl TerminalRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Suffix of `text` not printed yet. Both buffers are append-only while open.
fn unseen(text: &str, printed: usize) -> &str {
    text.get(printed..).unwrap_or_default()
}

impl SessionObserver for TerminalRenderer {
    fn on_mutation(&self, snapshot: &MessageSnapshot) {
        let Ok(mut printed) = self.printed.lock() else {
            return;
        };

        let reasoning = unseen(&snapshot.reasoning_text, printed.reasoning);
        if !reasoning.is_empty() {
            let mut err = std::io::stderr().lock();
            let _ = write!(err, "{}", reasoning);
            let _ = err.flush();
            printed.reasoning = snapshot.reasoning_text.len();
        }

        let answer = unseen(&snapshot.answer_text, printed.answer);
        if !answer.is_empty() {
            if printed.answer == 0 && printed.reasoning > 0 {
                eprintln!();
            }
            let mut out = std::io::stdout().lock();
            let _ = write!(out, "{}", answer);
            let _ = out.flush();
            printed.answer = snapshot.answer_text.len();
        }
    }

    fn on_finalized(&self, message: &MessageSnapshot) {
        println!();
        if let Some(file) = &message.attached_artifact {
            eprintln!(
                "[file] {} ({})",
                file.name,
                file.download_url.as_deref().unwrap_or(&file.id)
            );
        }
        if let Some(elapsed_ms) = message.reasoning_elapsed_ms {
            eprintln!("[reasoned for {:.1}s]", elapsed_ms as f64 / 1000.0);
        }
    }

    fn on_aborted(&self) {
        eprintln!("\n[stopped]");
    }

    fn on_failed(&self, error: &StreamError) {
        eprintln!("\n[error] {}", error);
    }
}
