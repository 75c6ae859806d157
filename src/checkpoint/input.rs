//! Sources of checkpoint answers.

use std::collections::VecDeque;
use std::io::{self, ErrorKind};

use console::style;
use dialoguer::{Input, theme::ColorfulTheme};

/// Where the checkpoint reads answers from.
pub trait SelectionInput: Send {
    /// Read one answer. `Ok(None)` means the input is closed.
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>>;

    /// Show the candidates before the first prompt.
    fn show(&mut self, _text: &str) {}

    /// Tell the user something, such as why an answer was rejected.
    fn notify(&mut self, _message: &str) {}
}

/// Interactive terminal prompt.
#[derive(Debug, Default)]
pub struct TerminalInput;

impl SelectionInput for TerminalInput {
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        let answer = Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text();

        match answer {
            Ok(line) => Ok(Some(line)),
            Err(err) => {
                let err: io::Error = err.into();
                match err.kind() {
                    ErrorKind::UnexpectedEof | ErrorKind::Interrupted => Ok(None),
                    _ => Err(err),
                }
            }
        }
    }

    fn show(&mut self, text: &str) {
        println!("{}", style("Discovered travel regions").bold().cyan());
        println!("{text}");
    }

    fn notify(&mut self, message: &str) {
        println!("  {}", style(message).yellow());
    }
}

/// Pre-recorded answers, for tests and non-interactive runs.
#[derive(Debug, Default)]
pub struct ScriptedInput {
    answers: VecDeque<String>,
    prompts: usize,
    shown: String,
    notices: Vec<String>,
}

impl ScriptedInput {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn prompts(&self) -> usize {
        self.prompts
    }

    pub fn shown(&self) -> &str {
        &self.shown
    }

    pub fn notices(&self) -> &[String] {
        &self.notices
    }
}

impl SelectionInput for ScriptedInput {
    fn read_line(&mut self, _prompt: &str) -> io::Result<Option<String>> {
        self.prompts += 1;
        Ok(self.answers.pop_front())
    }

    fn show(&mut self, text: &str) {
        self.shown.push_str(text);
    }

    fn notify(&mut self, message: &str) {
        self.notices.push(message.to_string());
    }
}
