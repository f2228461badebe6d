use crate::domain::ports::PromptProvider;
use crate::utils::error::{AdError, Result};
use std::collections::VecDeque;
#[cfg(feature = "cli")]
use std::io::{BufRead, IsTerminal, Write};

/// 終端機輸入。stdin 不是 TTY 時（例如管線輸入）逐行讀取，不顯示互動提示
#[cfg(feature = "cli")]
#[derive(Debug, Default)]
pub struct ConsolePrompt;

#[cfg(feature = "cli")]
impl ConsolePrompt {
    pub fn new() -> Self {
        Self
    }

    fn is_interactive() -> bool {
        std::io::stdin().is_terminal() && std::io::stderr().is_terminal()
    }

    fn read_piped_line(prompt: &str) -> Result<String> {
        eprint!("{}", prompt);
        std::io::stderr().flush()?;

        let mut line = String::new();
        let read = std::io::stdin().lock().read_line(&mut line)?;
        if read == 0 {
            return Err(AdError::PromptError {
                message: "input closed before an answer was given".to_string(),
            });
        }
        Ok(line.trim_end_matches(|c: char| c == '\r' || c == '\n').to_string())
    }
}

// dialoguer 會自己補上 ": "
#[cfg(feature = "cli")]
fn label(prompt: &str) -> &str {
    prompt.trim_end_matches(|c: char| c == ':' || c == ' ')
}

#[cfg(feature = "cli")]
impl PromptProvider for ConsolePrompt {
    fn ask_line(&mut self, prompt: &str) -> Result<String> {
        if !Self::is_interactive() {
            return Self::read_piped_line(prompt);
        }

        dialoguer::Input::<String>::new()
            .with_prompt(label(prompt))
            .allow_empty(true)
            .interact_text()
            .map_err(|e| AdError::PromptError {
                message: e.to_string(),
            })
    }

    fn ask_secret(&mut self, prompt: &str) -> Result<String> {
        if !Self::is_interactive() {
            return Self::read_piped_line(prompt);
        }

        dialoguer::Password::new()
            .with_prompt(label(prompt))
            .allow_empty_password(true)
            .interact()
            .map_err(|e| AdError::PromptError {
                message: e.to_string(),
            })
    }
}

/// 預先排好的回答，依序取用；用完後再問就回傳 `PromptError`
#[derive(Debug, Default, Clone)]
pub struct ScriptedPrompt {
    answers: VecDeque<String>,
    asked: Vec<String>,
}

impl ScriptedPrompt {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            asked: Vec::new(),
        }
    }

    /// 目前為止顯示過的提示文字
    pub fn asked(&self) -> &[String] {
        &self.asked
    }
}

impl PromptProvider for ScriptedPrompt {
    fn ask_line(&mut self, prompt: &str) -> Result<String> {
        self.asked.push(prompt.to_string());
        self.answers.pop_front().ok_or_else(|| AdError::PromptError {
            message: format!("no scripted answer for '{}'", prompt.trim()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_prompt_answers_in_order() {
        let mut prompt = ScriptedPrompt::new(["jdoe", "secret"]);
        assert_eq!(prompt.ask_line("Username: ").unwrap(), "jdoe");
        assert_eq!(prompt.ask_secret("Password: ").unwrap(), "secret");

        let err = prompt.ask_line("Note: ").unwrap_err();
        assert!(matches!(err, AdError::PromptError { .. }));
        assert_eq!(prompt.asked(), ["Username: ", "Password: ", "Note: "]);
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_label_strips_trailing_colon() {
        assert_eq!(label("First name: "), "First name");
        assert_eq!(label("Group to add (leave blank to skip): "), "Group to add (leave blank to skip)");
    }
}
