//! Human feedback gate.
//!
//! Between turns the operator is shown a fixed menu and picks what happens
//! next. The gate only reads and trims the choice; deciding what an
//! unrecognized choice means is left to the controller.

use async_trait::async_trait;
use tandem_core::error::GateError;

/// Line-oriented access to the human operator.
#[async_trait]
pub trait Operator: Send {
    /// Show text to the operator.
    async fn show(&mut self, text: &str) -> Result<(), GateError>;

    /// Show `prompt` and block until one line is read.
    /// `Ok(None)` means the input was closed.
    async fn read_line(&mut self, prompt: &str) -> Result<Option<String>, GateError>;
}

/// The operator's choice after a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Feedback(String),
    ModifyQuestion(String),
    ViewDetails,
    Exit,
    /// Anything not on the menu, as typed
    Invalid(String),
}

/// Menu entries, in display order. The key is what the operator types.
pub const MENU: [(&str, &str); 5] = [
    ("1", "Continue to the next iteration (let the agents keep improving)"),
    ("2", "Give feedback (add your own guidance)"),
    ("3", "Modify the question (start over with a new task)"),
    ("4", "View details (show the full current answer)"),
    ("5", "Exit the loop (accept the current result)"),
];

const CHOICE_PROMPT: &str = "Choose an action [1-5] (default 1):";
const FEEDBACK_PROMPT: &str = "Enter your feedback:";
const QUESTION_PROMPT: &str = "Enter the new question:";

/// Presents the decision menu through an [`Operator`].
pub struct HumanFeedbackGate {
    operator: Box<dyn Operator>,
}

impl HumanFeedbackGate {
    pub fn new(operator: Box<dyn Operator>) -> Self {
        Self { operator }
    }

    /// Render the menu as shown to the operator.
    pub fn menu_text() -> String {
        let mut text = String::new();
        for (key, label) in MENU {
            text.push_str(&format!("{key}. {label}\n"));
        }
        text
    }

    async fn read_trimmed(&mut self, prompt: &str) -> Result<String, GateError> {
        match self.operator.read_line(prompt).await? {
            Some(line) => Ok(line.trim().to_string()),
            None => Err(GateError::InputClosed),
        }
    }

    /// Ask for free text, substituting `default` for an empty answer.
    pub async fn ask(&mut self, prompt: &str, default: &str) -> Result<String, GateError> {
        let answer = self.read_trimmed(prompt).await?;
        if answer.is_empty() {
            Ok(default.to_string())
        } else {
            Ok(answer)
        }
    }

    /// Pass a status line through to the operator.
    pub async fn show(&mut self, text: &str) -> Result<(), GateError> {
        self.operator.show(text).await
    }

    /// Show the menu and read one decision.
    ///
    /// Empty input means continue. Feedback and a new question are read
    /// with a follow-up prompt; leaving either empty also means continue.
    pub async fn prompt(&mut self) -> Result<Decision, GateError> {
        self.operator.show(&Self::menu_text()).await?;
        let choice = self.read_trimmed(CHOICE_PROMPT).await?;

        let decision = match choice.as_str() {
            "" | "1" => Decision::Continue,
            "2" => {
                let feedback = self.read_trimmed(FEEDBACK_PROMPT).await?;
                if feedback.is_empty() {
                    Decision::Continue
                } else {
                    Decision::Feedback(feedback)
                }
            }
            "3" => {
                let question = self.read_trimmed(QUESTION_PROMPT).await?;
                if question.is_empty() {
                    Decision::Continue
                } else {
                    Decision::ModifyQuestion(question)
                }
            }
            "4" => Decision::ViewDetails,
            "5" => Decision::Exit,
            _ => Decision::Invalid(choice),
        };

        Ok(decision)
    }
}
