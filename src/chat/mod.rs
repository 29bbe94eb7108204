//! Guided chat assistant.
//!
//! A short scripted dialogue: the user describes their symptoms, picks a specific
//! variant when the description used an ambiguous term, gives a duration, and gets
//! the service's best match. The script then starts over after a short pause.
//!
//! ```text
//!   Symptoms ──(family keyword)──> FamilyClarify ──> Days ──(predict)──> [pause] ──> Symptoms
//!       └──────────(no keyword)──────────────────────^
//! ```

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::api::{ApiResult, ConfidenceScale, PredictionRequest, PredictionResult};
use crate::config::Config;

/// Ambiguous symptom terms and the specific variants offered for each.
/// Scanned in this order; the first keyword contained in the input wins.
pub const SYMPTOM_FAMILIES: &[(&str, &[&str])] = &[
    ("fever", &["high fever", "mild fever"]),
    (
        "pain",
        &[
            "headache",
            "chest pain",
            "stomach pain",
            "abdominal pain",
            "back pain",
            "joint pain",
            "neck pain",
        ],
    ),
    ("vision", &["blurred vision", "visual disturbances"]),
    ("urine", &["dark urine", "yellow urine", "burning urination"]),
];

pub const GREETING: &str = "Hi! Tell me your symptoms in a sentence.";
pub const ASK_DAYS: &str = "How many days have you had these symptoms?";
pub const ANALYZING: &str = "Analyzing symptoms...";
pub const NO_PREDICTION: &str = "No prediction found.";
pub const SERVER_ERROR: &str = "Server error. Try again.";
pub const PRECAUTIONS_HEADER: &str = "Recommended precautions:";
pub const START_OVER: &str = "You can enter new symptoms to check again.";

/// First family keyword contained in `text`, case-insensitively.
pub fn find_family(text: &str) -> Option<(&'static str, &'static [&'static str])> {
    let lower = text.to_lowercase();
    SYMPTOM_FAMILIES
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .copied()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    Bot,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub from: Sender,
    pub text: String,
    /// Quick replies offered with a bot question
    pub options: Option<Vec<String>>,
}

impl ChatMessage {
    pub fn bot(text: impl Into<String>) -> Self {
        Self { from: Sender::Bot, text: text.into(), options: None }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self { from: Sender::User, text: text.into(), options: None }
    }

    fn question(text: impl Into<String>, options: &[&str]) -> Self {
        Self {
            from: Sender::Bot,
            text: text.into(),
            options: Some(options.iter().map(|o| o.to_string()).collect()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Symptoms,
    FamilyClarify { family: &'static str },
    Days,
}

/// What the script does with one user message
enum Step {
    Ask(Stage),
    Predict(PredictionRequest),
}

pub struct ChatSession {
    stage: Stage,
    symptom_text: String,
    messages: VecDeque<ChatMessage>,
    /// Messages ever emitted, including ones dropped by the cap
    emitted: usize,
    history_cap: usize,
    scale: ConfidenceScale,
    reset_delay: Duration,
    /// When the script goes back to `Symptoms`; dropped with the session
    pending_reset: Option<Instant>,
}

impl ChatSession {
    pub fn new(config: &Config) -> Self {
        let mut session = Self {
            stage: Stage::Symptoms,
            symptom_text: String::new(),
            messages: VecDeque::new(),
            emitted: 0,
            history_cap: config.chat_history_cap(),
            scale: config.confidence_scale(),
            reset_delay: config.reset_delay(),
            pending_reset: None,
        };
        session.push(ChatMessage::bot(GREETING));
        session
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn pending_family(&self) -> Option<&'static str> {
        match self.stage {
            Stage::FamilyClarify { family } => Some(family),
            _ => None,
        }
    }

    /// Symptom description collected so far in this cycle
    pub fn symptom_text(&self) -> &str {
        &self.symptom_text
    }

    pub fn messages(&self) -> &VecDeque<ChatMessage> {
        &self.messages
    }

    /// Quick replies on offer, when the script is waiting for a choice.
    pub fn current_options(&self) -> Option<&[String]> {
        if self.pending_family().is_none() {
            return None;
        }
        self.messages
            .iter()
            .rev()
            .find(|m| m.from == Sender::Bot)
            .and_then(|m| m.options.as_deref())
    }

    pub fn pending_reset(&self) -> Option<Instant> {
        self.pending_reset
    }

    /// Messages emitted after `mark`, where `mark` is an earlier [`emitted`](Self::emitted) count.
    pub fn messages_since(&self, mark: usize) -> impl Iterator<Item = &ChatMessage> {
        let fresh = self.emitted.saturating_sub(mark).min(self.messages.len());
        self.messages.iter().skip(self.messages.len() - fresh)
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }

    fn push(&mut self, message: ChatMessage) {
        self.emitted += 1;
        self.messages.push_back(message);
        while self.messages.len() > self.history_cap {
            self.messages.pop_front();
        }
    }

    /// Record one user message and advance the script. Returns the prediction
    /// to request when the message completes a cycle; the answer goes to
    /// [`finish_prediction`](Self::finish_prediction). Blank input is ignored.
    pub fn begin_message(&mut self, input: &str) -> Option<PredictionRequest> {
        if input.trim().is_empty() {
            return None;
        }
        if self.pending_reset.is_some() {
            self.start_over();
        }

        self.push(ChatMessage::user(input));
        match self.step(input) {
            Step::Ask(stage) => {
                debug!(from = ?self.stage, to = ?stage, "chat stage change");
                self.stage = stage;
                None
            }
            Step::Predict(request) => Some(request),
        }
    }

    /// Show the answer to a prediction and schedule the restart.
    pub fn finish_prediction(&mut self, outcome: ApiResult<PredictionResult>) {
        self.show_prediction(outcome);
        self.pending_reset = Some(Instant::now() + self.reset_delay);
    }

    /// Value of the quick reply at `index`, if one is on offer.
    pub fn option_value(&self, index: usize) -> Option<String> {
        self.current_options()
            .and_then(|options| options.get(index))
            .cloned()
    }

    fn step(&mut self, input: &str) -> Step {
        match self.stage {
            Stage::Symptoms => {
                self.symptom_text = input.to_string();
                match find_family(input) {
                    Some((family, variants)) => {
                        self.push(ChatMessage::question(format!("Which type of {}?", family), variants));
                        Step::Ask(Stage::FamilyClarify { family })
                    }
                    None => {
                        self.push(ChatMessage::bot(ASK_DAYS));
                        Step::Ask(Stage::Days)
                    }
                }
            }
            Stage::FamilyClarify { .. } => {
                self.symptom_text.push(' ');
                self.symptom_text.push_str(&input.to_lowercase());
                self.push(ChatMessage::bot(ASK_DAYS));
                Step::Ask(Stage::Days)
            }
            Stage::Days => {
                self.push(ChatMessage::bot(ANALYZING));
                Step::Predict(PredictionRequest {
                    symptoms: Vec::new(),
                    text: self.symptom_text.clone(),
                    days: PredictionRequest::days_from(input),
                    age: 0,
                })
            }
        }
    }

    fn show_prediction(&mut self, outcome: ApiResult<PredictionResult>) {
        let result = match outcome {
            Ok(result) => result,
            Err(e) if e.is_connectivity() => {
                warn!(error = %e, "chat prediction failed");
                self.push(ChatMessage::bot(SERVER_ERROR));
                return;
            }
            // e.g. "No valid symptoms found": nothing matched the description
            Err(e) => {
                debug!(error = %e, "service found no prediction");
                self.push(ChatMessage::bot(NO_PREDICTION));
                return;
            }
        };

        let scale = result.scale_or(self.scale);
        let Some(top) = result.diseases.into_iter().next() else {
            self.push(ChatMessage::bot(NO_PREDICTION));
            return;
        };

        self.push(ChatMessage::bot(format!("{} ({})", top.disease, scale.format(top.confidence))));
        if !top.description.is_empty() {
            self.push(ChatMessage::bot(top.description));
        }
        if !top.precautions.is_empty() {
            self.push(ChatMessage::bot(PRECAUTIONS_HEADER));
            for precaution in top.precautions {
                self.push(ChatMessage::bot(format!("• {}", precaution)));
            }
        }
    }

    fn start_over(&mut self) {
        self.pending_reset = None;
        self.push(ChatMessage::bot(START_OVER));
        self.stage = Stage::Symptoms;
        debug!("chat script restarted");
    }

    /// Restart the script if its pause has elapsed by `now`.
    pub fn apply_due_reset(&mut self, now: Instant) -> bool {
        match self.pending_reset {
            Some(deadline) if now >= deadline => {
                self.start_over();
                true
            }
            _ => false,
        }
    }

    /// Wait out the post-prediction pause and restart the script.
    pub async fn run_pending_reset(&mut self) -> bool {
        let Some(deadline) = self.pending_reset else {
            return false;
        };
        tokio::time::sleep_until(deadline).await;
        self.start_over();
        true
    }

    pub fn cancel_pending_reset(&mut self) {
        self.pending_reset = None;
    }
}
