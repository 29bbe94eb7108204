//! Symptom intake form and result panel.
//!
//! The panel owns the form fields, the symptom list, the suggestion list and the
//! outcome of the last analysis. Asynchronous operations are split into a
//! `begin_*` half that validates and issues a [`RequestToken`], and a `finish_*`
//! half that applies the outcome only if that token is still the latest one
//! issued for its kind. Late answers to superseded requests are dropped.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::api::{
    ApiError, ApiResult, HistoryEntry, PredictionRequest, PredictionResult, ReportRequest,
    SaveHistoryRequest, SymptomApi,
};
use crate::session::Session;

/// Minimum number of characters before suggestions are looked up
pub const SUGGEST_MIN_CHARS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RequestToken(u64);

/// Issues tokens for one kind of request and remembers the newest.
#[derive(Debug, Default)]
pub struct LatestRequest {
    issued: u64,
}

impl LatestRequest {
    pub fn issue(&mut self) -> RequestToken {
        self.issued += 1;
        RequestToken(self.issued)
    }

    pub fn is_latest(&self, token: RequestToken) -> bool {
        token.0 == self.issued
    }

    /// Make every outstanding token stale without starting a new request.
    pub fn invalidate(&mut self) {
        self.issued += 1;
    }
}

/// Message shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    MissingSymptoms,
    /// Error text reported by the service, shown verbatim
    Service(String),
    Unreachable,
    SavedToHistory,
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::MissingSymptoms => write!(f, "Please add symptoms or describe them in text"),
            Notice::Service(message) => write!(f, "{}", message),
            Notice::Unreachable => write!(f, "Backend not reachable. Is the prediction service running?"),
            Notice::SavedToHistory => write!(f, "Saved to history"),
        }
    }
}

impl From<&ApiError> for Notice {
    fn from(e: &ApiError) -> Self {
        match e {
            ApiError::Service(message) => Notice::Service(message.clone()),
            _ => Notice::Unreachable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum PanelState {
    #[default]
    Idle,
    Loading,
    ResultReady(PredictionResult),
    ErrorShown(Notice),
}

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("no analysis result yet")]
    NoResult,
    #[error("service rejected the report reference {0:?}")]
    BadReportReference(String),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("failed to write report to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug)]
pub struct IntakePanel {
    session: Session,
    symptoms: Vec<String>,
    symptom_input: String,
    free_text: String,
    days_input: String,
    age_input: String,
    suggestions: Vec<String>,
    history: Vec<HistoryEntry>,
    state: PanelState,
    suggest_requests: LatestRequest,
    analyze_requests: LatestRequest,
}

impl IntakePanel {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            symptoms: Vec::new(),
            symptom_input: String::new(),
            free_text: String::new(),
            days_input: String::new(),
            age_input: String::new(),
            suggestions: Vec::new(),
            history: Vec::new(),
            state: PanelState::Idle,
            suggest_requests: LatestRequest::default(),
            analyze_requests: LatestRequest::default(),
        }
    }

    pub fn symptoms(&self) -> &[String] {
        &self.symptoms
    }

    pub fn symptom_input(&self) -> &str {
        &self.symptom_input
    }

    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn state(&self) -> &PanelState {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, PanelState::Loading)
    }

    pub fn result(&self) -> Option<&PredictionResult> {
        match &self.state {
            PanelState::ResultReady(result) => Some(result),
            _ => None,
        }
    }

    pub fn set_free_text(&mut self, text: impl Into<String>) {
        self.free_text = text.into();
    }

    pub fn set_days(&mut self, days: impl Into<String>) {
        self.days_input = days.into();
    }

    pub fn set_age(&mut self, age: impl Into<String>) {
        self.age_input = age.into();
    }

    fn age(&self) -> u32 {
        PredictionRequest::age_from(&self.age_input)
    }

    /// Add a symptom unless it is blank or already listed. Clears the input
    /// field when something was added.
    pub fn add_symptom(&mut self, label: &str) -> bool {
        let label = label.trim();
        if label.is_empty() || self.symptoms.iter().any(|s| s == label) {
            return false;
        }
        self.symptoms.push(label.to_string());
        self.symptom_input.clear();
        true
    }

    pub fn remove_symptom(&mut self, label: &str) {
        self.symptoms.retain(|s| s != label);
    }

    /// Take a suggestion: same duplicate rule as [`add_symptom`](Self::add_symptom),
    /// and the suggestion list is dismissed.
    pub fn accept_suggestion(&mut self, label: &str) -> bool {
        let added = self.add_symptom(label);
        self.symptom_input.clear();
        self.suggestions.clear();
        self.suggest_requests.invalidate();
        added
    }

    /// Record the typed text and decide whether a lookup is needed.
    pub fn begin_suggest(&mut self, partial: &str) -> Option<RequestToken> {
        self.symptom_input = partial.to_string();
        if partial.chars().count() < SUGGEST_MIN_CHARS {
            self.suggestions.clear();
            self.suggest_requests.invalidate();
            return None;
        }
        Some(self.suggest_requests.issue())
    }

    /// Apply a lookup outcome. Returns false if a newer lookup superseded it.
    pub fn finish_suggest(&mut self, token: RequestToken, outcome: ApiResult<Vec<String>>) -> bool {
        if !self.suggest_requests.is_latest(token) {
            debug!(?token, "discarding stale suggestions");
            return false;
        }
        self.suggestions = match outcome {
            Ok(labels) => labels,
            Err(e) => {
                debug!(error = %e, "suggestion lookup failed");
                Vec::new()
            }
        };
        true
    }

    pub async fn suggest<A: SymptomApi + ?Sized>(&mut self, api: &A, partial: &str) -> &[String] {
        if let Some(token) = self.begin_suggest(partial) {
            let outcome = api.suggest_symptoms(partial).await;
            self.finish_suggest(token, outcome);
        }
        &self.suggestions
    }

    /// Validate the form and move to `Loading`, dropping any previous result.
    pub fn begin_analyze(&mut self) -> Result<(RequestToken, PredictionRequest), Notice> {
        if self.symptoms.is_empty() && self.free_text.trim().is_empty() {
            return Err(Notice::MissingSymptoms);
        }

        let request = PredictionRequest {
            symptoms: self.symptoms.clone(),
            text: self.free_text.clone(),
            days: PredictionRequest::days_from(&self.days_input),
            age: self.age(),
        };
        self.state = PanelState::Loading;
        Ok((self.analyze_requests.issue(), request))
    }

    /// Apply a prediction outcome. Returns false if a newer analysis superseded it.
    pub fn finish_analyze(&mut self, token: RequestToken, outcome: ApiResult<PredictionResult>) -> bool {
        if !self.analyze_requests.is_latest(token) {
            debug!(?token, "discarding stale prediction");
            return false;
        }
        self.state = match outcome {
            Ok(result) => {
                info!(
                    condition = %result.condition,
                    matches = result.diseases.len(),
                    "prediction received"
                );
                PanelState::ResultReady(result)
            }
            Err(e) => {
                warn!(error = %e, "prediction failed");
                PanelState::ErrorShown(Notice::from(&e))
            }
        };
        true
    }

    pub async fn analyze<A: SymptomApi + ?Sized>(&mut self, api: &A) -> Result<&PanelState, Notice> {
        let (token, request) = self.begin_analyze()?;
        let outcome = api.predict(&request).await;
        self.finish_analyze(token, outcome);
        Ok(&self.state)
    }

    pub async fn refresh_history<A: SymptomApi + ?Sized>(&mut self, api: &A) -> Result<&[HistoryEntry], IntakeError> {
        self.history = api.history(self.session.user.id).await?;
        Ok(&self.history)
    }

    /// Store the top match with the session's metadata, then reload the history
    /// list. The save acknowledgement is not inspected.
    pub async fn save_to_history<A: SymptomApi + ?Sized>(&mut self, api: &A) -> Result<Notice, IntakeError> {
        let result = self.result().ok_or(IntakeError::NoResult)?;
        let top = result.top().cloned().ok_or(IntakeError::NoResult)?;

        let request = SaveHistoryRequest {
            user_id: self.session.user.id,
            age: self.age(),
            symptoms: self.symptoms.clone(),
            condition: result.condition,
            doctor: result.doctor.clone(),
            top,
        };
        api.save_history(&request).await?;
        info!(user_id = request.user_id, disease = %request.top.disease, "saved to history");

        if let Err(e) = self.refresh_history(api).await {
            warn!(error = %e, "history refresh after save failed");
        }
        Ok(Notice::SavedToHistory)
    }

    /// Have the service render a report, then fetch it into `dir`.
    pub async fn download_report<A: SymptomApi + ?Sized>(&self, api: &A, dir: &Path) -> Result<PathBuf, IntakeError> {
        let result = self.result().ok_or(IntakeError::NoResult)?;

        let request = ReportRequest {
            name: self.session.user.name.clone(),
            age: self.age(),
            symptoms: self.symptoms.clone(),
            condition: result.condition,
            doctor: result.doctor.clone(),
            diseases: result.diseases.clone(),
        };
        let file = api.generate_report(&request).await?;
        let name = file
            .file_name()
            .ok_or_else(|| IntakeError::BadReportReference(file.file.clone()))?
            .to_string();
        let bytes = api.download(&file).await?;

        let path = dir.join(name);
        let io = |source: std::io::Error| IntakeError::Io { path: path.clone(), source };
        tokio::fs::create_dir_all(dir).await.map_err(io)?;
        tokio::fs::write(&path, bytes).await.map_err(io)?;
        info!(path = %path.display(), "report downloaded");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{prediction, unreachable, MockApi};
    use crate::api::{Condition, DiseaseMatch, User};

    fn panel() -> IntakePanel {
        IntakePanel::new(Session::new(User {
            id: 7,
            name: "Ada Lovelace".into(),
            email: "ada@example.com".into(),
        }))
    }

    #[test]
    fn duplicate_symptom_is_ignored() {
        let mut panel = panel();
        assert!(panel.add_symptom("fever"));
        assert!(!panel.add_symptom("fever"));
        assert_eq!(panel.symptoms(), ["fever"]);
    }

    #[test]
    fn blank_symptom_is_ignored() {
        let mut panel = panel();
        assert!(!panel.add_symptom(""));
        assert!(!panel.add_symptom("   "));
        assert!(panel.symptoms().is_empty());
    }

    #[test]
    fn adding_clears_typed_text() {
        let mut panel = panel();
        panel.begin_suggest("cough");
        assert_eq!(panel.symptom_input(), "cough");
        assert!(panel.add_symptom("cough"));
        assert_eq!(panel.symptom_input(), "");
        assert_eq!(panel.symptoms(), ["cough"]);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut panel = panel();
        panel.add_symptom("fever");
        panel.add_symptom("cough");

        panel.remove_symptom("fever");
        let once = panel.symptoms().to_vec();
        panel.remove_symptom("fever");
        assert_eq!(panel.symptoms(), once.as_slice());
        assert_eq!(once, ["cough"]);
    }

    #[test]
    fn accepted_suggestion_respects_duplicates() {
        let mut panel = panel();
        panel.add_symptom("high_fever");
        assert!(!panel.accept_suggestion("high_fever"));
        assert!(panel.accept_suggestion("mild_fever"));
        assert_eq!(panel.symptoms(), ["high_fever", "mild_fever"]);
        assert!(panel.suggestions().is_empty());
    }

    #[tokio::test]
    async fn short_input_clears_without_lookup() {
        let api = MockApi::new();
        api.set_suggestions("fe", &["fever"]);
        let mut panel = panel();

        assert_eq!(panel.suggest(&api, "fe").await, ["fever"]);
        assert!(panel.suggest(&api, "f").await.is_empty());
        assert_eq!(api.call_count("suggest"), 1);
    }

    #[tokio::test]
    async fn failed_lookup_empties_suggestions() {
        let api = MockApi::new();
        api.set_suggestions("fe", &["fever"]);
        let mut panel = panel();

        panel.suggest(&api, "fe").await;
        assert!(panel.suggest(&api, "zz").await.is_empty());
    }

    #[test]
    fn stale_suggestions_are_discarded() {
        let mut panel = panel();
        let older = panel.begin_suggest("fe").unwrap();
        let newer = panel.begin_suggest("fev").unwrap();

        assert!(panel.finish_suggest(newer, Ok(vec!["fever".into()])));
        assert!(!panel.finish_suggest(older, Ok(vec!["feet_swelling".into()])));
        assert_eq!(panel.suggestions(), ["fever"]);
    }

    #[test]
    fn lookup_outstanding_when_input_shrinks_is_dropped() {
        let mut panel = panel();
        let token = panel.begin_suggest("fe").unwrap();
        assert_eq!(panel.begin_suggest("f"), None);

        assert!(!panel.finish_suggest(token, Ok(vec!["fever".into()])));
        assert!(panel.suggestions().is_empty());
    }

    #[tokio::test]
    async fn analyze_without_input_never_calls_service() {
        let api = MockApi::new();
        let mut panel = panel();
        panel.set_free_text("   ");

        let notice = panel.analyze(&api).await.unwrap_err();
        assert_eq!(notice, Notice::MissingSymptoms);
        assert_eq!(api.call_count("predict"), 0);
        assert_eq!(panel.state(), &PanelState::Idle);
    }

    #[tokio::test]
    async fn analyze_stores_result() {
        let api = MockApi::new();
        api.push_prediction(Ok(prediction("Flu", 87.0)));
        let mut panel = panel();
        panel.add_symptom("fever");

        panel.analyze(&api).await.unwrap();

        let result = panel.result().unwrap();
        assert_eq!(result.condition, Condition::Mild);
        assert_eq!(result.diseases[0].disease, "Flu");
        assert!(!panel.is_loading());
    }

    #[tokio::test]
    async fn request_carries_defaults() {
        let api = MockApi::new();
        api.push_prediction(Ok(prediction("Flu", 87.0)));
        let mut panel = panel();
        panel.set_free_text("I have a headache");
        panel.set_days("");
        panel.set_age("abc");

        panel.analyze(&api).await.unwrap();

        let sent = api.predict_requests();
        assert_eq!(
            sent,
            vec![PredictionRequest {
                symptoms: vec![],
                text: "I have a headache".into(),
                days: 1,
                age: 0,
            }]
        );
    }

    #[tokio::test]
    async fn service_error_is_shown_verbatim() {
        let api = MockApi::new();
        api.push_prediction(Err(ApiError::Service("No valid symptoms found".into())));
        let mut panel = panel();
        panel.add_symptom("xyz");

        let state = panel.analyze(&api).await.unwrap();
        assert_eq!(state, &PanelState::ErrorShown(Notice::Service("No valid symptoms found".into())));
        assert!(panel.result().is_none());
    }

    #[tokio::test]
    async fn unreachable_service_gives_generic_notice() {
        let api = MockApi::new();
        api.push_prediction(Err(unreachable()));
        let mut panel = panel();
        panel.add_symptom("fever");

        let state = panel.analyze(&api).await.unwrap();
        assert_eq!(state, &PanelState::ErrorShown(Notice::Unreachable));
    }

    #[test]
    fn new_analysis_clears_previous_result() {
        let mut panel = panel();
        panel.add_symptom("fever");
        let (first, _) = panel.begin_analyze().unwrap();
        panel.finish_analyze(first, Ok(prediction("Flu", 87.0)));
        assert!(panel.result().is_some());

        panel.begin_analyze().unwrap();
        assert!(panel.is_loading());
        assert!(panel.result().is_none());
    }

    #[test]
    fn overlapping_analyses_keep_latest() {
        let mut panel = panel();
        panel.add_symptom("fever");
        let (older, _) = panel.begin_analyze().unwrap();
        let (newer, _) = panel.begin_analyze().unwrap();

        assert!(panel.finish_analyze(newer, Ok(prediction("Flu", 87.0))));
        assert!(!panel.finish_analyze(older, Ok(prediction("Malaria", 40.0))));
        assert_eq!(panel.result().unwrap().diseases[0].disease, "Flu");
    }

    #[tokio::test]
    async fn save_requires_result() {
        let api = MockApi::new();
        let mut panel = panel();

        assert!(matches!(panel.save_to_history(&api).await, Err(IntakeError::NoResult)));
        assert_eq!(api.call_count("save_history"), 0);
    }

    #[tokio::test]
    async fn save_sends_top_match_and_reloads_history() {
        let api = MockApi::new();
        let mut result = prediction("Flu", 87.0);
        result.diseases.push(DiseaseMatch {
            disease: "Cold".into(),
            confidence: 10.0,
            description: String::new(),
            precautions: vec![],
        });
        api.push_prediction(Ok(result));

        let mut panel = panel();
        panel.add_symptom("fever");
        panel.set_age("34");
        panel.analyze(&api).await.unwrap();

        let notice = panel.save_to_history(&api).await.unwrap();
        assert_eq!(notice, Notice::SavedToHistory);

        let saved = api.saved();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].user_id, 7);
        assert_eq!(saved[0].age, 34);
        assert_eq!(saved[0].top.disease, "Flu");
        assert_eq!(panel.history().len(), 1);
        assert_eq!(panel.history()[0].disease, "Flu");
    }

    #[tokio::test]
    async fn report_is_written_under_report_dir() {
        let api = MockApi::new();
        api.push_prediction(Ok(prediction("Flu", 87.0)));
        let mut panel = panel();
        panel.add_symptom("fever");
        panel.analyze(&api).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = panel.download_report(&api, dir.path()).await.unwrap();

        assert_eq!(path, dir.path().join("report_Ada_Lovelace.pdf"));
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4 mock");
    }
}
