use serde::{Deserialize, Serialize};

/// Account as returned by `/login`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Acknowledgement body for endpoints that only answer with a message
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub message: Option<String>,
}

/// Body of `POST /predict`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRequest {
    pub symptoms: Vec<String>,
    pub text: String,
    pub days: u32,
    pub age: u32,
}

impl PredictionRequest {
    /// Duration in days from form text: a leading integer of at least 1, else 1.
    pub fn days_from(input: &str) -> u32 {
        leading_int(input)
            .filter(|d| *d >= 1)
            .and_then(|d| u32::try_from(d).ok())
            .unwrap_or(1)
    }

    /// Age in years from form text: a leading non-negative integer, else 0.
    pub fn age_from(input: &str) -> u32 {
        leading_int(input)
            .filter(|a| *a >= 0)
            .and_then(|a| u32::try_from(a).ok())
            .unwrap_or(0)
    }
}

/// Parse an optionally signed run of digits at the start of `input`, ignoring
/// leading whitespace and anything after the digits ("3 days" is 3).
fn leading_int(input: &str) -> Option<i64> {
    let trimmed = input.trim_start();
    let (sign, rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse::<i64>().ok().map(|n| sign * n)
}

/// Recommended course of action reported by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    Consult,
    Mild,
}

impl Condition {
    pub fn headline(&self) -> &'static str {
        match self {
            Condition::Consult => "Consult a Doctor",
            Condition::Mild => "Mild - Take Precautions",
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Condition::Consult => write!(f, "consult"),
            Condition::Mild => write!(f, "mild"),
        }
    }
}

/// How the `confidence` numbers of a prediction are expressed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceScale {
    /// Guess from magnitude: anything above 1 is already a percentage
    #[default]
    Auto,
    /// Values are in 0..=100
    Percent,
    /// Values are in 0..=1
    Fraction,
}

impl ConfidenceScale {
    /// Convert a raw confidence to a percentage rounded to two decimals.
    pub fn to_percent(self, raw: f64) -> f64 {
        let percent = match self {
            ConfidenceScale::Percent => raw,
            ConfidenceScale::Fraction => raw * 100.0,
            ConfidenceScale::Auto if raw > 1.0 => raw,
            ConfidenceScale::Auto => raw * 100.0,
        };
        (percent * 100.0).round() / 100.0
    }

    pub fn format(self, raw: f64) -> String {
        format!("{:.2}%", self.to_percent(raw))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseaseMatch {
    #[serde(alias = "name")]
    pub disease: String,
    pub confidence: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub precautions: Vec<String>,
}

/// Body of a successful `POST /predict`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub condition: Condition,
    pub doctor: String,
    /// Best match first
    #[serde(default)]
    pub diseases: Vec<DiseaseMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_scale: Option<ConfidenceScale>,
}

impl PredictionResult {
    pub fn top(&self) -> Option<&DiseaseMatch> {
        self.diseases.first()
    }

    /// A scale declared by the service wins over the locally configured one.
    pub fn scale_or(&self, configured: ConfidenceScale) -> ConfidenceScale {
        self.confidence_scale.unwrap_or(configured)
    }
}

/// Body of `POST /save-history`
#[derive(Debug, Clone, Serialize)]
pub struct SaveHistoryRequest {
    pub user_id: i64,
    pub age: u32,
    pub symptoms: Vec<String>,
    pub condition: Condition,
    pub doctor: String,
    pub top: DiseaseMatch,
}

/// A past diagnosis as stored by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub date: String,
    pub symptoms: String,
    pub disease: String,
    pub confidence: f64,
    pub condition: String,
    pub doctor: String,
}

/// Body of `POST /generate-report`
#[derive(Debug, Clone, Serialize)]
pub struct ReportRequest {
    pub name: String,
    pub age: u32,
    pub symptoms: Vec<String>,
    pub condition: Condition,
    pub doctor: String,
    pub diseases: Vec<DiseaseMatch>,
}

/// Server-relative reference to a generated report, e.g. `/download/report_Ada.pdf`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReportFile {
    pub file: String,
}

impl ReportFile {
    /// Final path segment of the reference, used as the local file name.
    pub fn file_name(&self) -> Option<&str> {
        self.file
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty() && *name != "." && *name != "..")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prediction_accepts_service_body() {
        let body = r#"{
            "condition": "consult",
            "risk_note": "Normal age-related risk.",
            "doctor": "General Physician",
            "diseases": [
                {"disease": "Malaria", "confidence": 64.5, "description": "Mosquito borne", "precautions": ["Consult nearest hospital"]},
                {"name": "Dengue", "confidence": 12.0}
            ]
        }"#;
        let result: PredictionResult = serde_json::from_str(body).unwrap();

        assert_eq!(result.condition, Condition::Consult);
        assert_eq!(result.top().map(|d| d.disease.as_str()), Some("Malaria"));
        assert_eq!(result.diseases[1].disease, "Dengue");
        assert!(result.diseases[1].precautions.is_empty());
        assert_eq!(result.risk_note.as_deref(), Some("Normal age-related risk."));
        assert_eq!(result.confidence_scale, None);
    }

    #[test]
    fn form_numbers_fall_back_to_defaults() {
        assert_eq!(PredictionRequest::days_from("3"), 3);
        assert_eq!(PredictionRequest::days_from(" 4 days"), 4);
        assert_eq!(PredictionRequest::days_from("a week"), 1);
        assert_eq!(PredictionRequest::days_from("0"), 1);
        assert_eq!(PredictionRequest::days_from("-2"), 1);
        assert_eq!(PredictionRequest::days_from(""), 1);

        assert_eq!(PredictionRequest::age_from("42"), 42);
        assert_eq!(PredictionRequest::age_from(""), 0);
        assert_eq!(PredictionRequest::age_from("-5"), 0);
    }

    #[test]
    fn auto_scale_uses_magnitude() {
        assert_eq!(ConfidenceScale::Auto.format(0.873), "87.30%");
        assert_eq!(ConfidenceScale::Auto.format(87.0), "87.00%");
        assert_eq!(ConfidenceScale::Auto.format(1.0), "100.00%");
    }

    #[test]
    fn declared_scale_is_not_guessed() {
        assert_eq!(ConfidenceScale::Percent.format(0.5), "0.50%");
        assert_eq!(ConfidenceScale::Fraction.format(0.5), "50.00%");

        let result = PredictionResult {
            condition: Condition::Mild,
            doctor: "Home Care".into(),
            diseases: vec![],
            risk_note: None,
            confidence_scale: Some(ConfidenceScale::Percent),
        };
        assert_eq!(result.scale_or(ConfidenceScale::Fraction), ConfidenceScale::Percent);
    }

    #[test]
    fn report_file_name_is_last_segment() {
        let file = ReportFile { file: "/download/report_Ada_L.pdf".into() };
        assert_eq!(file.file_name(), Some("report_Ada_L.pdf"));

        let dir = ReportFile { file: "/download/".into() };
        assert_eq!(dir.file_name(), None);
    }
}
