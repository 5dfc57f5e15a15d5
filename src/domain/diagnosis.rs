use crate::domain::error::AppError;
use crate::domain::validation::not_blank;
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

pub const START_DIAGNOSIS_ENDPOINT: &str = "/api/start-diagnosis";
pub const DIAGNOSIS_STEP_ENDPOINT: &str = "/api/diagnosis-step";

pub const COMPLETED_STATUS: &str = "completed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EquipmentOption {
    pub id: &'static str,
    pub name: &'static str,
}

pub const EQUIPMENT_OPTIONS: [EquipmentOption; 4] = [
    EquipmentOption {
        id: "hydraulic-system",
        name: "Système hydraulique",
    },
    EquipmentOption {
        id: "pneumatic-circuit",
        name: "Circuit pneumatique",
    },
    EquipmentOption {
        id: "electrical-system",
        name: "Système électrique",
    },
    EquipmentOption {
        id: "mechanical-drive",
        name: "Transmission mécanique",
    },
];

/// Display name sent as `equipmentType`; unknown ids are sent verbatim.
pub fn equipment_type_for(equipment_id: &str) -> String {
    EQUIPMENT_OPTIONS
        .iter()
        .find(|option| option.id == equipment_id)
        .map(|option| option.name.to_string())
        .unwrap_or_else(|| equipment_id.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub current_step: u32,
    pub total_steps: u32,
    pub percent_complete: f64,
}

impl Progress {
    /// `1 <= current_step <= total_steps`.
    pub fn is_within_bounds(&self) -> bool {
        self.current_step >= 1 && self.current_step <= self.total_steps
    }

    /// True when `self` is exactly one step after `previous` and still in bounds.
    pub fn follows(&self, previous: &Progress) -> bool {
        previous.current_step.checked_add(1) == Some(self.current_step) && self.is_within_bounds()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepPrompt {
    pub step_number: u32,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub expected_results: String,
    pub question: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DiagnosisDuration {
    Text(String),
    Seconds(f64),
}

impl Default for DiagnosisDuration {
    fn default() -> Self {
        DiagnosisDuration::Text(String::new())
    }
}

impl fmt::Display for DiagnosisDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosisDuration::Text(text) => write!(f, "{}", text),
            DiagnosisDuration::Seconds(secs) => write!(f, "{:.0}s", secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisReport {
    pub content: String,
    #[serde(default)]
    pub diagnosis_duration: DiagnosisDuration,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StartDiagnosisRequest {
    #[validate(custom(
        function = "not_blank",
        message = "Veuillez sélectionner un équipement et décrire les symptômes observés."
    ))]
    pub equipment_id: String,
    pub equipment_type: String,
    #[validate(custom(
        function = "not_blank",
        message = "Veuillez sélectionner un équipement et décrire les symptômes observés."
    ))]
    pub initial_symptoms: String,
    pub user_id: String,
}

impl StartDiagnosisRequest {
    pub fn new(equipment_id: &str, initial_symptoms: &str, user_id: &str) -> Self {
        Self {
            equipment_id: equipment_id.to_string(),
            equipment_type: equipment_type_for(equipment_id),
            initial_symptoms: initial_symptoms.to_string(),
            user_id: user_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartDiagnosisResponse {
    pub diagnosis_id: String,
    pub progress: Progress,
    pub current_step_data: StepPrompt,
}

/// One answer to the active step, built by the client and sent once.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StepAnswer {
    pub diagnosis_id: String,
    pub step_number: u32,
    #[validate(custom(
        function = "not_blank",
        message = "Veuillez fournir une réponse pour cette étape."
    ))]
    pub response: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosisSession {
    pub diagnosis_id: String,
    pub equipment_id: String,
    pub initial_symptoms: String,
    pub progress: Progress,
    pub current_step_data: StepPrompt,
}

impl DiagnosisSession {
    /// Fails with `ParseError` when the reply's progress is out of bounds.
    pub fn from_start(
        request: &StartDiagnosisRequest,
        response: StartDiagnosisResponse,
    ) -> Result<Self, AppError> {
        if !response.progress.is_within_bounds() {
            return Err(AppError::ParseError(format!(
                "Diagnosis started at step {} of {}",
                response.progress.current_step, response.progress.total_steps
            )));
        }
        Ok(Self {
            diagnosis_id: response.diagnosis_id,
            equipment_id: request.equipment_id.clone(),
            initial_symptoms: request.initial_symptoms.clone(),
            progress: response.progress,
            current_step_data: response.current_step_data,
        })
    }
}

/// Reply to `/api/diagnosis-step`: either the next prompt or the final report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStepReply", into = "RawStepReply")]
pub enum StepOutcome {
    NextStep {
        progress: Progress,
        current_step_data: StepPrompt,
    },
    Completed {
        report: DiagnosisReport,
    },
}

impl StepOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, StepOutcome::Completed { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStepReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    progress: Option<Progress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    current_step_data: Option<StepPrompt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    report: Option<DiagnosisReport>,
}

impl TryFrom<RawStepReply> for StepOutcome {
    type Error = AppError;

    fn try_from(raw: RawStepReply) -> Result<Self, Self::Error> {
        if raw.status.as_deref() == Some(COMPLETED_STATUS) {
            let report = raw.report.ok_or_else(|| {
                AppError::ParseError("Completed diagnosis reply has no report".to_string())
            })?;
            return Ok(StepOutcome::Completed { report });
        }

        match (raw.progress, raw.current_step_data) {
            (Some(progress), Some(current_step_data)) => Ok(StepOutcome::NextStep {
                progress,
                current_step_data,
            }),
            _ => Err(AppError::ParseError(
                "Diagnosis step reply has neither a next step nor a completed report".to_string(),
            )),
        }
    }
}

impl From<StepOutcome> for RawStepReply {
    fn from(outcome: StepOutcome) -> Self {
        match outcome {
            StepOutcome::NextStep {
                progress,
                current_step_data,
            } => RawStepReply {
                status: Some("in_progress".to_string()),
                progress: Some(progress),
                current_step_data: Some(current_step_data),
                report: None,
            },
            StepOutcome::Completed { report } => RawStepReply {
                status: Some(COMPLETED_STATUS.to_string()),
                progress: None,
                current_step_data: None,
                report: Some(report),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equipment_type_lookup() {
        assert_eq!(equipment_type_for("hydraulic-system"), "Système hydraulique");
        assert_eq!(equipment_type_for("turbine"), "turbine");
    }

    #[test]
    fn test_start_request_rejects_blank_symptoms() {
        let request = StartDiagnosisRequest::new("hydraulic-system", "   ", "user-123");
        let err: AppError = request.validate().unwrap_err().into();
        assert_eq!(
            err,
            AppError::ValidationError(
                "Veuillez sélectionner un équipement et décrire les symptômes observés."
                    .to_string()
            )
        );
    }

    #[test]
    fn test_start_request_serializes_camel_case() {
        let request = StartDiagnosisRequest::new("pneumatic-circuit", "Fuite d'air", "test-user");
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["equipmentId"], "pneumatic-circuit");
        assert_eq!(value["equipmentType"], "Circuit pneumatique");
        assert_eq!(value["initialSymptoms"], "Fuite d'air");
        assert_eq!(value["userId"], "test-user");
    }

    #[test]
    fn test_step_reply_parses_next_step() {
        let body = json!({
            "progress": {"currentStep": 2, "totalSteps": 5, "percentComplete": 40},
            "currentStepData": {
                "stepNumber": 2,
                "title": "Niveau d'huile",
                "question": "Quel est le niveau d'huile ?"
            }
        });
        let outcome: StepOutcome = serde_json::from_value(body).unwrap();
        match outcome {
            StepOutcome::NextStep {
                progress,
                current_step_data,
            } => {
                assert_eq!(progress.current_step, 2);
                assert_eq!(current_step_data.step_number, 2);
                assert!(current_step_data.instructions.is_empty());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_step_reply_parses_completed() {
        let body = json!({
            "status": "completed",
            "report": {"content": "# Rapport", "diagnosisDuration": "12 minutes"}
        });
        let outcome: StepOutcome = serde_json::from_value(body).unwrap();
        assert!(outcome.is_completed());
    }

    #[test]
    fn test_step_reply_completed_without_report_is_rejected() {
        let body = json!({"status": "completed"});
        assert!(serde_json::from_value::<StepOutcome>(body).is_err());
    }

    #[test]
    fn test_step_reply_without_step_data_is_rejected() {
        let body = json!({"progress": {"currentStep": 2, "totalSteps": 5, "percentComplete": 40}});
        assert!(serde_json::from_value::<StepOutcome>(body).is_err());
    }

    fn progress(current_step: u32, total_steps: u32) -> Progress {
        Progress {
            current_step,
            total_steps,
            percent_complete: 0.0,
        }
    }

    #[test]
    fn test_progress_bounds() {
        assert!(progress(1, 5).is_within_bounds());
        assert!(progress(5, 5).is_within_bounds());
        assert!(!progress(0, 5).is_within_bounds());
        assert!(!progress(6, 5).is_within_bounds());
    }

    #[test]
    fn test_progress_follows_without_overflow() {
        assert!(progress(3, 5).follows(&progress(2, 5)));
        assert!(!progress(4, 5).follows(&progress(2, 5)));
        assert!(!progress(6, 5).follows(&progress(5, 5)));
        assert!(!progress(0, u32::MAX).follows(&progress(u32::MAX, u32::MAX)));
    }

    #[test]
    fn test_from_start_rejects_out_of_bounds_progress() {
        let request = StartDiagnosisRequest::new("hydraulic-system", "Bruit", "user-123");
        let prompt: StepPrompt = serde_json::from_value(json!({
            "stepNumber": 0,
            "title": "Départ",
            "question": "?"
        }))
        .unwrap();
        for bad in [progress(0, 5), progress(6, 5)] {
            let response = StartDiagnosisResponse {
                diagnosis_id: "diag-1".to_string(),
                progress: bad,
                current_step_data: prompt.clone(),
            };
            let err = DiagnosisSession::from_start(&request, response).unwrap_err();
            assert!(matches!(err, AppError::ParseError(_)));
        }
    }

    #[test]
    fn test_numeric_duration_display() {
        let report: DiagnosisReport =
            serde_json::from_value(json!({"content": "ok", "diagnosisDuration": 95})).unwrap();
        assert_eq!(report.diagnosis_duration.to_string(), "95s");
    }
}
