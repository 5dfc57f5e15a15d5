//! Guided diagnosis page state.
//!
//! `reduce` is the whole state machine (`initial → in_progress → completed`,
//! plus restart); `DiagnosticController` only performs the network call a
//! submission event asks for and feeds the reply back as another event.

use std::sync::Arc;

use tracing::{error, info, warn};
use validator::Validate;

use crate::domain::diagnosis::{
    DiagnosisReport, DiagnosisSession, StartDiagnosisRequest, StepAnswer, StepOutcome,
};
use crate::domain::error::{AppError, Result};
use crate::infrastructure::api_client::TechniciaApi;

pub const START_FAILED_BANNER: &str =
    "Une erreur est survenue lors du démarrage du diagnostic. Veuillez réessayer.";
pub const STEP_FAILED_BANNER: &str =
    "Une erreur est survenue lors de la soumission de votre réponse. Veuillez réessayer.";
pub const INCONSISTENT_REPLY_BANNER: &str =
    "Le serveur a renvoyé une progression incohérente. Veuillez réessayer.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiagnosticPhase {
    #[default]
    Initial,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DiagnosticState {
    pub user_id: String,
    pub phase: DiagnosticPhase,
    pub equipment_id: String,
    pub symptoms: String,
    pub session: Option<DiagnosisSession>,
    pub step_response: String,
    pub step_notes: String,
    pub report: Option<DiagnosisReport>,
    pub is_loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticEvent {
    EquipmentSelected(String),
    SymptomsChanged(String),
    ResponseChanged(String),
    NotesChanged(String),
    StartSubmitted,
    StartSucceeded(DiagnosisSession),
    StartFailed(String),
    StepSubmitted,
    StepSucceeded(StepOutcome),
    StepFailed(String),
    ErrorDismissed,
    Restart,
}

impl DiagnosticState {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn start_request(&self) -> Result<StartDiagnosisRequest> {
        let request = StartDiagnosisRequest::new(&self.equipment_id, &self.symptoms, &self.user_id);
        request.validate()?;
        Ok(request)
    }

    pub fn step_answer(&self) -> Result<StepAnswer> {
        let session = self.session.as_ref().ok_or_else(|| {
            AppError::ValidationError("Aucun diagnostic en cours.".to_string())
        })?;
        let answer = StepAnswer {
            diagnosis_id: session.diagnosis_id.clone(),
            step_number: session.current_step_data.step_number,
            response: self.step_response.clone(),
            notes: self.step_notes.clone(),
        };
        answer.validate()?;
        Ok(answer)
    }
}

/// Applies one event. Events that make no sense in the current phase, or
/// that arrive while a request is outstanding, leave the state untouched.
pub fn reduce(state: DiagnosticState, event: DiagnosticEvent) -> DiagnosticState {
    use DiagnosticEvent::*;
    use DiagnosticPhase::*;

    match (state.phase, event) {
        (_, Restart) => DiagnosticState::new(state.user_id),
        (_, ErrorDismissed) => DiagnosticState {
            error: None,
            ..state
        },

        (Initial, EquipmentSelected(equipment_id)) if !state.is_loading => DiagnosticState {
            equipment_id,
            ..state
        },
        (Initial, SymptomsChanged(symptoms)) if !state.is_loading => DiagnosticState {
            symptoms,
            ..state
        },
        (Initial, StartSubmitted) if !state.is_loading => match state.start_request() {
            Ok(_) => DiagnosticState {
                is_loading: true,
                error: None,
                ..state
            },
            Err(err) => DiagnosticState {
                error: Some(err.user_message().to_string()),
                ..state
            },
        },
        (Initial, StartSucceeded(session))
            if state.is_loading && !session.progress.is_within_bounds() =>
        {
            DiagnosticState {
                is_loading: false,
                error: Some(INCONSISTENT_REPLY_BANNER.to_string()),
                ..state
            }
        }
        (Initial, StartSucceeded(session)) if state.is_loading => DiagnosticState {
            phase: InProgress,
            session: Some(session),
            step_response: String::new(),
            step_notes: String::new(),
            report: None,
            is_loading: false,
            error: None,
            ..state
        },
        (Initial, StartFailed(message)) if state.is_loading => DiagnosticState {
            is_loading: false,
            error: Some(message),
            ..state
        },

        (InProgress, ResponseChanged(step_response)) if !state.is_loading => DiagnosticState {
            step_response,
            ..state
        },
        (InProgress, NotesChanged(step_notes)) if !state.is_loading => DiagnosticState {
            step_notes,
            ..state
        },
        (InProgress, StepSubmitted) if !state.is_loading => match state.step_answer() {
            Ok(_) => DiagnosticState {
                is_loading: true,
                error: None,
                ..state
            },
            Err(err) => DiagnosticState {
                error: Some(err.user_message().to_string()),
                ..state
            },
        },
        (InProgress, StepSucceeded(outcome)) if state.is_loading => apply_step_outcome(state, outcome),
        (InProgress, StepFailed(message)) if state.is_loading => DiagnosticState {
            is_loading: false,
            error: Some(message),
            ..state
        },

        _ => state,
    }
}

fn apply_step_outcome(state: DiagnosticState, outcome: StepOutcome) -> DiagnosticState {
    match outcome {
        StepOutcome::Completed { report } => DiagnosticState {
            phase: DiagnosticPhase::Completed,
            report: Some(report),
            step_response: String::new(),
            step_notes: String::new(),
            is_loading: false,
            error: None,
            ..state
        },
        StepOutcome::NextStep {
            progress,
            current_step_data,
        } => {
            let Some(session) = state.session.clone() else {
                return DiagnosticState {
                    is_loading: false,
                    ..state
                };
            };
            if !progress.follows(&session.progress) {
                return DiagnosticState {
                    is_loading: false,
                    error: Some(INCONSISTENT_REPLY_BANNER.to_string()),
                    ..state
                };
            }
            DiagnosticState {
                session: Some(DiagnosisSession {
                    progress,
                    current_step_data,
                    ..session
                }),
                step_response: String::new(),
                step_notes: String::new(),
                is_loading: false,
                error: None,
                ..state
            }
        }
    }
}

pub struct DiagnosticController {
    api: Arc<dyn TechniciaApi>,
    state: DiagnosticState,
}

impl DiagnosticController {
    pub fn new(api: Arc<dyn TechniciaApi>, user_id: impl Into<String>) -> Self {
        Self {
            api,
            state: DiagnosticState::new(user_id),
        }
    }

    pub fn state(&self) -> &DiagnosticState {
        &self.state
    }

    pub fn dispatch(&mut self, event: DiagnosticEvent) {
        let state = std::mem::take(&mut self.state);
        self.state = reduce(state, event);
    }

    /// Error for a submission the reducer refused to turn into a request.
    fn refused(&self) -> AppError {
        AppError::ValidationError(self.state.error.clone().unwrap_or_else(|| {
            "Cette action n'est pas disponible pour le moment.".to_string()
        }))
    }

    pub async fn start(&mut self, equipment_id: &str, symptoms: &str) -> Result<()> {
        self.dispatch(DiagnosticEvent::EquipmentSelected(equipment_id.to_string()));
        self.dispatch(DiagnosticEvent::SymptomsChanged(symptoms.to_string()));
        self.submit_start().await
    }

    pub async fn submit_start(&mut self) -> Result<()> {
        self.dispatch(DiagnosticEvent::StartSubmitted);
        if !self.state.is_loading {
            return Err(self.refused());
        }
        let request = self.state.start_request()?;

        match self.api.start_diagnosis(&request).await {
            Ok(response) => {
                let session = match DiagnosisSession::from_start(&request, response) {
                    Ok(session) => session,
                    Err(e) => {
                        warn!(error = %e, equipment_id = %request.equipment_id, "Rejected diagnosis start reply");
                        self.dispatch(DiagnosticEvent::StartFailed(
                            INCONSISTENT_REPLY_BANNER.to_string(),
                        ));
                        return Err(e);
                    }
                };
                info!(
                    diagnosis_id = %session.diagnosis_id,
                    total_steps = session.progress.total_steps,
                    "Diagnosis started"
                );
                self.dispatch(DiagnosticEvent::StartSucceeded(session));
                Ok(())
            }
            Err(e) => {
                error!(error = %e, equipment_id = %request.equipment_id, "Failed to start diagnosis");
                self.dispatch(DiagnosticEvent::StartFailed(START_FAILED_BANNER.to_string()));
                Err(e)
            }
        }
    }

    pub async fn answer(&mut self, response: &str, notes: &str) -> Result<DiagnosticPhase> {
        self.dispatch(DiagnosticEvent::ResponseChanged(response.to_string()));
        self.dispatch(DiagnosticEvent::NotesChanged(notes.to_string()));
        self.submit_step().await
    }

    pub async fn submit_step(&mut self) -> Result<DiagnosticPhase> {
        self.dispatch(DiagnosticEvent::StepSubmitted);
        if !self.state.is_loading {
            return Err(self.refused());
        }
        let answer = self.state.step_answer()?;

        match self.api.submit_diagnosis_step(&answer).await {
            Ok(outcome) => {
                self.dispatch(DiagnosticEvent::StepSucceeded(outcome));
                if let Some(message) = self.state.error.clone() {
                    warn!(
                        diagnosis_id = %answer.diagnosis_id,
                        step_number = answer.step_number,
                        "Rejected out-of-sequence diagnosis step"
                    );
                    return Err(AppError::ParseError(message));
                }
                Ok(self.state.phase)
            }
            Err(e) => {
                error!(
                    error = %e,
                    diagnosis_id = %answer.diagnosis_id,
                    step_number = answer.step_number,
                    "Failed to submit diagnosis step"
                );
                self.dispatch(DiagnosticEvent::StepFailed(STEP_FAILED_BANNER.to_string()));
                Err(e)
            }
        }
    }

    pub fn restart(&mut self) {
        self.dispatch(DiagnosticEvent::Restart);
    }
}
