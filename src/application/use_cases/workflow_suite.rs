//! End-to-end checks of a running TechnicIA API.
//!
//! Each scenario drives the real endpoints through a `TechniciaApi` and turns
//! the replies into a pass/fail verdict with human-readable details. The suite
//! runs the scenarios in order and pauses between them so a slow backend can
//! settle (indexing after an upload, for instance).

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::chat::QuestionRequest;
use crate::domain::diagnosis::{StartDiagnosisRequest, StepAnswer, StepOutcome};
use crate::domain::error::{AppError, Result};
use crate::infrastructure::api_client::TechniciaApi;
use crate::infrastructure::response::preview;
use crate::infrastructure::storage::inspect_pdf;

pub const SUITE_USER_ID: &str = "test-user";
pub const DEFAULT_SAMPLE_PDF: &str = "test_data/sample.pdf";
pub const MIN_ANSWER_CHARS: usize = 50;

pub const TEST_QUESTIONS: [&str; 3] = [
    "Comment fonctionne le système hydraulique principal ?",
    "Quel est le processus de diagnostic d'une pompe défectueuse ?",
    "Où se trouve le schéma du circuit électrique principal ?",
];

pub const TEST_EQUIPMENT_ID: &str = "hydraulic-system";
pub const TEST_SYMPTOMS: &str = "Pression hydraulique trop faible et bruit anormal près de la pompe principale. La pression chute progressivement pendant l'utilisation.";

pub const TEST_STEP_RESPONSES: [&str; 5] = [
    "La pression mesurée est de 120 bar, alors qu'elle devrait être entre 150-200 bar selon les spécifications.",
    "Le niveau d'huile est correct mais l'huile semble plus foncée que d'habitude et contient des particules en suspension.",
    "Oui, la pompe émet un bruit de grincement inhabituel et sa température est plus élevée que la normale.",
    "Les filtres sont partiellement colmatés, avec des débris métalliques visibles.",
    "Les soupapes se déclenchent à 140 bar au lieu de 180 bar indiqué dans les spécifications.",
];
pub const GENERIC_STEP_RESPONSE: &str = "Test de réponse générique";

/// Response submitted for step `step_number` (1-based).
pub fn step_response(step_number: u32) -> &'static str {
    step_number
        .checked_sub(1)
        .and_then(|index| TEST_STEP_RESPONSES.get(index as usize))
        .copied()
        .unwrap_or(GENERIC_STEP_RESPONSE)
}

pub fn step_notes(step_number: u32) -> String {
    format!("Note de test pour l'étape {}", step_number)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    Upload,
    Chat,
    Diagnosis,
}

impl Scenario {
    pub const ALL: [Scenario; 3] = [Scenario::Upload, Scenario::Chat, Scenario::Diagnosis];

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::Upload => "upload",
            Scenario::Chat => "chat",
            Scenario::Diagnosis => "diagnosis",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "upload" => Ok(Scenario::Upload),
            "chat" => Ok(Scenario::Chat),
            "diagnosis" | "diagnostic" => Ok(Scenario::Diagnosis),
            other => Err(AppError::ValidationError(format!(
                "Unknown scenario '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioResult {
    pub scenario: Scenario,
    pub passed: bool,
    pub duration: Duration,
    pub details: Vec<String>,
    pub warnings: Vec<String>,
    pub failure: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuiteReport {
    pub results: Vec<ScenarioResult>,
}

impl SuiteReport {
    pub fn all_passed(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(|result| result.passed)
    }

    pub fn summary(&self) -> String {
        let mut lines = vec!["Résumé des tests".to_string()];
        for result in &self.results {
            let verdict = if result.passed { "OK" } else { "ÉCHEC" };
            lines.push(format!(
                "  {:<10} {:<6} ({:.1}s)",
                result.scenario.name(),
                verdict,
                result.duration.as_secs_f64()
            ));
            if let Some(failure) = &result.failure {
                lines.push(format!("    {}", failure));
            }
        }
        let passed = self.results.iter().filter(|result| result.passed).count();
        lines.push(format!("{}/{} scénarios réussis", passed, self.results.len()));
        lines.join("\n")
    }
}

/// Collects the outcome of one scenario while it runs.
struct Recorder {
    details: Vec<String>,
    warnings: Vec<String>,
}

impl Recorder {
    fn new() -> Self {
        Self {
            details: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn detail(&mut self, line: String) {
        info!("{}", line);
        self.details.push(line);
    }

    fn warning(&mut self, line: String) {
        warn!("{}", line);
        self.warnings.push(line);
    }
}

pub struct WorkflowSuite {
    api: Arc<dyn TechniciaApi>,
    user_id: String,
    sample_pdf: PathBuf,
    pause: Duration,
}

impl WorkflowSuite {
    pub fn new(api: Arc<dyn TechniciaApi>) -> Self {
        Self {
            api,
            user_id: SUITE_USER_ID.to_string(),
            sample_pdf: PathBuf::from(DEFAULT_SAMPLE_PDF),
            pause: Duration::from_secs(5),
        }
    }

    pub fn with_sample_pdf(mut self, path: impl Into<PathBuf>) -> Self {
        self.sample_pdf = path.into();
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub async fn run_all(&self) -> SuiteReport {
        self.run(&Scenario::ALL).await
    }

    pub async fn run(&self, scenarios: &[Scenario]) -> SuiteReport {
        let mut report = SuiteReport::default();
        for (index, scenario) in scenarios.iter().enumerate() {
            if index > 0 && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
            report.results.push(self.run_scenario(*scenario).await);
        }
        info!(passed = report.all_passed(), "Workflow suite finished");
        report
    }

    pub async fn run_scenario(&self, scenario: Scenario) -> ScenarioResult {
        info!(scenario = %scenario, "Running scenario");
        let started = Instant::now();
        let mut recorder = Recorder::new();
        let outcome = match scenario {
            Scenario::Upload => self.check_upload(&mut recorder).await,
            Scenario::Chat => self.check_chat(&mut recorder).await,
            Scenario::Diagnosis => self.check_diagnosis(&mut recorder).await,
        };
        if let Err(e) = &outcome {
            error!(scenario = %scenario, error = %e, "Scenario failed");
        }
        ScenarioResult {
            scenario,
            passed: outcome.is_ok(),
            duration: started.elapsed(),
            details: recorder.details,
            warnings: recorder.warnings,
            failure: outcome.err().map(|e| e.to_string()),
        }
    }

    async fn check_upload(&self, recorder: &mut Recorder) -> Result<()> {
        let file = inspect_pdf(&self.sample_pdf).map_err(|rejection| {
            AppError::ValidationError(format!(
                "Sample PDF {} is not usable: {:?}",
                self.sample_pdf.display(),
                rejection
            ))
        })?;

        let outcome = self.api.upload_document(&file).await?;
        recorder.detail(format!(
            "Document « {} » traité : {} fragments de texte, {} images",
            outcome.document_name, outcome.text_chunks_count, outcome.images_count
        ));

        if !outcome.success {
            recorder.warning("La réponse ne signale pas success=true".to_string());
        }
        if outcome.document_name.is_empty() {
            recorder.warning("La réponse ne contient pas document_name".to_string());
        }
        if outcome.text_chunks_count == 0 {
            return Err(AppError::ParseError(
                "Upload reported no text chunks".to_string(),
            ));
        }
        Ok(())
    }

    async fn check_chat(&self, recorder: &mut Recorder) -> Result<()> {
        let mut failures = Vec::new();
        let mut with_images = 0;
        for question in TEST_QUESTIONS {
            let request = QuestionRequest {
                question: question.to_string(),
                user_id: self.user_id.clone(),
                session_id: format!("session-{}", Uuid::new_v4()),
            };
            let started = Instant::now();
            let response = match self.api.ask_question(&request).await {
                Ok(response) => response,
                Err(e) => {
                    recorder.detail(format!(
                        "« {} » -> échec en {:.1}s : {}",
                        question,
                        started.elapsed().as_secs_f64(),
                        e
                    ));
                    failures.push(format!("'{}': {}", question, e));
                    continue;
                }
            };
            let answer_chars = response.answer.chars().count();
            if !response.images.is_empty() {
                with_images += 1;
            }

            recorder.detail(format!(
                "« {} » -> {} caractères en {:.1}s, images : {}",
                question,
                answer_chars,
                started.elapsed().as_secs_f64(),
                if response.images.is_empty() { "non" } else { "oui" }
            ));
            if answer_chars <= MIN_ANSWER_CHARS {
                failures.push(format!(
                    "answer too short for '{}': {}",
                    question,
                    preview(&response.answer, 80)
                ));
            }
        }

        recorder.detail(format!(
            "{}/{} questions réussies, {} avec images",
            TEST_QUESTIONS.len() - failures.len(),
            TEST_QUESTIONS.len(),
            with_images
        ));
        if failures.is_empty() {
            Ok(())
        } else {
            Err(AppError::ParseError(format!(
                "{} of {} questions failed: {}",
                failures.len(),
                TEST_QUESTIONS.len(),
                failures.join("; ")
            )))
        }
    }

    async fn check_diagnosis(&self, recorder: &mut Recorder) -> Result<()> {
        let request = StartDiagnosisRequest::new(TEST_EQUIPMENT_ID, TEST_SYMPTOMS, &self.user_id);
        let started = self.api.start_diagnosis(&request).await?;
        let total_steps = started.progress.total_steps;
        recorder.detail(format!(
            "Diagnostic {} démarré : {} étapes",
            started.diagnosis_id, total_steps
        ));

        let mut progress = started.progress;
        let mut prompt = started.current_step_data;
        loop {
            if !progress.is_within_bounds() {
                return Err(AppError::ParseError(format!(
                    "Step {} is outside 1..={}",
                    progress.current_step, progress.total_steps
                )));
            }

            let step_number = prompt.step_number;
            let answer = StepAnswer {
                diagnosis_id: started.diagnosis_id.clone(),
                step_number,
                response: step_response(step_number).to_string(),
                notes: step_notes(step_number),
            };
            match self.api.submit_diagnosis_step(&answer).await? {
                StepOutcome::Completed { report } => {
                    if report.content.trim().is_empty() {
                        return Err(AppError::ParseError(
                            "Diagnosis completed with an empty report".to_string(),
                        ));
                    }
                    recorder.detail(format!(
                        "Diagnostic terminé à l'étape {} (durée : {}) : {}",
                        step_number,
                        report.diagnosis_duration,
                        preview(&report.content, 120)
                    ));
                    return Ok(());
                }
                StepOutcome::NextStep {
                    progress: next_progress,
                    current_step_data,
                } => {
                    recorder.detail(format!(
                        "Étape {}/{} : {}",
                        next_progress.current_step,
                        next_progress.total_steps,
                        current_step_data.title
                    ));
                    if !next_progress.follows(&progress) {
                        return Err(AppError::ParseError(format!(
                            "Expected the step after {}, got {}",
                            progress.current_step, next_progress.current_step
                        )));
                    }
                    progress = next_progress;
                    prompt = current_step_data;
                }
            }
        }
    }
}
