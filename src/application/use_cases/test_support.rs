use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::chat::{QuestionRequest, QuestionResponse};
use crate::domain::diagnosis::{
    DiagnosisDuration, DiagnosisReport, DiagnosisSession, Progress, StartDiagnosisRequest,
    StartDiagnosisResponse, StepAnswer, StepOutcome, StepPrompt,
};
use crate::domain::document::{PdfFile, UploadOutcome};
use crate::domain::error::{AppError, Result};
use crate::infrastructure::api_client::TechniciaApi;

pub fn step_prompt(step_number: u32) -> StepPrompt {
    StepPrompt {
        step_number,
        title: format!("Contrôle {}", step_number),
        description: "Inspection".to_string(),
        instructions: "Mesurer".to_string(),
        expected_results: "Conforme".to_string(),
        question: format!("Résultat du contrôle {} ?", step_number),
    }
}

pub fn progress(current_step: u32, total_steps: u32) -> Progress {
    Progress {
        current_step,
        total_steps,
        percent_complete: (current_step - 1) as f64 * 100.0 / total_steps as f64,
    }
}

pub fn sample_session(total_steps: u32) -> DiagnosisSession {
    DiagnosisSession {
        diagnosis_id: "diag-1".to_string(),
        equipment_id: "hydraulic-system".to_string(),
        initial_symptoms: "Bruit anormal".to_string(),
        progress: progress(1, total_steps),
        current_step_data: step_prompt(1),
    }
}

/// In-memory `TechniciaApi` with a scripted diagnosis and call counters.
pub struct FakeApi {
    total_steps: u32,
    current_step: Mutex<u32>,
    fail_next: AtomicBool,
    pub questions: Mutex<Vec<QuestionRequest>>,
    pub uploads: Mutex<Vec<String>>,
    pub failing_files: Mutex<Vec<String>>,
    pub answer: Mutex<String>,
    start_calls: AtomicUsize,
    step_calls: AtomicUsize,
}

impl FakeApi {
    pub fn with_steps(total_steps: u32) -> Self {
        Self {
            total_steps,
            current_step: Mutex::new(0),
            fail_next: AtomicBool::new(false),
            questions: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            failing_files: Mutex::new(Vec::new()),
            answer: Mutex::new(
                "La pompe principale alimente le circuit à 180 bar via le distributeur.".to_string(),
            ),
            start_calls: AtomicUsize::new(0),
            step_calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_next_call(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn fail_file(&self, name: &str) {
        self.failing_files.lock().unwrap().push(name.to_string());
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn step_calls(&self) -> usize {
        self.step_calls.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(AppError::ApiError {
                status: 503,
                message: "Service indisponible".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TechniciaApi for FakeApi {
    async fn upload_document(&self, file: &PdfFile) -> Result<UploadOutcome> {
        self.uploads.lock().unwrap().push(file.name.clone());
        self.take_failure()?;
        if self.failing_files.lock().unwrap().contains(&file.name) {
            return Err(AppError::ApiError {
                status: 422,
                message: format!("{} est illisible", file.name),
            });
        }
        Ok(UploadOutcome {
            success: true,
            document_name: file.name.clone(),
            text_chunks_count: 12,
            images_count: 3,
        })
    }

    async fn ask_question(&self, request: &QuestionRequest) -> Result<QuestionResponse> {
        self.questions.lock().unwrap().push(request.clone());
        self.take_failure()?;
        Ok(QuestionResponse {
            answer: self.answer.lock().unwrap().clone(),
            images: vec!["/images/schema-1.png".to_string()],
        })
    }

    async fn start_diagnosis(
        &self,
        _request: &StartDiagnosisRequest,
    ) -> Result<StartDiagnosisResponse> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        self.take_failure()?;
        *self.current_step.lock().unwrap() = 1;
        Ok(StartDiagnosisResponse {
            diagnosis_id: "diag-1".to_string(),
            progress: progress(1, self.total_steps),
            current_step_data: step_prompt(1),
        })
    }

    async fn submit_diagnosis_step(&self, answer: &StepAnswer) -> Result<StepOutcome> {
        self.step_calls.fetch_add(1, Ordering::SeqCst);
        self.take_failure()?;
        let mut current = self.current_step.lock().unwrap();
        assert_eq!(answer.step_number, *current, "step submitted out of order");
        if *current >= self.total_steps {
            return Ok(StepOutcome::Completed {
                report: DiagnosisReport {
                    content: "# Rapport\nFiltres colmatés, pompe usée.".to_string(),
                    diagnosis_duration: DiagnosisDuration::Text("4 minutes".to_string()),
                },
            });
        }
        *current += 1;
        Ok(StepOutcome::NextStep {
            progress: progress(*current, self.total_steps),
            current_step_data: step_prompt(*current),
        })
    }
}
