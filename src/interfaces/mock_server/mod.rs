//! Stand-in TechnicIA API.
//!
//! Serves the four client endpoints with deterministic canned behavior so the
//! client, the controllers and the workflow suite can run without the real
//! backend. Diagnoses are kept in memory and walk through a fixed number of
//! steps before returning a report.

use actix_cors::Cors;
use actix_web::dev::ServerHandle;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::chat::{QuestionRequest, QuestionResponse, QUESTION_ENDPOINT};
use crate::domain::diagnosis::{
    DiagnosisDuration, DiagnosisReport, Progress, StartDiagnosisRequest, StartDiagnosisResponse,
    StepAnswer, StepOutcome, StepPrompt, DIAGNOSIS_STEP_ENDPOINT, START_DIAGNOSIS_ENDPOINT,
};
use crate::domain::document::{UploadOutcome, MAX_UPLOAD_BYTES, UPLOAD_ENDPOINT};
use crate::domain::error::{AppError, Result};

static FILENAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"filename="([^"]+)""#).unwrap());

static IMAGE_OBJECT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/Subtype\s*/Image").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockServerConfig {
    pub port: u16,
    pub total_steps: u32,
    /// Bytes of uploaded payload per reported text chunk.
    pub chunk_bytes: usize,
    #[serde(default)]
    pub images: Vec<String>,
    /// Endpoints that answer 500 instead of their normal reply.
    #[serde(default)]
    pub failing_endpoints: Vec<String>,
    pub delay_ms: Option<u64>,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            port: 4010,
            total_steps: 5,
            chunk_bytes: 512,
            images: Vec::new(),
            failing_endpoints: Vec::new(),
            delay_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedRequest {
    pub path: String,
    pub status: u16,
}

#[derive(Debug, Clone)]
struct MockDiagnosis {
    equipment_type: String,
    initial_symptoms: String,
    current_step: u32,
    total_steps: u32,
    responses: Vec<String>,
    started_at: Instant,
}

#[derive(Clone)]
pub struct MockServerState {
    pub config: Arc<Mutex<MockServerConfig>>,
    pub server: Arc<Mutex<Option<ServerHandle>>>,
    diagnoses: Arc<Mutex<HashMap<String, MockDiagnosis>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockServerState {
    pub fn new(config: MockServerConfig) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
            server: Arc::new(Mutex::new(None)),
            diagnoses: Arc::new(Mutex::new(HashMap::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Requests served so far, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    pub fn set_failing_endpoints(&self, endpoints: &[&str]) {
        lock(&self.config).failing_endpoints = endpoints.iter().map(|e| e.to_string()).collect();
    }

    fn record(&self, path: &str, status: u16) {
        lock(&self.requests).push(RecordedRequest {
            path: path.to_string(),
            status,
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Starts the server and returns the bound address (port 0 picks a free one).
pub async fn start_mock_server(state: Arc<MockServerState>) -> Result<SocketAddr> {
    let port = { lock(&state.config).port };
    let mut server_guard = lock(&state.server);
    if server_guard.is_some() {
        return Err(AppError::ValidationError(
            "Mock server is already running.".to_string(),
        ));
    }

    let server_state = state.clone();
    let http_server = HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(web::Data::new(server_state.clone()))
            .app_data(web::PayloadConfig::new(MAX_UPLOAD_BYTES as usize))
            .route(UPLOAD_ENDPOINT, web::post().to(handle_upload))
            .route(QUESTION_ENDPOINT, web::post().to(handle_question))
            .route(START_DIAGNOSIS_ENDPOINT, web::post().to(handle_start_diagnosis))
            .route(DIAGNOSIS_STEP_ENDPOINT, web::post().to(handle_diagnosis_step))
            .default_service(web::route().to(handle_unknown))
    })
    .workers(1)
    .bind(("127.0.0.1", port))
    .map_err(|err| AppError::Internal(format!("Failed to bind mock server: {}", err)))?;

    let addr = http_server
        .addrs()
        .first()
        .copied()
        .ok_or_else(|| AppError::Internal("Mock server has no bound address".to_string()))?;
    let server = http_server.run();

    *server_guard = Some(server.handle());
    tokio::spawn(server);

    info!(addr = %addr, "Mock TechnicIA API started");
    Ok(addr)
}

pub async fn stop_mock_server(state: Arc<MockServerState>) -> Result<()> {
    let handle = { lock(&state.server).take() };
    if let Some(handle) = handle {
        let graceful = timeout(Duration::from_secs(2), handle.stop(true)).await;
        if graceful.is_err() {
            handle.stop(false).await;
            warn!("Mock server forced stop after timeout");
        } else {
            info!("Mock server stopped");
        }
    }
    Ok(())
}

/// Shared prologue of every handler: injected delay and injected failure.
async fn intercept(data: &MockServerState, path: &str) -> Option<HttpResponse> {
    let (delay_ms, failing) = {
        let config = lock(&data.config);
        (
            config.delay_ms,
            config.failing_endpoints.iter().any(|endpoint| endpoint == path),
        )
    };
    if let Some(delay_ms) = delay_ms.filter(|ms| *ms > 0) {
        sleep(Duration::from_millis(delay_ms)).await;
    }
    if failing {
        data.record(path, 500);
        return Some(HttpResponse::InternalServerError().json(serde_json::json!({
            "success": false,
            "message": "Service temporairement indisponible"
        })));
    }
    None
}

fn reject(data: &MockServerState, path: &str, status: u16, message: &str) -> HttpResponse {
    data.record(path, status);
    let code = actix_web::http::StatusCode::from_u16(status)
        .unwrap_or(actix_web::http::StatusCode::BAD_REQUEST);
    HttpResponse::build(code).json(serde_json::json!({
        "success": false,
        "message": message
    }))
}

async fn handle_upload(
    req: HttpRequest,
    body: web::Bytes,
    data: web::Data<Arc<MockServerState>>,
) -> HttpResponse {
    if let Some(response) = intercept(&data, UPLOAD_ENDPOINT).await {
        return response;
    }

    let is_multipart = req
        .headers()
        .get(actix_web::http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("multipart/form-data"))
        .unwrap_or(false);
    if !is_multipart {
        return reject(&data, UPLOAD_ENDPOINT, 400, "Requête multipart attendue");
    }

    let Some(pdf_start) = body.windows(5).position(|window| window == b"%PDF-") else {
        return reject(
            &data,
            UPLOAD_ENDPOINT,
            400,
            "Seuls les fichiers PDF sont acceptés",
        );
    };

    let payload = String::from_utf8_lossy(&body);
    let document_name = FILENAME_PATTERN
        .captures(&payload)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "document.pdf".to_string());
    let chunk_bytes = { lock(&data.config).chunk_bytes.max(1) };
    let pdf_len = body.len() - pdf_start;
    let outcome = UploadOutcome {
        success: true,
        document_name,
        text_chunks_count: (pdf_len / chunk_bytes).max(1) as u64,
        images_count: IMAGE_OBJECT_PATTERN.find_iter(&payload).count() as u64,
    };

    info!(
        document = %outcome.document_name,
        chunks = outcome.text_chunks_count,
        "Mock upload processed"
    );
    data.record(UPLOAD_ENDPOINT, 200);
    HttpResponse::Ok().json(outcome)
}

async fn handle_question(
    req: web::Json<QuestionRequest>,
    data: web::Data<Arc<MockServerState>>,
) -> HttpResponse {
    if let Some(response) = intercept(&data, QUESTION_ENDPOINT).await {
        return response;
    }
    let question = req.question.trim();
    if question.is_empty() {
        return reject(&data, QUESTION_ENDPOINT, 422, "La question est vide.");
    }

    let answer = format!(
        "D'après la documentation indexée, voici les éléments relatifs à « {} » : \
         vérifiez d'abord les points de contrôle décrits dans le manuel, puis \
         comparez les valeurs mesurées aux spécifications du constructeur.",
        question
    );
    let images = { lock(&data.config).images.clone() };
    data.record(QUESTION_ENDPOINT, 200);
    HttpResponse::Ok().json(QuestionResponse { answer, images })
}

fn mock_step_prompt(step_number: u32, equipment_type: &str) -> StepPrompt {
    StepPrompt {
        step_number,
        title: format!("Vérification {} ({})", step_number, equipment_type),
        description: format!("Point de contrôle n°{} du {}.", step_number, equipment_type),
        instructions: "Effectuez la mesure en suivant la procédure du manuel.".to_string(),
        expected_results: "Valeurs conformes aux spécifications.".to_string(),
        question: format!("Qu'observez-vous au point de contrôle n°{} ?", step_number),
    }
}

fn mock_progress(current_step: u32, total_steps: u32) -> Progress {
    Progress {
        current_step,
        total_steps,
        percent_complete: ((current_step - 1) as f64 / total_steps as f64 * 100.0).round(),
    }
}

async fn handle_start_diagnosis(
    req: web::Json<StartDiagnosisRequest>,
    data: web::Data<Arc<MockServerState>>,
) -> HttpResponse {
    if let Some(response) = intercept(&data, START_DIAGNOSIS_ENDPOINT).await {
        return response;
    }
    if req.equipment_id.trim().is_empty() || req.initial_symptoms.trim().is_empty() {
        return reject(
            &data,
            START_DIAGNOSIS_ENDPOINT,
            400,
            "Équipement et symptômes requis",
        );
    }

    let total_steps = { lock(&data.config).total_steps.max(1) };
    let diagnosis_id = Uuid::new_v4().to_string();
    let diagnosis = MockDiagnosis {
        equipment_type: req.equipment_type.clone(),
        initial_symptoms: req.initial_symptoms.clone(),
        current_step: 1,
        total_steps,
        responses: Vec::new(),
        started_at: Instant::now(),
    };
    let response = StartDiagnosisResponse {
        diagnosis_id: diagnosis_id.clone(),
        progress: mock_progress(1, total_steps),
        current_step_data: mock_step_prompt(1, &diagnosis.equipment_type),
    };
    lock(&data.diagnoses).insert(diagnosis_id.clone(), diagnosis);

    info!(diagnosis_id = %diagnosis_id, total_steps, "Mock diagnosis started");
    data.record(START_DIAGNOSIS_ENDPOINT, 200);
    HttpResponse::Ok().json(response)
}

async fn handle_diagnosis_step(
    req: web::Json<StepAnswer>,
    data: web::Data<Arc<MockServerState>>,
) -> HttpResponse {
    if let Some(response) = intercept(&data, DIAGNOSIS_STEP_ENDPOINT).await {
        return response;
    }
    if req.response.trim().is_empty() {
        return reject(&data, DIAGNOSIS_STEP_ENDPOINT, 400, "Réponse requise");
    }

    let outcome = {
        let mut diagnoses = lock(&data.diagnoses);
        let step = match diagnoses.get_mut(&req.diagnosis_id) {
            None => Err((404, "Diagnostic introuvable".to_string())),
            Some(diagnosis) if req.step_number != diagnosis.current_step => Err((
                409,
                format!(
                    "Étape {} attendue, étape {} reçue",
                    diagnosis.current_step, req.step_number
                ),
            )),
            Some(diagnosis) => {
                diagnosis.responses.push(req.response.clone());
                if diagnosis.current_step >= diagnosis.total_steps {
                    Ok((
                        StepOutcome::Completed {
                            report: build_report(diagnosis),
                        },
                        true,
                    ))
                } else {
                    diagnosis.current_step += 1;
                    Ok((
                        StepOutcome::NextStep {
                            progress: mock_progress(diagnosis.current_step, diagnosis.total_steps),
                            current_step_data: mock_step_prompt(
                                diagnosis.current_step,
                                &diagnosis.equipment_type,
                            ),
                        },
                        false,
                    ))
                }
            }
        };
        if let Ok((_, true)) = step {
            diagnoses.remove(&req.diagnosis_id);
        }
        step
    };

    let outcome = match outcome {
        Ok((outcome, _)) => outcome,
        Err((status, message)) => {
            return reject(&data, DIAGNOSIS_STEP_ENDPOINT, status, &message);
        }
    };

    data.record(DIAGNOSIS_STEP_ENDPOINT, 200);
    HttpResponse::Ok().json(outcome)
}

fn build_report(diagnosis: &MockDiagnosis) -> DiagnosisReport {
    let mut content = format!(
        "# Rapport de diagnostic\n\n## Équipement\n{}\n\n## Symptômes initiaux\n{}\n\n## Observations\n",
        diagnosis.equipment_type, diagnosis.initial_symptoms
    );
    for (index, response) in diagnosis.responses.iter().enumerate() {
        content.push_str(&format!("{}. {}\n", index + 1, response));
    }
    content.push_str("\n## Conclusion\nRemplacer les éléments signalés et contrôler la pression de service.\n");

    DiagnosisReport {
        content,
        diagnosis_duration: DiagnosisDuration::Text(format!(
            "{} secondes",
            diagnosis.started_at.elapsed().as_secs()
        )),
    }
}

async fn handle_unknown(req: HttpRequest, data: web::Data<Arc<MockServerState>>) -> HttpResponse {
    let path = req.path().to_string();
    data.record(&path, 404);
    HttpResponse::NotFound().json(serde_json::json!({
        "error": "No mock route matched.",
        "method": req.method().as_str(),
        "path": path
    }))
}
