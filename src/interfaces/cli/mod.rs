use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::info;

use crate::application::use_cases::diagnostic_flow::{
    DiagnosticController, DiagnosticEvent, DiagnosticPhase,
};
use crate::application::use_cases::upload_queue::UploadQueue;
use crate::application::use_cases::workflow_suite::{Scenario, WorkflowSuite, DEFAULT_SAMPLE_PDF};
use crate::application::ChatController;
use crate::domain::api_config::ApiConfig;
use crate::domain::diagnosis::DiagnosisReport;
use crate::domain::document::UploadStatus;
use crate::domain::error::{AppError, Result};
use crate::infrastructure::api_client::{HttpApiClient, TechniciaApi};
use crate::infrastructure::config::DEFAULT_CONFIG_FILE;
use crate::infrastructure::storage::save_report;
use crate::interfaces::mock_server::{
    start_mock_server, stop_mock_server, MockServerConfig, MockServerState,
};
use crate::interfaces::shell::{render_message, render_report, render_step, render_task, Shell};

#[derive(Parser, Debug)]
#[command(name = "technicia")]
#[command(about = "Technical documentation assistant: upload manuals, ask questions, run guided diagnoses")]
#[command(version)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// API base URL, overrides API_URL and the configuration file
    #[arg(long)]
    pub api_url: Option<String>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload PDF manuals for indexing
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Ask one question about the indexed documentation
    Ask { question: String },

    /// Run a guided diagnosis, answering each step on stdin
    Diagnose {
        /// Equipment id (hydraulic-system, pneumatic-circuit, ...)
        #[arg(short, long)]
        equipment: String,

        /// Observed symptoms
        #[arg(short, long)]
        symptoms: String,

        /// Write the final report to this file
        #[arg(long)]
        report_out: Option<PathBuf>,
    },

    /// Interactive terminal with the home, upload, chat and diagnostic pages
    Shell,

    /// Run the end-to-end workflow checks against the API
    Check {
        /// Run a single scenario
        #[arg(long, value_enum)]
        only: Option<ScenarioArg>,

        /// Sample PDF for the upload scenario
        #[arg(long, default_value = DEFAULT_SAMPLE_PDF)]
        sample: PathBuf,
    },

    /// Serve a local stand-in of the API
    Mock {
        #[arg(short, long, default_value = "4010")]
        port: u16,

        /// Number of steps each diagnosis takes
        #[arg(long, default_value = "5")]
        steps: u32,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ScenarioArg {
    Upload,
    Chat,
    Diagnosis,
}

impl From<ScenarioArg> for Scenario {
    fn from(arg: ScenarioArg) -> Self {
        match arg {
            ScenarioArg::Upload => Scenario::Upload,
            ScenarioArg::Chat => Scenario::Chat,
            ScenarioArg::Diagnosis => Scenario::Diagnosis,
        }
    }
}

/// Runs one command. `Ok(false)` means the command ran but reported a failure.
pub async fn execute(command: Commands, config: ApiConfig) -> Result<bool> {
    match command {
        Commands::Mock { port, steps } => serve_mock(port, steps).await,
        command => {
            let client: Arc<dyn TechniciaApi> = Arc::new(HttpApiClient::new(config.clone())?);
            run_client_command(command, client, &config).await
        }
    }
}

async fn run_client_command(
    command: Commands,
    api: Arc<dyn TechniciaApi>,
    config: &ApiConfig,
) -> Result<bool> {
    let mut out = std::io::stdout();
    match command {
        Commands::Upload { files } => {
            let mut queue = UploadQueue::new();
            queue.add_files(files);
            if let Some(notice) = queue.notice() {
                writeln!(out, "! {}", notice)?;
            }
            let summary = queue.upload_all(api.as_ref()).await;
            for (index, task) in queue.tasks().iter().enumerate() {
                writeln!(out, "{}", render_task(index, task))?;
                if let UploadStatus::Success { outcome } = &task.status {
                    writeln!(
                        out,
                        "   {} fragments de texte, {} images",
                        outcome.text_chunks_count, outcome.images_count
                    )?;
                }
            }
            if let Some(notice) = queue.notice() {
                writeln!(out, "! {}", notice)?;
            }
            Ok(summary.failed == 0 && summary.uploaded > 0)
        }
        Commands::Ask { question } => {
            let mut chat = ChatController::new(api, config.user_id.clone());
            let reply = chat.ask(&question).await?;
            writeln!(out, "{}", render_message(&reply))?;
            Ok(true)
        }
        Commands::Diagnose {
            equipment,
            symptoms,
            report_out,
        } => {
            let mut controller = DiagnosticController::new(api, config.user_id.clone());
            let input = BufReader::new(tokio::io::stdin());
            let report =
                guided_diagnosis(&mut controller, &equipment, &symptoms, input, &mut out).await?;
            match (report, report_out) {
                (Some(report), Some(path)) => {
                    let saved = save_report(&path, &report.content)?;
                    writeln!(out, "Rapport enregistré dans {}", saved.display())?;
                    Ok(true)
                }
                (report, _) => Ok(report.is_some()),
            }
        }
        Commands::Shell => {
            let mut shell = Shell::new(api, &config.user_id, out);
            shell.run(BufReader::new(tokio::io::stdin())).await?;
            Ok(true)
        }
        Commands::Check { only, sample } => {
            let suite = WorkflowSuite::new(api)
                .with_sample_pdf(sample)
                .with_pause(Duration::from_secs(config.suite_pause_secs));
            let report = match only {
                Some(scenario) => suite.run(&[scenario.into()]).await,
                None => suite.run_all().await,
            };
            for result in &report.results {
                writeln!(out, "== {}", result.scenario)?;
                for detail in &result.details {
                    writeln!(out, "   {}", detail)?;
                }
                for warning in &result.warnings {
                    writeln!(out, "   attention : {}", warning)?;
                }
            }
            writeln!(out, "\n{}", report.summary())?;
            Ok(report.all_passed())
        }
        Commands::Mock { .. } => Err(AppError::Internal(
            "The mock server does not use an API client".to_string(),
        )),
    }
}

/// Starts a diagnosis and reads one answer per step from `input` until the
/// report arrives. Returns `None` if the input ends first.
pub async fn guided_diagnosis<R, W>(
    controller: &mut DiagnosticController,
    equipment: &str,
    symptoms: &str,
    input: R,
    out: &mut W,
) -> Result<Option<DiagnosisReport>>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    controller.start(equipment, symptoms).await?;
    let mut lines = input.lines();

    while controller.state().phase == DiagnosticPhase::InProgress {
        if let Some(session) = &controller.state().session {
            writeln!(out, "\n{}", render_step(session))?;
        }
        write!(out, "Réponse : ")?;
        out.flush()?;
        let Some(response) = lines.next_line().await? else {
            return Ok(None);
        };
        write!(out, "Notes (facultatif) : ")?;
        out.flush()?;
        let notes = lines.next_line().await?.unwrap_or_default();

        if let Err(e) = controller.answer(response.trim(), notes.trim()).await {
            let banner = controller
                .state()
                .error
                .clone()
                .unwrap_or_else(|| e.user_message().to_string());
            writeln!(out, "! {}", banner)?;
            controller.dispatch(DiagnosticEvent::ErrorDismissed);
        }
    }

    let report = controller.state().report.clone();
    if let Some(report) = &report {
        info!(equipment = equipment, "Diagnosis report received");
        writeln!(out, "\n{}", render_report(report))?;
    }
    Ok(report)
}

async fn serve_mock(port: u16, total_steps: u32) -> Result<bool> {
    let state = Arc::new(MockServerState::new(MockServerConfig {
        port,
        total_steps,
        ..MockServerConfig::default()
    }));
    let addr = start_mock_server(state.clone()).await?;
    println!("Mock API listening on http://{} (Ctrl+C to stop)", addr);
    tokio::signal::ctrl_c().await?;
    stop_mock_server(state).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::test_support::FakeApi;

    #[test]
    fn test_parses_check_command() {
        let cli = Cli::try_parse_from(["technicia", "check", "--only", "chat"]).unwrap();
        match cli.command {
            Commands::Check { only, sample } => {
                assert!(matches!(only, Some(ScenarioArg::Chat)));
                assert_eq!(sample, PathBuf::from(DEFAULT_SAMPLE_PDF));
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.config, PathBuf::from("technicia.toml"));
    }

    #[test]
    fn test_diagnose_requires_equipment() {
        assert!(Cli::try_parse_from(["technicia", "diagnose", "--symptoms", "bruit"]).is_err());
    }

    #[tokio::test]
    async fn test_guided_diagnosis_reads_answers() {
        let api = Arc::new(FakeApi::with_steps(2));
        let mut controller = DiagnosticController::new(api.clone(), "user-123");
        let input: &[u8] = b"Niveau bas\n\n   \n\nFiltre sale\nvu en atelier\n";
        let mut out = Vec::new();

        let report = guided_diagnosis(
            &mut controller,
            "hydraulic-system",
            "Bruit anormal",
            input,
            &mut out,
        )
        .await
        .unwrap();

        assert!(report.unwrap().content.contains("Rapport"));
        assert_eq!(api.step_calls(), 2);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Veuillez fournir une réponse pour cette étape."));
    }

    #[tokio::test]
    async fn test_guided_diagnosis_stops_at_end_of_input() {
        let api = Arc::new(FakeApi::with_steps(3));
        let mut controller = DiagnosticController::new(api, "user-123");
        let input: &[u8] = b"Niveau bas\n\n";
        let mut out = Vec::new();

        let report = guided_diagnosis(&mut controller, "hydraulic-system", "Bruit", input, &mut out)
            .await
            .unwrap();
        assert!(report.is_none());
        assert_eq!(controller.state().phase, DiagnosticPhase::InProgress);
    }
}
