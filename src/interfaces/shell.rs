//! Interactive terminal front end.
//!
//! One screen per route, switched with `/`, `/upload`, `/chat` or
//! `/diagnostic`. Each screen keeps its controller alive across route
//! changes so a conversation or a diagnosis survives a detour.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

use crate::application::use_cases::chat_session::{ChatController, ChatEvent};
use crate::application::use_cases::diagnostic_flow::{
    DiagnosticController, DiagnosticEvent, DiagnosticPhase,
};
use crate::application::use_cases::upload_queue::UploadQueue;
use crate::domain::chat::{ChatMessage, Sender, SUGGESTED_QUESTIONS};
use crate::domain::diagnosis::{DiagnosisReport, DiagnosisSession, EQUIPMENT_OPTIONS};
use crate::domain::document::{format_file_size, UploadStatus, UploadTask};
use crate::domain::error::Result;
use crate::domain::route::{navigation, Route};
use crate::infrastructure::api_client::TechniciaApi;

pub fn render_navigation(active: Route) -> String {
    navigation(active)
        .iter()
        .map(|item| {
            if item.active {
                format!("[{}]", item.label)
            } else {
                item.label.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

pub fn render_message(message: &ChatMessage) -> String {
    let who = match message.sender {
        Sender::User => "Vous",
        Sender::Assistant if message.is_error => "TechnicIA (erreur)",
        Sender::Assistant => "TechnicIA",
    };
    let mut text = format!(
        "[{}] {} : {}",
        message.timestamp.format("%H:%M"),
        who,
        message.content
    );
    for image in &message.images {
        text.push_str(&format!("\n    image : {}", image));
    }
    text
}

pub fn render_task(index: usize, task: &UploadTask) -> String {
    let line = format!(
        "{}. {} ({}) : {}",
        index + 1,
        task.file.name,
        format_file_size(task.file.size),
        task.status.label()
    );
    match &task.status {
        UploadStatus::Error { message } => format!("{} ({})", line, message),
        _ => line,
    }
}

pub fn render_step(session: &DiagnosisSession) -> String {
    let step = &session.current_step_data;
    let mut lines = vec![
        format!(
            "Étape {}/{} ({:.0}%) : {}",
            session.progress.current_step,
            session.progress.total_steps,
            session.progress.percent_complete,
            step.title
        ),
    ];
    for (label, value) in [
        ("Description", &step.description),
        ("Instructions", &step.instructions),
        ("Résultats attendus", &step.expected_results),
    ] {
        if !value.is_empty() {
            lines.push(format!("  {} : {}", label, value));
        }
    }
    lines.push(format!("  Question : {}", step.question));
    lines.join("\n")
}

pub fn render_report(report: &DiagnosisReport) -> String {
    format!(
        "Rapport de diagnostic (durée : {})\n\n{}",
        report.diagnosis_duration, report.content
    )
}

const HELP: &str = "\
Navigation : /  /upload  /chat  /diagnostic  (ou le nom de la page), quit pour sortir
Documentation : add <fichiers...>, list, send, retry <n>, remove <n>
Chat : tapez votre question, suggest <n> pour une question suggérée
Diagnostic : equipment <n|id>, symptoms <texte>, start, note <texte>, puis votre réponse ; restart";

pub struct Shell<W: Write> {
    api: Arc<dyn TechniciaApi>,
    out: W,
    route: Route,
    uploads: UploadQueue,
    chat: ChatController,
    diagnostic: DiagnosticController,
}

impl<W: Write> Shell<W> {
    pub fn new(api: Arc<dyn TechniciaApi>, user_id: &str, out: W) -> Self {
        Self {
            chat: ChatController::new(api.clone(), user_id),
            diagnostic: DiagnosticController::new(api.clone(), user_id),
            uploads: UploadQueue::new(),
            api,
            out,
            route: Route::Home,
        }
    }

    pub fn route(&self) -> Route {
        self.route
    }

    pub fn into_output(self) -> W {
        self.out
    }

    pub async fn run<R>(&mut self, input: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        self.show_route()?;
        let mut lines = input.lines();
        loop {
            write!(self.out, "{}> ", self.route.path())?;
            self.out.flush()?;
            let Some(line) = lines.next_line().await? else {
                break;
            };
            if !self.handle_line(&line).await? {
                break;
            }
        }
        Ok(())
    }

    /// Handles one input line. Returns `false` once the user asked to quit.
    pub async fn handle_line(&mut self, line: &str) -> Result<bool> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(true);
        }
        match line {
            "quit" | "exit" => return Ok(false),
            "help" | "?" => {
                writeln!(self.out, "{}", HELP)?;
                return Ok(true);
            }
            _ => {}
        }
        if line.starts_with('/') {
            self.go(Route::resolve(line))?;
            return Ok(true);
        }

        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };
        if command == "go" {
            self.go(Route::resolve(rest))?;
            return Ok(true);
        }

        debug!(route = ?self.route, command = command, "Shell input");
        match self.route {
            Route::Home => self.handle_home(line)?,
            Route::Upload => self.handle_upload(command, rest).await?,
            Route::Chat => self.handle_chat(command, rest, line).await?,
            Route::Diagnostic => self.handle_diagnostic(command, rest, line).await?,
        }
        Ok(true)
    }

    fn go(&mut self, route: Route) -> Result<()> {
        self.route = route;
        self.show_route()
    }

    fn show_route(&mut self) -> Result<()> {
        writeln!(self.out, "\n{}\n", render_navigation(self.route))?;
        match self.route {
            Route::Home => {
                writeln!(self.out, "TechnicIA : assistant de maintenance technique")?;
                writeln!(self.out, "  1. Téléverser une documentation ({})", Route::Upload.path())?;
                writeln!(self.out, "  2. Poser une question ({})", Route::Chat.path())?;
                writeln!(self.out, "  3. Lancer un diagnostic ({})", Route::Diagnostic.path())?;
            }
            Route::Upload => self.show_uploads()?,
            Route::Chat => {
                if self.chat.state().messages.is_empty() {
                    writeln!(self.out, "Questions suggérées :")?;
                    for (index, question) in SUGGESTED_QUESTIONS.iter().enumerate() {
                        writeln!(self.out, "  {}. {}", index + 1, question)?;
                    }
                } else {
                    let rendered: Vec<String> =
                        self.chat.state().messages.iter().map(render_message).collect();
                    for line in rendered {
                        writeln!(self.out, "{}", line)?;
                    }
                }
            }
            Route::Diagnostic => self.show_diagnostic()?,
        }
        Ok(())
    }

    fn handle_home(&mut self, line: &str) -> Result<()> {
        match line {
            "1" => self.go(Route::Upload),
            "2" => self.go(Route::Chat),
            "3" => self.go(Route::Diagnostic),
            _ => {
                writeln!(self.out, "Choisissez 1, 2 ou 3, ou tapez help.")?;
                Ok(())
            }
        }
    }

    fn show_uploads(&mut self) -> Result<()> {
        if self.uploads.tasks().is_empty() {
            writeln!(self.out, "Aucun fichier sélectionné. Utilisez add <fichier.pdf>.")?;
        }
        let rendered: Vec<String> = self
            .uploads
            .tasks()
            .iter()
            .enumerate()
            .map(|(index, task)| render_task(index, task))
            .collect();
        for line in rendered {
            writeln!(self.out, "{}", line)?;
        }
        if let Some(details) = self.uploads.processing_details().cloned() {
            writeln!(
                self.out,
                "Dernier document traité : {} ({} fragments de texte, {} images)",
                details.document_name, details.text_chunks_count, details.images_count
            )?;
        }
        if let Some(notice) = self.uploads.notice().map(|n| n.to_string()) {
            writeln!(self.out, "! {}", notice)?;
            self.uploads.dismiss_notice();
        }
        Ok(())
    }

    fn task_id(&self, arg: &str) -> Option<String> {
        let index = arg.parse::<usize>().ok()?.checked_sub(1)?;
        self.uploads.tasks().get(index).map(|task| task.id.clone())
    }

    async fn handle_upload(&mut self, command: &str, rest: &str) -> Result<()> {
        match command {
            "add" => {
                let paths: Vec<PathBuf> = rest.split_whitespace().map(PathBuf::from).collect();
                let added = self.uploads.add_files(paths);
                writeln!(self.out, "{} fichier(s) ajouté(s).", added)?;
            }
            "send" => {
                let summary = self.uploads.upload_all(self.api.as_ref()).await;
                writeln!(
                    self.out,
                    "{} téléversé(s), {} en erreur.",
                    summary.uploaded, summary.failed
                )?;
            }
            "retry" | "remove" => {
                let Some(id) = self.task_id(rest) else {
                    writeln!(self.out, "Numéro de fichier inconnu : {}", rest)?;
                    return Ok(());
                };
                let changed = if command == "retry" {
                    self.uploads.retry(&id)
                } else {
                    self.uploads.remove(&id)
                };
                if !changed {
                    writeln!(self.out, "Rien à faire pour le fichier {}.", rest)?;
                }
            }
            "list" => {}
            _ => {
                writeln!(self.out, "Commande inconnue. Tapez help.")?;
                return Ok(());
            }
        }
        self.show_uploads()
    }

    async fn handle_chat(&mut self, command: &str, rest: &str, line: &str) -> Result<()> {
        if command == "suggest" {
            let index = rest.parse::<usize>().ok().and_then(|n| n.checked_sub(1));
            match index.filter(|i| *i < SUGGESTED_QUESTIONS.len()) {
                Some(index) => self.chat.dispatch(ChatEvent::SuggestionSelected(index)),
                None => {
                    writeln!(self.out, "Suggestion inconnue : {}", rest)?;
                    return Ok(());
                }
            }
        } else {
            self.chat.dispatch(ChatEvent::InputChanged(line.to_string()));
        }

        let sent = self.chat.send().await;
        let state = self.chat.state();
        let start = state.messages.len().saturating_sub(2);
        let rendered: Vec<String> = state.messages[start..].iter().map(render_message).collect();
        let banner = state.error.clone();
        for line in rendered {
            writeln!(self.out, "{}", line)?;
        }
        if sent.is_err() {
            if let Some(banner) = banner {
                writeln!(self.out, "! {}", banner)?;
            }
            self.chat.dispatch(ChatEvent::ErrorDismissed);
        }
        Ok(())
    }

    fn show_diagnostic(&mut self) -> Result<()> {
        let state = self.diagnostic.state().clone();
        match state.phase {
            DiagnosticPhase::Initial => {
                writeln!(self.out, "Équipements :")?;
                for (index, option) in EQUIPMENT_OPTIONS.iter().enumerate() {
                    let marker = if option.id == state.equipment_id { "*" } else { " " };
                    writeln!(self.out, " {}{}. {} ({})", marker, index + 1, option.name, option.id)?;
                }
                if !state.symptoms.is_empty() {
                    writeln!(self.out, "Symptômes : {}", state.symptoms)?;
                }
            }
            DiagnosticPhase::InProgress => {
                if let Some(session) = &state.session {
                    writeln!(self.out, "{}", render_step(session))?;
                }
            }
            DiagnosticPhase::Completed => {
                if let Some(report) = &state.report {
                    writeln!(self.out, "{}", render_report(report))?;
                }
                writeln!(self.out, "Tapez restart pour un nouveau diagnostic.")?;
            }
        }
        if let Some(error) = state.error {
            writeln!(self.out, "! {}", error)?;
            self.diagnostic.dispatch(DiagnosticEvent::ErrorDismissed);
        }
        Ok(())
    }

    async fn handle_diagnostic(&mut self, command: &str, rest: &str, line: &str) -> Result<()> {
        if command == "restart" {
            self.diagnostic.restart();
            return self.show_diagnostic();
        }

        match self.diagnostic.state().phase {
            DiagnosticPhase::Initial => match command {
                "equipment" => {
                    let equipment_id = rest
                        .parse::<usize>()
                        .ok()
                        .and_then(|n| n.checked_sub(1))
                        .and_then(|i| EQUIPMENT_OPTIONS.get(i))
                        .map(|option| option.id.to_string())
                        .unwrap_or_else(|| rest.to_string());
                    self.diagnostic
                        .dispatch(DiagnosticEvent::EquipmentSelected(equipment_id));
                }
                "symptoms" => self
                    .diagnostic
                    .dispatch(DiagnosticEvent::SymptomsChanged(rest.to_string())),
                "start" => {
                    if let Err(e) = self.diagnostic.submit_start().await {
                        debug!(error = %e, "Diagnosis start refused");
                    }
                }
                _ => {
                    writeln!(self.out, "Choisissez un équipement et décrivez les symptômes, puis start.")?;
                    return Ok(());
                }
            },
            DiagnosticPhase::InProgress => {
                if command == "note" {
                    self.diagnostic
                        .dispatch(DiagnosticEvent::NotesChanged(rest.to_string()));
                    writeln!(self.out, "Note enregistrée.")?;
                    return Ok(());
                }
                self.diagnostic
                    .dispatch(DiagnosticEvent::ResponseChanged(line.to_string()));
                if let Err(e) = self.diagnostic.submit_step().await {
                    debug!(error = %e, "Diagnosis step refused");
                }
            }
            DiagnosticPhase::Completed => {}
        }
        self.show_diagnostic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::test_support::FakeApi;
    use tempfile::TempDir;

    fn shell(api: Arc<FakeApi>) -> Shell<Vec<u8>> {
        Shell::new(api, "user-123", Vec::new())
    }

    fn output(shell: Shell<Vec<u8>>) -> String {
        String::from_utf8(shell.into_output()).unwrap()
    }

    #[test]
    fn test_navigation_highlights_active_route() {
        assert_eq!(
            render_navigation(Route::Chat),
            "Accueil | Documentation | [Chat] | Diagnostic"
        );
    }

    #[tokio::test]
    async fn test_route_switching() {
        let mut shell = shell(Arc::new(FakeApi::with_steps(1)));
        shell.handle_line("/chat").await.unwrap();
        assert_eq!(shell.route(), Route::Chat);
        shell.handle_line("go Diagnostic").await.unwrap();
        assert_eq!(shell.route(), Route::Diagnostic);
        shell.handle_line("/nowhere").await.unwrap();
        assert_eq!(shell.route(), Route::Home);
        shell.handle_line("2").await.unwrap();
        assert_eq!(shell.route(), Route::Chat);
        assert!(!shell.handle_line("quit").await.unwrap());
    }

    #[tokio::test]
    async fn test_chat_prints_question_and_answer() {
        let api = Arc::new(FakeApi::with_steps(1));
        let mut shell = shell(api.clone());
        shell.handle_line("/chat").await.unwrap();
        shell.handle_line("suggest 2").await.unwrap();

        assert_eq!(api.questions.lock().unwrap()[0].question, SUGGESTED_QUESTIONS[1]);
        let text = output(shell);
        assert!(text.contains("Vous : Quelle est la procédure"));
        assert!(text.contains("image : /images/schema-1.png"));
    }

    #[tokio::test]
    async fn test_upload_screen_lists_status() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manuel.pdf");
        std::fs::write(&path, b"%PDF-1.4\n").unwrap();

        let mut shell = shell(Arc::new(FakeApi::with_steps(1)));
        shell.handle_line("/upload").await.unwrap();
        shell.handle_line(&format!("add {}", path.display())).await.unwrap();
        shell.handle_line("send").await.unwrap();

        let text = output(shell);
        assert!(text.contains("1. manuel.pdf (9 B) : En attente"));
        assert!(text.contains("1. manuel.pdf (9 B) : Téléversé"));
        assert!(text.contains("12 fragments de texte"));
    }

    #[tokio::test]
    async fn test_upload_screen_shows_server_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("b.pdf");
        std::fs::write(&path, b"%PDF-1.4\n").unwrap();
        let api = Arc::new(FakeApi::with_steps(1));
        api.fail_file("b.pdf");

        let mut shell = shell(api);
        shell.handle_line("/upload").await.unwrap();
        shell.handle_line(&format!("add {}", path.display())).await.unwrap();
        shell.handle_line("send").await.unwrap();

        let text = output(shell);
        assert!(text.contains("1. b.pdf (9 B) : Erreur (b.pdf est illisible)"));
    }

    #[tokio::test]
    async fn test_diagnostic_walkthrough() {
        let api = Arc::new(FakeApi::with_steps(2));
        let mut shell = shell(api.clone());
        for line in [
            "/diagnostic",
            "start",
            "equipment 1",
            "symptoms Bruit anormal",
            "start",
            "note Pompe chaude",
            "Niveau d'huile bas",
            "Filtre colmaté",
        ] {
            shell.handle_line(line).await.unwrap();
        }

        assert_eq!(api.start_calls(), 1);
        assert_eq!(api.step_calls(), 2);
        let text = output(shell);
        assert!(text.contains("Veuillez sélectionner un équipement"));
        assert!(text.contains("Étape 2/2"));
        assert!(text.contains("Filtres colmatés"));
    }
}
