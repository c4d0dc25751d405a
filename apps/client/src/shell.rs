//! Interactive terminal front end.
//!
//! The shell is a pure view layer: it renders state owned by the session
//! controller and forwards user intents to it. Dashboard flow mirrors the
//! product's three steps (setup, analyze, optimize), then drops into a
//! chat-style refinement loop over the resulting workflow.

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::actions::{self, AnalyzeRequest, OptimizeRequest};
use crate::api::ApiClient;
use crate::auth;
use crate::errors::ClientError;
use crate::files::{self, FileKind};
use crate::models::analysis::AnalysisReport;
use crate::models::job::{JobState, JobSubmission};
use crate::models::workflow::WorkflowSummary;
use crate::session::controller::{RefinementBackend, RefinementSession};
use crate::session::poll::{await_job, PollConfig};
use crate::session::state::{SeedVersion, Version, VersionId, VersionStatus};

pub struct Shell {
    api: Arc<ApiClient>,
    poll: PollConfig,
    editor: DefaultEditor,
    // Dashboard state for the analyze → optimize flow.
    job_description: String,
    selected_template: String,
    selected_profile: String,
    analysis: Option<AnalysisReport>,
    ignored_keywords: BTreeSet<String>,
    manual_keywords: BTreeSet<String>,
}

impl Shell {
    pub fn new(api: Arc<ApiClient>, poll: PollConfig) -> Result<Self, ReadlineError> {
        Ok(Shell {
            api,
            poll,
            editor: DefaultEditor::new()?,
            job_description: String::new(),
            selected_template: String::new(),
            selected_profile: String::new(),
            analysis: None,
            ignored_keywords: BTreeSet::new(),
            manual_keywords: BTreeSet::new(),
        })
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        println!("{}", "Resume Studio".bold());
        println!("Type 'help' for commands, 'quit' to exit.\n");

        loop {
            match self.editor.readline("studio> ") {
                Ok(line) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = self.editor.add_history_entry(&line);
                    if line == "quit" || line == "exit" {
                        break;
                    }
                    if let Err(e) = self.dispatch(&line).await {
                        println!("{}", format!("Error: {e}").red());
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn dispatch(&mut self, line: &str) -> Result<(), ClientError> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            ["help"] => print_help(),
            ["login", username] => self.cmd_login(username).await?,
            ["register", username, email] => self.cmd_register(username, email).await?,
            ["whoami"] => self.cmd_whoami().await?,
            ["logout"] => {
                auth::logout(&self.api);
                println!("Logged out.");
            }
            ["templates"] => self.cmd_list(FileKind::Template).await?,
            ["profiles"] => self.cmd_list(FileKind::Profile).await?,
            ["upload", kind, path] => match parse_kind(kind) {
                Some(kind) => {
                    files::upload(&self.api, kind, Path::new(path)).await?;
                    println!("Uploaded {}.", path.green());
                }
                None => println!("Usage: upload <template|profile> <path>"),
            },
            ["delete", kind, name] => match parse_kind(kind) {
                Some(kind) => {
                    files::delete(&self.api, kind, name).await?;
                    println!("Deleted {name}.");
                }
                None => println!("Usage: delete <template|profile> <name>"),
            },
            ["jd"] => self.cmd_job_description()?,
            ["analyze", template, profile] => self.cmd_analyze(template, profile).await?,
            ["ignore", keyword] => self.toggle_keyword(keyword),
            ["add-keyword", keyword] => {
                self.manual_keywords.insert(keyword.to_string());
                println!("Will ask the optimizer to work in '{keyword}'.");
            }
            ["optimize", output] => self.cmd_optimize(output).await?,
            ["jobs"] => self.cmd_jobs().await?,
            ["history"] => self.cmd_history().await?,
            ["open", id_prefix] => self.cmd_open(id_prefix).await?,
            _ => println!("Unknown command. Type 'help' for the list."),
        }
        Ok(())
    }

    async fn cmd_login(&mut self, username: &str) -> Result<(), ClientError> {
        let password = self.prompt("Password: ")?;
        let token = auth::login(&self.api, username, password.trim()).await?;
        println!("Welcome back, {}.", token.username.green());
        Ok(())
    }

    async fn cmd_register(&mut self, username: &str, email: &str) -> Result<(), ClientError> {
        let password = self.prompt("Password: ")?;
        let token = auth::register(&self.api, username, email, password.trim()).await?;
        println!("Account created. Logged in as {}.", token.username.green());
        Ok(())
    }

    async fn cmd_whoami(&self) -> Result<(), ClientError> {
        let user = auth::current_user(&self.api).await?;
        println!("{} <{}>", user.username.bold(), user.email);
        Ok(())
    }

    async fn cmd_list(&self, kind: FileKind) -> Result<(), ClientError> {
        let entries = files::list(&self.api, kind).await?;
        if entries.is_empty() {
            println!("No {}s uploaded yet.", kind.label());
            return Ok(());
        }
        for name in entries {
            println!("  {name}");
        }
        Ok(())
    }

    /// Reads a multi-line job description, terminated by a `.` on its own line.
    fn cmd_job_description(&mut self) -> Result<(), ClientError> {
        println!("Paste the job description. End with a single '.' line.");
        let mut collected = String::new();
        loop {
            match self.editor.readline("| ") {
                Ok(line) if line.trim() == "." => break,
                Ok(line) => {
                    collected.push_str(&line);
                    collected.push('\n');
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => {
                    println!("{}", format!("Input aborted: {e}").red());
                    return Ok(());
                }
            }
        }
        if collected.trim().is_empty() {
            println!("Job description unchanged.");
        } else {
            self.job_description = collected;
            self.analysis = None;
            println!("Job description set ({} chars).", self.job_description.len());
        }
        Ok(())
    }

    async fn cmd_analyze(&mut self, template: &str, profile: &str) -> Result<(), ClientError> {
        if self.job_description.trim().is_empty() {
            println!("Set the job description first with 'jd'.");
            return Ok(());
        }
        println!("Analyzing match...");
        let report = actions::analyze(
            &self.api,
            &AnalyzeRequest {
                template_filename: template.to_string(),
                profile_filename: profile.to_string(),
                job_description: self.job_description.clone(),
            },
        )
        .await?;

        self.render_analysis(&report);
        self.selected_template = template.to_string();
        self.selected_profile = profile.to_string();
        self.analysis = Some(report);
        self.ignored_keywords.clear();
        self.manual_keywords.clear();
        Ok(())
    }

    fn toggle_keyword(&mut self, keyword: &str) {
        if self.ignored_keywords.remove(keyword) {
            println!("'{keyword}' will be considered again.");
        } else {
            self.ignored_keywords.insert(keyword.to_string());
            println!("'{keyword}' will be ignored during optimization.");
        }
    }

    async fn cmd_optimize(&mut self, output: &str) -> Result<(), ClientError> {
        let Some(analysis) = self.analysis.clone() else {
            println!("Run 'analyze' first.");
            return Ok(());
        };

        let req = OptimizeRequest {
            template_filename: self.selected_template.clone(),
            profile_filename: self.selected_profile.clone(),
            job_description: self.job_description.clone(),
            analysis_result: analysis,
            output_filename: output.to_string(),
            ignored_keywords: self.ignored_keywords.iter().cloned().collect(),
            manual_keywords: self.manual_keywords.iter().cloned().collect(),
        };

        let response = actions::optimize(&self.api, &req).await?;
        let result = match response.into_submission() {
            JobSubmission::Queued { job_id } => {
                println!("Optimization queued as job {}. Waiting...", job_id.cyan());
                let status = await_job(self.api.as_ref(), &job_id, &self.poll).await?;
                if status.state() == JobState::Failed {
                    let detail = status.error.unwrap_or_else(|| "Job failed".to_string());
                    println!("{}", format!("Optimization failed: {detail}").red());
                    return Ok(());
                }
                status.result.unwrap_or_default()
            }
            JobSubmission::Sync(result) => result,
        };

        let Some(workflow_id) = result.workflow_id else {
            println!("{}", "Backend returned no workflow id; cannot refine.".red());
            return Ok(());
        };

        if let Some(optimization) = &result.optimization {
            println!(
                "Optimized. New score: {}",
                format!("{}%", optimization.final_score).green().bold()
            );
            for change in &optimization.summary {
                println!("  - {change}");
            }
        }

        let seed = SeedVersion::from_result(&result, output);
        let session = self.make_session(workflow_id, self.job_description.clone(), seed);
        self.run_session(session).await
    }

    async fn cmd_jobs(&self) -> Result<(), ClientError> {
        let jobs = actions::recent_jobs(&self.api).await?;
        if jobs.is_empty() {
            println!("No jobs found.");
            return Ok(());
        }
        for job in jobs {
            println!(
                "  {}  {}",
                short_id(&job.job_id),
                render_job_state(JobState::parse(&job.status), &job.status)
            );
        }
        Ok(())
    }

    async fn cmd_history(&self) -> Result<(), ClientError> {
        let workflows = actions::workflows(&self.api).await?;
        if workflows.is_empty() {
            println!("No workflows yet.");
            return Ok(());
        }
        for workflow in workflows {
            render_workflow_row(&workflow);
        }
        println!("Use 'open <id>' to inspect and resume a workflow.");
        Ok(())
    }

    async fn cmd_open(&mut self, id_prefix: &str) -> Result<(), ClientError> {
        let workflows = actions::workflows(&self.api).await?;
        let Some(found) = workflows
            .iter()
            .find(|w| w.id.to_string().starts_with(id_prefix))
        else {
            println!("No workflow matching '{id_prefix}'.");
            return Ok(());
        };

        let detail = actions::workflow_detail(&self.api, found.id).await?;
        println!("{}", "Versions & attempts:".bold());
        for job in &detail.jobs {
            let state = JobState::parse(&job.status);
            let version = job
                .result_data
                .as_ref()
                .and_then(|r| r.version.clone())
                .unwrap_or_else(|| "—".to_string());
            println!(
                "  {}  {}  {}",
                short_id(&job.id),
                version,
                render_job_state(state, &job.status)
            );
            if state == JobState::Failed {
                if let Some(message) = &job.error_message {
                    println!("      {}", message.red());
                }
            }
        }

        // Resume refinement from the most recent successful attempt.
        let Some((result, _)) = detail
            .jobs
            .iter()
            .filter(|j| JobState::parse(&j.status) == JobState::Success)
            .filter_map(|j| j.result_data.as_ref().map(|r| (r.clone(), j.created_at)))
            .max_by_key(|(_, created_at)| *created_at)
        else {
            println!("No successful attempt to refine from.");
            return Ok(());
        };

        let fallback_output = detail
            .template_filename
            .as_deref()
            .map(template_stem)
            .map(|stem| format!("{stem}_Optimized"))
            .unwrap_or_else(|| "Optimized_Resume".to_string());
        let seed = SeedVersion::from_result(&result, &fallback_output);
        let session = self.make_session(detail.id, detail.job_description.clone(), seed);
        self.run_session(session).await
    }

    fn make_session(
        &self,
        workflow_id: uuid::Uuid,
        job_description: String,
        seed: SeedVersion,
    ) -> RefinementSession {
        let backend: Arc<dyn RefinementBackend> = self.api.clone();
        RefinementSession::new(backend, self.poll.clone(), workflow_id, job_description, seed)
    }

    // ── Refinement session loop ─────────────────────────────────────────

    async fn run_session(&mut self, session: RefinementSession) -> Result<(), ClientError> {
        println!(
            "\n{} Type a change request to refine, or /help for commands.",
            "Refinement session started.".bold()
        );
        render_versions(&session);

        loop {
            let line = match self.editor.readline("refine> ") {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => {
                    println!("{}", format!("Input error: {e}").red());
                    break;
                }
            };
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }
            let _ = self.editor.add_history_entry(&line);

            if let Some(command) = line.strip_prefix('/') {
                match self.session_command(&session, command).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    // Command failures stay inside the session; only /back
                    // or EOF leaves it.
                    Err(e) => println!("{}", format!("Error: {e}").red()),
                }
            } else {
                if session.is_busy() {
                    println!("A version is still generating — use /wait to follow it.");
                    continue;
                }
                match session.submit_refinement(&line).await {
                    Some(id) => println!(
                        "{id} queued. The session stays interactive; /versions to check on it."
                    ),
                    None => println!("Empty request ignored."),
                }
            }
        }

        session.shutdown();
        println!("Left refinement session.");
        Ok(())
    }

    /// Handles a `/command` inside the session. Returns false to leave.
    async fn session_command(
        &mut self,
        session: &RefinementSession,
        command: &str,
    ) -> Result<bool, ClientError> {
        let parts: Vec<&str> = command.split_whitespace().collect();
        match parts.as_slice() {
            ["back"] | ["quit"] => return Ok(false),
            ["help"] => print_session_help(),
            ["versions"] => render_versions(session),
            ["select", id] => match id.parse::<VersionId>() {
                Ok(id) => {
                    if session.select_version(id) {
                        render_version_detail(&session.selected());
                    } else {
                        println!("No such version.");
                    }
                }
                Err(e) => println!("{e}"),
            },
            ["links"] => {
                let locations = session.active_artifacts();
                println!("  pdf: {}", locations.pdf);
                println!("  tex: {}", locations.tex);
                println!("  log: {}", locations.log);
            }
            ["save", ext, ..] if !matches!(*ext, "pdf" | "tex" | "log") => {
                println!("Usage: /save <pdf|tex|log> [path]");
            }
            ["save", ext] => self.save_artifact(session, ext, None).await?,
            ["save", ext, dest] => {
                let dest = PathBuf::from(dest);
                self.save_artifact(session, ext, Some(dest)).await?;
            }
            ["compile", path] => {
                if session.is_busy() {
                    println!("A version is still generating — use /wait to follow it.");
                    return Ok(true);
                }
                let source = tokio::fs::read_to_string(path).await?;
                match session.submit_manual_compile(&source).await {
                    Some(id) => {
                        println!("Compiling {path} as {id}...");
                        render_version_detail(&session.selected());
                    }
                    None => println!("{path} is empty; nothing to compile."),
                }
            }
            ["jd"] => println!("{}", session.job_description()),
            ["wait"] => {
                while session.is_busy() {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
                render_version_detail(&session.selected());
            }
            _ => println!("Unknown command. /help for the list."),
        }
        Ok(true)
    }

    async fn save_artifact(
        &self,
        session: &RefinementSession,
        ext: &str,
        dest: Option<PathBuf>,
    ) -> Result<(), ClientError> {
        let version = session.selected();
        if version.status == VersionStatus::Generating {
            println!("{} is still generating; nothing to save yet.", version.id);
            return Ok(());
        }
        let filename = format!("{}.{ext}", version.artifact_name);
        let dest = dest.unwrap_or_else(|| PathBuf::from(&filename));
        let bytes = files::download_artifact(
            &self.api,
            session.workflow_id(),
            &version.id.to_string(),
            &filename,
            &dest,
        )
        .await?;
        println!("Saved {} ({bytes} bytes) to {}", filename, dest.display());
        Ok(())
    }

    fn render_analysis(&self, report: &AnalysisReport) {
        println!(
            "Match score: {}",
            format!("{}%", report.ats_score).bold().green()
        );
        if !report.matched_keywords.is_empty() {
            println!(
                "{} {}",
                "Matched:".green(),
                report.matched_keywords.join(", ")
            );
        }
        if !report.missing_keywords.is_empty() {
            println!("{}", "Missing (use 'ignore <kw>' to skip):".red());
            for keyword in &report.missing_keywords {
                if self.ignored_keywords.contains(keyword) {
                    println!("  {}", keyword.strikethrough().dimmed());
                } else {
                    println!("  {}", keyword.red());
                }
            }
        }
    }

    fn prompt(&mut self, label: &str) -> Result<String, ClientError> {
        self.editor
            .readline(label)
            .map_err(|e| ClientError::Io(std::io::Error::other(e)))
    }
}

// ── Rendering helpers ───────────────────────────────────────────────────

fn render_versions(session: &RefinementSession) {
    let selected = session.selected_id();
    println!("{}", "Version history:".bold());
    for version in session.versions() {
        let marker = if version.id == selected { ">" } else { " " };
        println!(
            "{marker} {} {} {}  {}",
            status_glyph(&version.status),
            version.id.to_string().bold(),
            score_chip(version.score),
            truncate(&version.summary, 60)
        );
    }
}

fn render_version_detail(version: &Version) {
    match &version.status {
        VersionStatus::Generating => {
            println!("{} {} — generating...", status_glyph(&version.status), version.id);
        }
        VersionStatus::Completed => {
            println!(
                "{} {} {} {}  ({})",
                status_glyph(&version.status),
                version.id.to_string().bold(),
                score_chip(version.score),
                truncate(&version.summary, 60),
                version
                    .created_at
                    .map(|t| t.format("%H:%M").to_string())
                    .unwrap_or_else(|| "—".to_string())
            );
            println!("  artifact: {}", version.artifact_name);
        }
        VersionStatus::Error(detail) => {
            println!(
                "{} {} failed: {}",
                status_glyph(&version.status),
                version.id.to_string().bold(),
                truncate(detail, 200).red()
            );
            println!("  Full log: /save log");
        }
    }
}

fn render_workflow_row(workflow: &WorkflowSummary) {
    let when = workflow
        .created_at
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "—".to_string());
    println!(
        "  {}  {}  {}  ({} attempts)",
        short_id(&workflow.id.to_string()),
        when,
        workflow
            .template_filename
            .as_deref()
            .map(template_stem)
            .unwrap_or("—"),
        workflow.jobs.len()
    );
}

fn render_job_state(state: JobState, raw: &str) -> String {
    match state {
        JobState::Success => raw.to_uppercase().green().to_string(),
        JobState::Failed => raw.to_uppercase().red().to_string(),
        JobState::Pending => raw.to_uppercase().yellow().to_string(),
    }
}

fn status_glyph(status: &VersionStatus) -> String {
    match status {
        VersionStatus::Completed => "✓".green().to_string(),
        VersionStatus::Generating => "…".yellow().to_string(),
        VersionStatus::Error(_) => "✗".red().to_string(),
    }
}

fn score_chip(score: u32) -> String {
    if score == 0 {
        return "  — ".to_string();
    }
    let chip = format!("{score:>3}%");
    if score >= 90 {
        chip.green().to_string()
    } else if score >= 80 {
        chip.yellow().to_string()
    } else {
        chip.red().to_string()
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let text = text.trim().replace('\n', " ");
    if text.chars().count() <= max_chars {
        text
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}…")
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

fn template_stem(filename: &str) -> &str {
    filename.strip_suffix(".tex").unwrap_or(filename)
}

fn parse_kind(token: &str) -> Option<FileKind> {
    match token {
        "template" | "templates" => Some(FileKind::Template),
        "profile" | "profiles" => Some(FileKind::Profile),
        _ => None,
    }
}

fn print_help() {
    println!("  login <username>            Authenticate against the backend");
    println!("  register <username> <email> Create an account");
    println!("  whoami                      Show the logged-in user");
    println!("  logout                      Drop the session token");
    println!("  templates | profiles        List uploaded files");
    println!("  upload <kind> <path>        Upload a template (.tex) or profile (.pdf)");
    println!("  delete <kind> <name>        Delete an uploaded file");
    println!("  jd                          Enter the target job description");
    println!("  analyze <template> <profile>  Score the match");
    println!("  ignore <keyword>            Toggle a missing keyword on/off");
    println!("  add-keyword <keyword>       Force a keyword into the optimization");
    println!("  optimize <output_name>      Generate the tailored resume");
    println!("  jobs                        Recent background jobs");
    println!("  history                     Past workflows");
    println!("  open <id>                   Inspect a workflow / resume refining");
    println!("  quit                        Exit");
}

fn print_session_help() {
    println!("  <free text>        Request a refinement of the selected version");
    println!("  /versions          Show the version history");
    println!("  /select <vN>       Switch the active version");
    println!("  /links             Download URLs for the active version");
    println!("  /save <pdf|tex|log> [path]  Download an artifact");
    println!("  /compile <path>    Compile an edited .tex file as a new version");
    println!("  /wait              Block until the generating version resolves");
    println!("  /jd                Show the job description");
    println!("  /back              Leave the session (stops all polling)");
}
