//! Terminal surface — prints views to stdout, reads commands from stdin.

use std::fmt::Write as _;
use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt, stream};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use super::command::{Command, parse_command};
use super::RenderSurface;
use crate::error::SurfaceError;
use crate::session::brief::BriefForm;
use crate::session::snapshot::{ChatTurn, CompiledBrief, Role};
use crate::session::view::{AuditCard, ResultsView, View, ViewBody};
use crate::session::Stage;

type LineStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Line-oriented surface over any input stream and writer.
pub struct TerminalSurface<W = tokio::io::Stdout> {
    lines: LineStream,
    out: W,
    /// Brief form being filled in; survives until a project is started.
    draft: BriefForm,
    /// Show analyst sections, sub-reports and raw model output in full.
    details: bool,
    last: Option<View>,
}

impl TerminalSurface {
    /// Read lines from stdin on a background task.
    pub fn stdio() -> Self {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let lines = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|line| (line, rx))
        });
        Self::new(Box::pin(lines), tokio::io::stdout())
    }
}

impl<W: AsyncWrite + Unpin + Send> TerminalSurface<W> {
    pub fn new(lines: LineStream, out: W) -> Self {
        Self {
            lines,
            out,
            draft: BriefForm::default(),
            details: false,
            last: None,
        }
    }

    pub fn into_writer(self) -> W {
        self.out
    }

    async fn write(&mut self, text: &str) -> Result<(), SurfaceError> {
        self.out.write_all(text.as_bytes()).await?;
        self.out.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> RenderSurface for TerminalSurface<W> {
    async fn present(&mut self, view: &View) -> Result<(), SurfaceError> {
        if view.stage != Stage::Form {
            self.draft = BriefForm::default();
        }
        let text = render(view, self.details);
        self.last = Some(view.clone());
        self.write(&text).await
    }

    async fn notice(&mut self, message: &str) -> Result<(), SurfaceError> {
        self.write(&format!("{message}\n> ")).await
    }

    async fn next_command(&mut self, stage: Stage) -> Option<Command> {
        loop {
            let line = self.lines.next().await?;
            if line.trim().is_empty() {
                if self.write("> ").await.is_err() {
                    return None;
                }
                continue;
            }
            return Some(parse_command(&line, stage, &mut self.draft));
        }
    }

    async fn toggle_details(&mut self) -> Result<(), SurfaceError> {
        self.details = !self.details;
        let text = match &self.last {
            Some(view) => render(view, self.details),
            None => format!("Details {}.\n> ", if self.details { "on" } else { "off" }),
        };
        self.write(&text).await
    }
}

/// Render a view as plain text, ending with a prompt.
///
/// With `details` off, structured result sections are listed by title only.
pub fn render(view: &View, details: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out);
    match (&view.project_id, &view.project_name) {
        (Some(id), Some(name)) => {
            let _ = writeln!(out, "== {name} ({id}) · {} ==", view.stage);
        }
        (Some(id), None) => {
            let _ = writeln!(out, "== Project {id} · {} ==", view.stage);
        }
        (None, _) => {
            let _ = writeln!(out, "== New project ==");
        }
    }

    match &view.body {
        ViewBody::Form { projects } => {
            let _ = writeln!(
                out,
                "Describe your project idea to start. /currency and /attach set up the brief first."
            );
            if !projects.is_empty() {
                let _ = writeln!(out, "\nYour projects (/open <id>):");
                for p in projects {
                    let _ = writeln!(
                        out,
                        "  {}  {}  [{}]",
                        p.project_session_id,
                        p.project_name.as_deref().unwrap_or("(unnamed)"),
                        p.status
                    );
                }
            }
        }
        ViewBody::Interview { history, can_chat } => {
            render_chat(&mut out, history);
            if *can_chat {
                let _ = writeln!(out, "\nAnswer the interviewer, or /restart to start over.");
            }
        }
        ViewBody::BriefReview { brief, history } => {
            render_chat(&mut out, history);
            let _ = writeln!(out, "\nCompiled brief:");
            match brief {
                Some(brief) => render_brief(&mut out, brief),
                None => {
                    let _ = writeln!(out, "  (not available)");
                }
            }
            let _ = writeln!(out, "\n/analyze to run the analysis, /restart to redo the interview.");
        }
        ViewBody::Working { label } => {
            let _ = writeln!(out, "... {label}");
        }
        ViewBody::AnalysisFailed { message } => {
            let _ = writeln!(out, "Analysis failed: {message}");
            let _ = writeln!(out, "/analyze to try again.");
        }
        ViewBody::Results(results) => render_results(&mut out, results, details),
    }

    if let Some(audit) = &view.audit {
        render_audit(&mut out, audit);
    }
    if let Some(error) = &view.error {
        let _ = writeln!(out, "\n! {error}");
    }
    out.push_str("> ");
    out
}

fn render_chat(out: &mut String, history: &[ChatTurn]) {
    for turn in history {
        let who = match turn.role {
            Role::User => "You",
            Role::Assistant => "Assistant",
        };
        let _ = writeln!(out, "{who}: {}", turn.content);
    }
}

fn render_brief(out: &mut String, brief: &CompiledBrief) {
    let fields = [
        ("Goal", &brief.goal),
        ("Location", &brief.location),
        ("Budget", &brief.budget),
        ("Currency", &brief.currency),
        ("Timeline", &brief.timeline),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            let _ = writeln!(out, "  {label}: {value}");
        }
    }
    for (key, value) in &brief.other {
        let _ = writeln!(out, "  {key}: {}", plain(value));
    }
}

fn render_results(out: &mut String, results: &ResultsView, details: bool) {
    let tabs: Vec<String> = results
        .versions
        .iter()
        .map(|v| {
            let mark = if v.version == results.selected { "*" } else { "" };
            let failed = if v.failed { " (failed)" } else { "" };
            format!("{mark}v{}{failed}", v.version)
        })
        .collect();
    let _ = writeln!(out, "Versions: {}", tabs.join("  "));

    let card = &results.card;
    if let Some(failure) = &card.failure {
        let _ = writeln!(out, "This version did not complete: {failure}");
    } else {
        if let Some(target) = &card.target_entity_name {
            let _ = writeln!(out, "Equity research: {target}");
        }
        let _ = writeln!(out, "Revenue ({}): {}", card.currency, card.revenue);
        let _ = writeln!(out, "Cost ({}):    {}", card.currency, card.cost);
        let _ = writeln!(out, "Profit/Loss ({}): {}", card.currency, card.profit_loss);
        let _ = writeln!(out, "\n{}", card.summary_text);
        if let Some(analyst) = &card.analyst_summary {
            let _ = writeln!(out, "\nAnalyst view: {analyst}");
        }
        let sections = card.analyst_sections.iter().chain(&card.sub_reports);
        if details {
            for (title, value) in sections {
                let _ = writeln!(out, "\n{title}:");
                let _ = writeln!(out, "{}", indented(&pretty(value)));
            }
        } else {
            for (title, _) in sections {
                let _ = writeln!(out, "  + {title}");
            }
        }
    }
    if !card.processing_log.is_empty() {
        let _ = writeln!(out, "\nProcessing log:");
        for line in &card.processing_log {
            let _ = writeln!(out, "  {line}");
        }
    }

    if let Some(raw) = &card.raw_llm_output {
        if details {
            let _ = writeln!(out, "\nRaw model output:\n{}", indented(raw));
        } else {
            let _ = writeln!(out, "  + Raw model output");
        }
    }
    let has_details = !card.analyst_sections.is_empty()
        || !card.sub_reports.is_empty()
        || card.raw_llm_output.is_some();
    if has_details && !details {
        let _ = writeln!(out, "(/details to expand)");
    }

    if !results.boardroom.is_empty() {
        let _ = writeln!(out, "\nBoardroom:");
        render_chat(out, &results.boardroom);
    }
    match &results.audit_blocked {
        None => {
            let _ = writeln!(out, "\nAsk a what-if question, /version <n>, or /audit.");
        }
        Some(reason) => {
            let _ = writeln!(out, "\nAsk a what-if question or /version <n>. Audit: {reason}");
        }
    }
}

fn render_audit(out: &mut String, audit: &AuditCard) {
    match audit {
        AuditCard::Report { version, report } => {
            let _ = writeln!(out, "\n-- Audit of version {version} --");
            match (report.audited_at(), &report.audit_timestamp) {
                (Some(at), _) => {
                    let _ = writeln!(out, "Audited: {}", at.format("%Y-%m-%d %H:%M UTC"));
                }
                (None, Some(raw)) => {
                    let _ = writeln!(out, "Audited: {raw}");
                }
                (None, None) => {}
            }
            let sections = [
                ("Summary", &report.overall_audit_summary),
                ("Logs", &report.log_review_summary),
                ("Data consistency", &report.data_consistency_summary),
                ("Compliance", &report.compliance_status_summary),
            ];
            for (label, text) in sections {
                if let Some(text) = text {
                    let _ = writeln!(out, "{label}: {text}");
                }
            }
            for item in &report.key_recommendations_or_concerns {
                let _ = writeln!(out, "  - {item}");
            }
            for line in report.auditor_log_lines() {
                let _ = writeln!(out, "  | {line}");
            }
        }
        AuditCard::Failed { version, message } => {
            let _ = writeln!(out, "\n-- Audit of version {version} failed: {message}");
        }
    }
    let _ = writeln!(out, "(/close to dismiss)");
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn indented(text: &str) -> String {
    text.lines()
        .map(|line| format!("    {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn plain(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
