//! Line commands typed at the terminal.

use std::path::PathBuf;

use crate::session::brief::{Attachment, BriefForm, Currency};
use crate::session::{Stage, UserAction};

/// What one input line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Hand an action to the controller and run a cycle.
    Action(UserAction),
    /// Show the user's projects without leaving the current one.
    Projects,
    /// Expand or collapse analyst report, sub-reports and raw model output.
    ToggleDetails,
    Help,
    Quit,
    /// Local feedback only; nothing goes to the controller.
    Notice(String),
}

pub const HELP: &str = "\
Commands:
  /new              start a new project
  /projects         list your projects
  /open <id>        open an existing project
  /refresh          reload the current project
  /currency <code>  set the brief currency (USD, PKR, AED, SAR, EUR)
  /attach <path>    attach a png, jpg, pdf or txt file to the brief
  /detach           remove all attachments from the brief
  /restart          restart the interview
  /analyze          proceed to analysis, or retry a failed one
  /version <n>      show analysis version n
  /details          expand or collapse the full analyst report
  /audit            audit the selected analysis version
  /close            close the audit report
  /quit             exit
On the brief form, plain text submits the project idea summary.
Everywhere else, plain text is sent as a chat message.";

/// Parse one line. Form-only commands edit `draft` in place.
pub fn parse_command(line: &str, stage: Stage, draft: &mut BriefForm) -> Command {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return plain_text(line, stage, draft);
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    match name.to_ascii_lowercase().as_str() {
        "quit" | "exit" => Command::Quit,
        "help" => Command::Help,
        "new" => Command::Action(UserAction::StartNewProject),
        "projects" => Command::Projects,
        "refresh" => Command::Action(UserAction::Refresh),
        "open" if arg.is_empty() => Command::Notice("Usage: /open <project id>".into()),
        "open" => Command::Action(UserAction::OpenProject(arg.to_string())),
        "restart" => Command::Action(UserAction::RestartInterview),
        "analyze" | "analyse" => Command::Action(UserAction::ProceedToAnalysis),
        "audit" => Command::Action(UserAction::RequestAudit),
        "details" => Command::ToggleDetails,
        "close" => Command::Action(UserAction::DismissAudit),
        "version" => match arg.parse::<u32>() {
            Ok(n) => Command::Action(UserAction::SelectVersion(n)),
            Err(_) => Command::Notice("Usage: /version <number>".into()),
        },
        "currency" | "attach" | "detach" if stage != Stage::Form => {
            Command::Notice(format!("/{name} only applies to the brief form. Use /new first."))
        }
        "currency" => match arg.parse::<Currency>() {
            Ok(currency) => {
                draft.currency = currency;
                Command::Notice(format!("Currency set to {currency}."))
            }
            Err(e) => Command::Notice(e.to_string()),
        },
        "attach" if arg.is_empty() => Command::Notice("Usage: /attach <path>".into()),
        "attach" => {
            let path = PathBuf::from(arg);
            match Attachment::check(&path) {
                Ok(_) => {
                    draft.attachments.push(path);
                    Command::Notice(format!("{} file(s) attached.", draft.attachments.len()))
                }
                Err(e) => Command::Notice(e.to_string()),
            }
        }
        "detach" => {
            draft.attachments.clear();
            Command::Notice("Attachments removed.".into())
        }
        _ => Command::Notice(format!("Unknown command /{name}. Type /help for the list.")),
    }
}

fn plain_text(line: &str, stage: Stage, draft: &mut BriefForm) -> Command {
    if stage == Stage::Form {
        draft.summary = line.to_string();
        return Command::Action(UserAction::SubmitBrief(draft.clone()));
    }
    Command::Action(UserAction::SendChat(line.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str, stage: Stage) -> Command {
        parse_command(line, stage, &mut BriefForm::default())
    }

    #[test]
    fn plain_text_on_form_submits_draft() {
        let mut draft = BriefForm::default();
        assert!(matches!(
            parse_command("/currency pkr", Stage::Form, &mut draft),
            Command::Notice(_)
        ));
        assert!(matches!(
            parse_command("/attach plan.pdf", Stage::Form, &mut draft),
            Command::Notice(_)
        ));

        let cmd = parse_command("  A cafe in Lahore ", Stage::Form, &mut draft);
        let Command::Action(UserAction::SubmitBrief(form)) = cmd else {
            panic!("expected brief submission, got {cmd:?}");
        };
        assert_eq!(form.summary, "A cafe in Lahore");
        assert_eq!(form.currency, Currency::Pkr);
        assert_eq!(form.attachments, vec![PathBuf::from("plan.pdf")]);
    }

    #[test]
    fn plain_text_elsewhere_is_chat() {
        assert_eq!(
            parse("What if rent doubles?", Stage::AnalysisComplete),
            Command::Action(UserAction::SendChat("What if rent doubles?".into()))
        );
    }

    #[test]
    fn attach_rejects_unsupported_types() {
        let mut draft = BriefForm::default();
        let cmd = parse_command("/attach notes.docx", Stage::Form, &mut draft);
        assert!(matches!(cmd, Command::Notice(msg) if msg.contains("notes.docx")));
        assert!(draft.attachments.is_empty());
    }

    #[test]
    fn form_commands_only_on_form() {
        let mut draft = BriefForm::default();
        let cmd = parse_command("/currency EUR", Stage::InterviewInProgress, &mut draft);
        assert!(matches!(cmd, Command::Notice(_)));
        assert_eq!(draft.currency, Currency::Usd);
    }

    #[test]
    fn unknown_currency_is_reported() {
        assert_eq!(
            parse("/currency GBP", Stage::Form),
            Command::Notice("Unknown currency GBP.".into())
        );
    }

    #[test]
    fn navigation_commands() {
        assert_eq!(parse("/quit", Stage::Form), Command::Quit);
        assert_eq!(parse("/projects", Stage::Form), Command::Projects);
        assert_eq!(parse("/details", Stage::AnalysisComplete), Command::ToggleDetails);
        assert_eq!(
            parse("/open proj-7", Stage::Form),
            Command::Action(UserAction::OpenProject("proj-7".into()))
        );
        assert_eq!(
            parse("/version 3", Stage::AnalysisComplete),
            Command::Action(UserAction::SelectVersion(3))
        );
        assert!(matches!(parse("/version x", Stage::AnalysisComplete), Command::Notice(_)));
        assert_eq!(
            parse("/ANALYZE", Stage::InterviewComplete),
            Command::Action(UserAction::ProceedToAnalysis)
        );
        assert!(matches!(parse("/bogus", Stage::Form), Command::Notice(m) if m.contains("/bogus")));
    }
}
