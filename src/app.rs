//! The app loop: surface command → controller → view, one cycle at a time.

use crate::error::Result;
use crate::session::SessionController;
use crate::session::snapshot::ProjectSummary;
use crate::surface::{Command, HELP, RenderSurface};

pub struct App<S> {
    controller: SessionController,
    surface: S,
}

impl<S: RenderSurface> App<S> {
    pub fn new(controller: SessionController, surface: S) -> Self {
        Self {
            controller,
            surface,
        }
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    /// Run until the user quits or input closes.
    pub async fn run(&mut self) -> Result<()> {
        let view = self.controller.cycle().await;
        self.surface.present(&view).await?;

        loop {
            let stage = self.controller.state().stage;
            let Some(command) = self.surface.next_command(stage).await else {
                tracing::info!("Input closed");
                break;
            };

            match command {
                Command::Quit => break,
                Command::Help => self.surface.notice(HELP).await?,
                Command::ToggleDetails => self.surface.toggle_details().await?,
                Command::Notice(message) => self.surface.notice(&message).await?,
                Command::Projects => {
                    self.controller.refresh_projects().await;
                    let listing = project_listing(self.controller.projects());
                    self.surface.notice(&listing).await?;
                }
                Command::Action(action) => {
                    // A rejection comes back as the error of the next view.
                    let _ = self.controller.handle(action).await;
                    if let Some(busy) = self.controller.busy_view() {
                        self.surface.present(&busy).await?;
                    }
                    let view = self.controller.cycle().await;
                    self.surface.present(&view).await?;
                }
            }
        }
        Ok(())
    }
}

fn project_listing(projects: &[ProjectSummary]) -> String {
    if projects.is_empty() {
        return "You have no projects yet.".to_string();
    }
    let mut lines = vec!["Your projects (/open <id>):".to_string()];
    lines.extend(projects.iter().map(|p| {
        format!(
            "  {}  {}  [{}]",
            p.project_session_id,
            p.project_name.as_deref().unwrap_or("(unnamed)"),
            p.status
        )
    }));
    lines.join("\n")
}
