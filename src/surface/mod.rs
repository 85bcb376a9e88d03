//! Render surfaces: draw a [`View`] and produce the next command.

pub mod command;
pub mod terminal;

use async_trait::async_trait;

pub use command::{Command, HELP, parse_command};
pub use terminal::TerminalSurface;

use crate::error::SurfaceError;
use crate::session::{Stage, View};

/// Anything that can show views and collect user input.
///
/// The app loop calls [`present`](Self::present) after every cycle and
/// before every blocking call, then waits on [`next_command`](Self::next_command).
#[async_trait]
pub trait RenderSurface: Send {
    /// Draw a full view, replacing whatever was shown before.
    async fn present(&mut self, view: &View) -> Result<(), SurfaceError>;

    /// Show a short message without redrawing the view.
    async fn notice(&mut self, message: &str) -> Result<(), SurfaceError>;

    /// Wait for the next command. `None` when input is closed.
    async fn next_command(&mut self, stage: Stage) -> Option<Command>;

    /// Expand or collapse structured result details. Surfaces that always
    /// show everything ignore it.
    async fn toggle_details(&mut self) -> Result<(), SurfaceError> {
        Ok(())
    }
}
