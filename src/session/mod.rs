//! Session view controller: client state, stages, and the views derived
//! from the project service's snapshots.

pub mod action;
pub mod analysis;
pub mod brief;
pub mod controller;
pub mod snapshot;
pub mod stage;
pub mod state;
pub mod view;

pub use action::UserAction;
pub use analysis::{AnalysisKind, AnalysisResult};
pub use brief::{BriefForm, BriefSubmission, Currency};
pub use controller::SessionController;
pub use snapshot::{AuditReport, ChatTurn, ProjectSnapshot, ProjectSummary, Role};
pub use stage::Stage;
pub use state::{PendingAction, SessionState};
pub use view::{View, ViewBody};
