//! Controllers behind each panel of the terminal: command execution, service restart,
//! addon upload and environment details.

mod command;
mod env;
mod in_flight;
mod restart;
mod upload;

pub use command::{CommandSession, Direction, ExecuteOutcome};
pub use env::EnvironmentPanel;
pub use restart::{RestartNegotiator, RestartState};
pub use upload::{UploadOutcome, UploadPipeline};
