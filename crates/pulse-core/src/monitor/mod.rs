pub mod checks;
pub mod engine;
pub mod ledger;
pub mod scoring;

pub use checks::{Check, CheckFinding, HealthCounter};
pub use engine::{Monitor, MonitorState};
pub use ledger::{ErrorType, StreamError};
pub use scoring::RecentIssues;
