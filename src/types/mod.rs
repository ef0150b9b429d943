pub mod refresh;

pub use refresh::{RefreshReport, RefreshStatus, RefreshSummary};
