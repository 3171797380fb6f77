pub mod aligner;
pub mod circuit_breaker;
pub mod engine;
pub mod error;
pub mod margin;
pub mod models;
pub mod report;
pub mod state;
pub mod tear_sheet;


pub use aligner::{align, AlignedMatrix, DEFAULT_ACCOUNT_EQUITY};
pub use circuit_breaker::DrawdownGuard;
pub use engine::{monthly_returns, WalkForwardEngine};
pub use error::{EngineError, Result};
pub use models::*;
pub use report::{base_name, ReportWriter, RunArtifacts, RunRecord};
pub use state::PortfolioState;
pub use tear_sheet::{generate_tear_sheet, render_tear_sheet_html};
