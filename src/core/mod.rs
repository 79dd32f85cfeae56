mod engine;
mod schedule;
mod types;

pub use engine::{EngineError, project, summarize};
pub use schedule::{add_months, month_label, resolve_start_date, year_label};
pub use types::{SimulationConfig, SimulationPoint, SimulationSummary};
