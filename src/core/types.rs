use serde::Serialize;

/// Starting conditions and growth assumptions for one projection run.
///
/// Rates are annual percentages (12 means 12%/year). `start_date` is an ISO
/// date string; anything unparsable falls back to the current date.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationConfig {
    pub current_net_worth: f64,
    pub monthly_income: f64,
    pub monthly_expense: f64,
    pub monthly_investment: f64,
    pub investment_return: f64,
    pub inflation_rate: f64,
    pub years_to_simulate: u32,
    pub target_passive_income: f64,
    pub start_date: String,
}

impl SimulationConfig {
    /// Boundary coercion: non-finite numerics become 0 and the horizon is
    /// at least one year. The engine itself assumes an already-normalized
    /// config.
    pub fn normalized(mut self) -> Self {
        for value in [
            &mut self.current_net_worth,
            &mut self.monthly_income,
            &mut self.monthly_expense,
            &mut self.monthly_investment,
            &mut self.investment_return,
            &mut self.inflation_rate,
            &mut self.target_passive_income,
        ] {
            if !value.is_finite() {
                *value = 0.0;
            }
        }
        self.years_to_simulate = self.years_to_simulate.max(1);
        self
    }
}

/// One projected month. `net_worth`, `passive_income` and `monthly_expense`
/// are rounded to whole rupiah on emission; `fire_progress` and `gap` keep
/// the unrounded operands.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationPoint {
    pub month: u32,
    pub year: String,
    pub month_label: String,
    pub net_worth: f64,
    pub passive_income: f64,
    pub monthly_expense: f64,
    pub fire_progress: f64,
    pub gap: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSummary {
    pub final_point: SimulationPoint,
    /// First month index with `fire_progress >= 100`; `None` when the goal
    /// is never reached within the horizon.
    pub fire_achievement_month: Option<u32>,
    pub total_invested: f64,
    pub net_worth_growth_percent: f64,
}
