use thiserror::Error;

use super::schedule::{add_months, month_label, resolve_start_date, year_label};
use super::types::{SimulationConfig, SimulationPoint, SimulationSummary};

// 4%-rule: annual safe withdrawal is 4% of net worth, reported monthly.
const SAFE_WITHDRAWAL_RATE: f64 = 0.04;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("cannot summarize an empty projection")]
    EmptySequence,
}

/// Projects net worth month by month over the configured horizon.
///
/// Emits `max(1, years) * 12 + 1` points with contiguous month indices.
/// Each month applies the contribution and that month's growth before the
/// point is emitted, so month 0 already includes one full cycle. Expenses
/// are inflated once per completed year, at the start of months 12, 24, …
/// Pure: identical configs produce identical sequences.
pub fn project(config: &SimulationConfig) -> Vec<SimulationPoint> {
    let total_months = config.years_to_simulate.max(1).saturating_mul(12);
    let start_date = resolve_start_date(&config.start_date);
    let monthly_return = config.investment_return / 100.0 / 12.0;

    let mut points = Vec::with_capacity(total_months as usize + 1);
    let mut net_worth = config.current_net_worth;
    let mut expense = config.monthly_expense;

    for month in 0..=total_months {
        let point_date = add_months(start_date, month);
        if month > 0 && month % 12 == 0 {
            expense *= 1.0 + config.inflation_rate / 100.0;
        }

        let growth = net_worth * monthly_return;
        net_worth += config.monthly_investment + growth;

        let passive_income = net_worth * SAFE_WITHDRAWAL_RATE / 12.0;
        // Progress is measured against the configured expense; the inflated
        // running expense only feeds the gap.
        let raw_progress = if config.monthly_expense > 0.0 {
            passive_income / config.monthly_expense * 100.0
        } else {
            0.0
        };

        points.push(SimulationPoint {
            month,
            year: year_label(month),
            month_label: month_label(point_date),
            net_worth: net_worth.round(),
            passive_income: passive_income.round(),
            monthly_expense: expense.round(),
            // Clamped above only; the raw ratio follows net worth below zero.
            fire_progress: raw_progress.min(100.0),
            gap: (expense - passive_income).max(0.0),
        });
    }

    points
}

/// Derives the headline metrics from a full projection.
pub fn summarize(
    points: &[SimulationPoint],
    config: &SimulationConfig,
) -> Result<SimulationSummary, EngineError> {
    let final_point = points.last().ok_or(EngineError::EmptySequence)?.clone();

    let fire_achievement_month = points
        .iter()
        .find(|p| p.fire_progress >= 100.0)
        .map(|p| p.month);

    let total_invested =
        config.monthly_investment * f64::from(config.years_to_simulate.max(1)) * 12.0;

    let net_worth_growth_percent = if config.current_net_worth > 0.0 {
        (final_point.net_worth - config.current_net_worth) / config.current_net_worth * 100.0
    } else {
        0.0
    };

    Ok(SimulationSummary {
        final_point,
        fire_achievement_month,
        total_invested,
        net_worth_growth_percent,
    })
}
