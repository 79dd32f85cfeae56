use chrono::{Datelike, Months, NaiveDate, Utc};

// id-ID short month names, as the dashboard renders them.
const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "Mei", "Jun", "Jul", "Agu", "Sep", "Okt", "Nov", "Des",
];

/// Parses an ISO `yyyy-mm-dd` start date, falling back to today.
pub fn resolve_start_date(raw: &str) -> NaiveDate {
    raw.parse::<NaiveDate>()
        .unwrap_or_else(|_| Utc::now().date_naive())
}

/// Steps `date` forward by whole months, clamping to the end of shorter
/// target months.
pub fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months)).unwrap_or(date)
}

/// Chart x-axis label: short month plus two-digit year, e.g. "Agu 25".
pub fn month_label(date: NaiveDate) -> String {
    let name = MONTH_NAMES[date.month0() as usize];
    format!("{} {:02}", name, date.year().rem_euclid(100))
}

/// Chart x-axis label in years, one decimal place.
pub fn year_label(month: u32) -> String {
    format!("{:.1}", f64::from(month) / 12.0)
}
