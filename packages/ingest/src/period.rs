//! Resolution of the `[year] [month]` arguments into a [`Period`].
//!
//! The current date is read through the [`Clock`] trait so resolution is
//! deterministic under test.

use chrono::NaiveDate;
use fdroid_metrics_models::Period;

use crate::FetchError;

/// Source of the current date.
pub trait Clock: Send + Sync {
    /// Today's date (UTC).
    fn today(&self) -> NaiveDate;
}

/// Reads the system clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        chrono::Utc::now().date_naive()
    }
}

/// Always answers the same date.
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Resolves optional `year` and `month` arguments.
///
/// * neither given: the clock's current month;
/// * both given: a 4-digit year and a month in `1..=12`, not later than
///   the clock's current month;
/// * only one given: rejected, since a year without a month is ambiguous.
///
/// # Errors
///
/// Returns [`FetchError::InvalidArguments`] when exactly one argument is
/// given and [`FetchError::InvalidPeriod`] when the values are out of
/// range or in the future.
pub fn resolve_period(
    year: Option<&str>,
    month: Option<&str>,
    clock: &dyn Clock,
) -> Result<Period, FetchError> {
    let current = Period::from_date(clock.today());

    let (year, month) = match (year, month) {
        (None, None) => return Ok(current),
        (Some(year), Some(month)) => (year.trim(), month.trim()),
        _ => {
            return Err(FetchError::InvalidArguments(
                "year and month must be given together".to_string(),
            ));
        }
    };

    let year = parse_year(year)?;
    let month: u32 = month.parse().map_err(|_| {
        FetchError::InvalidPeriod(format!("month must be a number, got '{month}'"))
    })?;

    let period = Period::new(year, month).ok_or_else(|| {
        FetchError::InvalidPeriod(format!("month must be between 1 and 12, got {month}"))
    })?;

    if period > current {
        return Err(FetchError::InvalidPeriod(format!(
            "{period} is in the future (current month is {current})"
        )));
    }

    Ok(period)
}

fn parse_year(year: &str) -> Result<i32, FetchError> {
    let invalid = || FetchError::InvalidPeriod(format!("year must be 4 digits, got '{year}'"));

    if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let year: i32 = year.parse().map_err(|_| invalid())?;
    if year < 1000 {
        return Err(invalid());
    }
    Ok(year)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock() -> FixedClock {
        FixedClock(NaiveDate::from_ymd_opt(2025, 3, 14).unwrap())
    }

    #[test]
    fn defaults_to_current_month() {
        let period = resolve_period(None, None, &clock()).unwrap();
        assert_eq!(period, Period::new(2025, 3).unwrap());
    }

    #[test]
    fn valid_pairs_resolve_to_themselves() {
        for (year, month) in [(2020, 1), (2024, 12), (2025, 2), (2025, 3)] {
            let period =
                resolve_period(Some(&year.to_string()), Some(&month.to_string()), &clock())
                    .unwrap();
            assert_eq!(period, Period::new(year, month).unwrap());
        }
    }

    #[test]
    fn accepts_zero_padded_month() {
        let period = resolve_period(Some("2024"), Some("07"), &clock()).unwrap();
        assert_eq!(period, Period::new(2024, 7).unwrap());
    }

    #[test]
    fn out_of_range_months_are_invalid_periods() {
        for month in ["0", "13"] {
            let err = resolve_period(Some("2024"), Some(month), &clock()).unwrap_err();
            assert!(matches!(err, FetchError::InvalidPeriod(_)), "{month}: {err}");
        }
    }

    #[test]
    fn future_months_are_invalid_periods() {
        let err = resolve_period(Some("2025"), Some("4"), &clock()).unwrap_err();
        assert!(matches!(err, FetchError::InvalidPeriod(_)));

        let err = resolve_period(Some("2026"), Some("1"), &clock()).unwrap_err();
        assert!(matches!(err, FetchError::InvalidPeriod(_)));
    }

    #[test]
    fn malformed_years_are_invalid_periods() {
        for year in ["24", "20245", "abcd", "-202", "0999"] {
            let err = resolve_period(Some(year), Some("1"), &clock()).unwrap_err();
            assert!(matches!(err, FetchError::InvalidPeriod(_)), "{year}: {err}");
        }
    }

    #[test]
    fn non_numeric_month_is_invalid_period() {
        let err = resolve_period(Some("2024"), Some("dec"), &clock()).unwrap_err();
        assert!(matches!(err, FetchError::InvalidPeriod(_)));
    }

    #[test]
    fn a_single_argument_is_rejected() {
        let err = resolve_period(Some("2024"), None, &clock()).unwrap_err();
        assert!(matches!(err, FetchError::InvalidArguments(_)));

        let err = resolve_period(None, Some("5"), &clock()).unwrap_err();
        assert!(matches!(err, FetchError::InvalidArguments(_)));
    }
}
