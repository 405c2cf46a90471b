//! Due-date arithmetic and projection for recurring templates.
//!
//! Every step strictly advances the date, so walking a template forward over
//! a bounded window always terminates. Times of day are preserved.

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc, Weekday};
use serde::Serialize;
use uuid::Uuid;

use super::{Frequency, FrequencyData, RecurringTransaction};
use crate::{EngineError, Money, ResultEngine, TransactionKind};

/// Inclusive date range `[start, end]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> ResultEngine<Self> {
        if end < start {
            return Err(EngineError::Validation(
                "window end must not be before its start".to_string(),
            ));
        }
        Ok(Self { start, end })
    }

    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

/// A future occurrence of a template. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProjectedOccurrence {
    pub recurring_id: Uuid,
    pub due_date: DateTime<Utc>,
    pub kind: TransactionKind,
    pub account_id: Uuid,
    pub amount: Money,
    pub description: Option<String>,
    /// Sum of the amounts projected so far, this one included.
    pub running_total: Money,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Projection {
    pub occurrences: Vec<ProjectedOccurrence>,
    pub total_amount: Money,
}

fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = first.checked_add_months(chrono::Months::new(1))?;
    u32::try_from(next.signed_duration_since(first).num_days()).ok()
}

/// `(year, month)` shifted forward by `months`.
fn shift_month(year: i32, month: u32, months: u32) -> Option<(i32, u32)> {
    let index = i64::from(year) * 12 + i64::from(month) - 1 + i64::from(months);
    let year = i32::try_from(index.div_euclid(12)).ok()?;
    let month = u32::try_from(index.rem_euclid(12)).ok()? + 1;
    Some((year, month))
}

fn at_time_of(base: DateTime<Utc>, date: NaiveDate) -> DateTime<Utc> {
    date.and_time(base.time()).and_utc()
}

fn add_days(base: DateTime<Utc>, days: u64) -> Option<DateTime<Utc>> {
    base.checked_add_days(Days::new(days))
}

/// Adds calendar months, landing on `anchor_day` or the last day of a
/// shorter month. Anchoring on the template's start day avoids drifting from
/// the 31st to the 28th after one short month.
fn add_months_anchored(base: DateTime<Utc>, months: u32, anchor_day: u32) -> Option<DateTime<Utc>> {
    let (year, month) = shift_month(base.year(), base.month(), months)?;
    let day = anchor_day.min(days_in_month(year, month)?);
    Some(at_time_of(base, NaiveDate::from_ymd_opt(year, month, day)?))
}

fn weekday_from_sunday(day_of_week: u32) -> Option<Weekday> {
    match day_of_week {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}

fn last_weekday_of_month(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let last = NaiveDate::from_ymd_opt(year, month, days_in_month(year, month)?)?;
    let back = (last.weekday().num_days_from_sunday() + 7 - weekday.num_days_from_sunday()) % 7;
    last.checked_sub_days(Days::new(u64::from(back)))
}

/// The Nth `weekday` of next month. A fifth occurrence that does not exist
/// falls back to the last one.
fn nth_weekday_of_next_month(base: DateTime<Utc>, weekday: Weekday, week: u8) -> Option<DateTime<Utc>> {
    let (year, month) = shift_month(base.year(), base.month(), 1)?;
    let date = NaiveDate::from_weekday_of_month_opt(year, month, weekday, week)
        .or_else(|| last_weekday_of_month(year, month, weekday))?;
    Some(at_time_of(base, date))
}

fn last_weekday_of_next_month(base: DateTime<Utc>, weekday: Weekday) -> Option<DateTime<Utc>> {
    let (year, month) = shift_month(base.year(), base.month(), 1)?;
    Some(at_time_of(base, last_weekday_of_month(year, month, weekday)?))
}

/// First listed day after the current one in this month, else the first
/// listed day of next month (clamped to its length).
fn next_specific_date(base: DateTime<Utc>, dates: &[u32]) -> Option<DateTime<Utc>> {
    let mut days: Vec<u32> = dates.iter().copied().filter(|d| (1..=31).contains(d)).collect();
    days.sort_unstable();
    days.dedup();
    let first = *days.first()?;

    let current_len = days_in_month(base.year(), base.month())?;
    if let Some(day) = days
        .iter()
        .copied()
        .find(|&d| d > base.day() && d <= current_len)
    {
        return Some(at_time_of(
            base,
            NaiveDate::from_ymd_opt(base.year(), base.month(), day)?,
        ));
    }

    let (year, month) = shift_month(base.year(), base.month(), 1)?;
    let day = first.min(days_in_month(year, month)?);
    Some(at_time_of(base, NaiveDate::from_ymd_opt(year, month, day)?))
}

fn next_custom(base: DateTime<Utc>, interval: u32, data: Option<&FrequencyData>) -> Option<DateTime<Utc>> {
    let fallback = || add_days(base, u64::from(interval));
    let Some(data) = data else {
        return fallback();
    };

    if let (Some(day_of_week), Some(week)) = (data.day_of_week, data.week_of_month) {
        let Some(weekday) = weekday_from_sunday(day_of_week) else {
            return fallback();
        };
        return match week {
            -1 => last_weekday_of_next_month(base, weekday),
            1..=5 => nth_weekday_of_next_month(base, weekday, u8::try_from(week).ok()?),
            _ => fallback(),
        };
    }
    if !data.specific_dates.is_empty() {
        return next_specific_date(base, &data.specific_dates);
    }
    fallback()
}

impl RecurringTransaction {
    /// The occurrence that follows `base` under this template's schedule.
    ///
    /// Returns `None` only when the result leaves chrono's date range.
    #[must_use]
    pub fn next_occurrence_after(&self, base: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let interval = self.interval.max(1);
        let anchor_day = self.start_date.day();
        match self.frequency {
            Frequency::Daily => add_days(base, u64::from(interval)),
            Frequency::Weekly => add_days(base, u64::from(interval) * 7),
            Frequency::Biweekly => add_days(base, u64::from(interval) * 14),
            Frequency::Monthly => add_months_anchored(base, interval, anchor_day),
            Frequency::Yearly => add_months_anchored(base, interval.checked_mul(12)?, anchor_day),
            Frequency::Custom => next_custom(base, interval, self.frequency_data.as_ref()),
        }
    }

    /// Base date for the next step: the last generated occurrence, else the
    /// current due date.
    #[must_use]
    pub fn schedule_base(&self) -> DateTime<Utc> {
        self.last_generated_date.unwrap_or(self.next_due_date)
    }
}

/// Next due date of a template, stepping from its last generated date (or
/// its current due date when nothing was generated yet).
pub fn compute_next_due_date(template: &RecurringTransaction) -> ResultEngine<DateTime<Utc>> {
    template
        .next_occurrence_after(template.schedule_base())
        .ok_or_else(|| EngineError::Validation("next due date is out of range".to_string()))
}

/// Projects the template's upcoming occurrences that fall inside `window`.
///
/// Walks forward from `next_due_date`, honoring `end_date` and the remaining
/// `max_occurrences`. Paused and exhausted templates project nothing. Dates
/// are strictly increasing.
///
/// Fails with `InvalidAmount` when the window total leaves the decimal range.
pub fn project_instances(
    template: &RecurringTransaction,
    window: &DateWindow,
) -> ResultEngine<Projection> {
    let mut projection = Projection::default();
    if template.paused || template.is_exhausted() {
        return Ok(projection);
    }

    let mut remaining = template
        .max_occurrences
        .map(|max| max.saturating_sub(template.occurrences_count));
    let mut current = template.next_due_date;

    while current <= window.end
        && template.end_date.is_none_or(|end| current <= end)
        && remaining.is_none_or(|left| left > 0)
    {
        if current >= window.start {
            projection.total_amount = projection
                .total_amount
                .checked_add(template.amount)
                .ok_or_else(|| {
                    EngineError::InvalidAmount("projected total is out of range".to_string())
                })?;
            projection.occurrences.push(ProjectedOccurrence {
                recurring_id: template.id,
                due_date: current,
                kind: template.kind,
                account_id: template.account_id,
                amount: template.amount,
                description: template.description.clone(),
                running_total: projection.total_amount,
            });
        }
        remaining = remaining.map(|left| left - 1);

        match template.next_occurrence_after(current) {
            Some(next) if next > current => current = next,
            _ => break,
        }
    }

    Ok(projection)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::super::tests::template;
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 8, 30, 0).unwrap()
    }

    fn custom(start: DateTime<Utc>, data: FrequencyData) -> RecurringTransaction {
        let mut t = template(Frequency::Custom, start);
        t.frequency_data = Some(data);
        t
    }

    #[test]
    fn simple_frequencies() {
        let start = date(2024, 1, 15);
        let next = |frequency, interval| {
            let mut t = template(frequency, start);
            t.interval = interval;
            compute_next_due_date(&t).unwrap()
        };

        assert_eq!(next(Frequency::Monthly, 1), date(2024, 2, 15));
        assert_eq!(next(Frequency::Daily, 3), date(2024, 1, 18));
        assert_eq!(next(Frequency::Weekly, 2), date(2024, 1, 29));
        assert_eq!(next(Frequency::Biweekly, 1), date(2024, 1, 29));
        assert_eq!(next(Frequency::Yearly, 1), date(2025, 1, 15));
        assert_eq!(next(Frequency::Monthly, 12), date(2025, 1, 15));
    }

    #[test]
    fn base_is_last_generated_date() {
        let mut t = template(Frequency::Daily, date(2024, 1, 1));
        t.next_due_date = date(2024, 1, 10);
        t.last_generated_date = Some(date(2024, 1, 5));
        assert_eq!(compute_next_due_date(&t).unwrap(), date(2024, 1, 6));
    }

    #[test]
    fn month_end_clamps_without_drift() {
        let start = date(2024, 1, 31);
        let t = template(Frequency::Monthly, start);

        let feb = t.next_occurrence_after(start).unwrap();
        assert_eq!(feb, date(2024, 2, 29));
        assert_eq!(t.next_occurrence_after(feb).unwrap(), date(2024, 3, 31));

        let leap = template(Frequency::Yearly, date(2024, 2, 29));
        assert_eq!(
            leap.next_occurrence_after(date(2024, 2, 29)).unwrap(),
            date(2025, 2, 28)
        );
    }

    #[test]
    fn nth_weekday_of_next_month() {
        // First Monday of February 2024 is the 5th.
        let t = custom(date(2024, 1, 10), FrequencyData::nth_weekday(1, 1));
        assert_eq!(compute_next_due_date(&t).unwrap(), date(2024, 2, 5));

        // Third Friday of March 2024.
        let t = custom(date(2024, 2, 20), FrequencyData::nth_weekday(5, 3));
        assert_eq!(compute_next_due_date(&t).unwrap(), date(2024, 3, 15));

        // February 2024 has four Mondays; the fifth falls back to the last.
        let t = custom(date(2024, 1, 10), FrequencyData::nth_weekday(1, 5));
        assert_eq!(compute_next_due_date(&t).unwrap(), date(2024, 2, 26));
    }

    #[test]
    fn last_weekday_of_next_month() {
        // Last Sunday of February 2024 is the 25th.
        let t = custom(date(2024, 1, 31), FrequencyData::nth_weekday(0, -1));
        assert_eq!(compute_next_due_date(&t).unwrap(), date(2024, 2, 25));

        // Last Thursday of February 2024 is the 29th (the last day itself).
        let t = custom(date(2024, 1, 31), FrequencyData::nth_weekday(4, -1));
        assert_eq!(compute_next_due_date(&t).unwrap(), date(2024, 2, 29));
    }

    #[test]
    fn specific_dates() {
        let data = FrequencyData::specific_dates([15, 1]);
        assert_eq!(
            compute_next_due_date(&custom(date(2024, 1, 10), data.clone())).unwrap(),
            date(2024, 1, 15)
        );
        assert_eq!(
            compute_next_due_date(&custom(date(2024, 1, 20), data)).unwrap(),
            date(2024, 2, 1)
        );

        // The 31st is skipped in February and clamped when it is the only day.
        let data = FrequencyData::specific_dates([31]);
        assert_eq!(
            compute_next_due_date(&custom(date(2024, 1, 31), data)).unwrap(),
            date(2024, 2, 29)
        );
    }

    #[test]
    fn unusable_custom_data_falls_back_to_interval_days() {
        let mut t = template(Frequency::Custom, date(2024, 1, 10));
        t.interval = 4;
        assert_eq!(compute_next_due_date(&t).unwrap(), date(2024, 1, 14));

        t.frequency_data = Some(FrequencyData::nth_weekday(1, 0));
        assert_eq!(compute_next_due_date(&t).unwrap(), date(2024, 1, 14));
    }

    #[test]
    fn projection_stays_in_window_and_increases() {
        let t = custom(date(2024, 1, 1), FrequencyData::specific_dates([1, 15]));
        let window = DateWindow::new(date(2024, 1, 10), date(2024, 4, 1)).unwrap();

        let projection = project_instances(&t, &window).unwrap();
        let dates: Vec<_> = projection.occurrences.iter().map(|o| o.due_date).collect();
        assert_eq!(
            dates,
            vec![
                date(2024, 1, 15),
                date(2024, 2, 1),
                date(2024, 2, 15),
                date(2024, 3, 1),
                date(2024, 3, 15),
                date(2024, 4, 1),
            ]
        );
        assert!(dates.iter().all(|d| window.contains(*d)));
        assert!(dates.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(projection.total_amount, Money::from(600));
        assert_eq!(projection.occurrences[2].running_total, Money::from(300));
    }

    #[test]
    fn projection_honors_limits() {
        let mut t = template(Frequency::Weekly, date(2024, 1, 1));
        t.max_occurrences = Some(5);
        t.occurrences_count = 2;
        let window = DateWindow::new(date(2024, 1, 1), date(2024, 12, 31)).unwrap();
        assert_eq!(project_instances(&t, &window).unwrap().occurrences.len(), 3);

        let mut t = template(Frequency::Daily, date(2024, 1, 1));
        t.end_date = Some(date(2024, 1, 3));
        assert_eq!(project_instances(&t, &window).unwrap().occurrences.len(), 3);

        let mut t = template(Frequency::Daily, date(2024, 1, 1));
        t.paused = true;
        assert!(project_instances(&t, &window).unwrap().occurrences.is_empty());
    }

    #[test]
    fn projection_total_out_of_range_is_an_error() {
        let mut t = template(Frequency::Daily, date(2024, 1, 1));
        t.amount = "40000000000000000000000000000".parse().unwrap();
        let window = DateWindow::new(date(2024, 1, 1), date(2024, 1, 3)).unwrap();
        assert!(matches!(
            project_instances(&t, &window),
            Err(EngineError::InvalidAmount(_))
        ));
    }

    #[test]
    fn window_rejects_inverted_range() {
        assert!(DateWindow::new(date(2024, 2, 1), date(2024, 1, 1)).is_err());
    }
}
