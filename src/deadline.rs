use crate::models::{DeadlineStatus, GlobalParams};
use chrono::{Days, NaiveDate};

/// Grace applied when the sheet leaves the tolerance at zero or unset.
pub const FALLBACK_TOLERANCE_DAYS: u32 = 2;

/// Zero means "not configured" on the parameters tab.
pub fn effective_tolerance(tolerance_days: u32) -> u32 {
    if tolerance_days == 0 {
        FALLBACK_TOLERANCE_DAYS
    } else {
        tolerance_days
    }
}

/// Classifies a limit date against the business calendar.
///
/// First match wins: critical, overdue, due today, due tomorrow, on time.
/// Today and tomorrow are exact calendar-day matches.
pub fn classify(
    limit_date: Option<NaiveDate>,
    reference_today: NaiveDate,
    reference_tomorrow: NaiveDate,
    tolerance_days: u32,
) -> DeadlineStatus {
    let Some(limit) = limit_date else {
        return DeadlineStatus::NoDeadline;
    };
    let critical_threshold = limit
        .checked_add_days(Days::new(u64::from(effective_tolerance(tolerance_days))))
        .unwrap_or(NaiveDate::MAX);

    if reference_today > critical_threshold {
        DeadlineStatus::Critical
    } else if reference_today > limit {
        DeadlineStatus::Overdue
    } else if reference_today == limit {
        DeadlineStatus::DueToday
    } else if reference_tomorrow == limit {
        DeadlineStatus::DueTomorrow
    } else {
        DeadlineStatus::OnTime
    }
}

pub fn classify_with(limit_date: Option<NaiveDate>, params: &GlobalParams) -> DeadlineStatus {
    classify(
        limit_date,
        params.reference_today,
        params.reference_tomorrow,
        params.tolerance_days,
    )
}
