//! Date range for fetching events.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

/// Number of days ahead to look when no range is given.
pub const DEFAULT_HORIZON_DAYS: i64 = 365;

/// Date range for filtering events.
/// None values mean unbounded in that direction.
#[derive(Debug, Clone, PartialEq)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl Default for DateRange {
    /// Default range: now until DEFAULT_HORIZON_DAYS from now
    fn default() -> Self {
        DateRange::upcoming(DEFAULT_HORIZON_DAYS)
    }
}

impl DateRange {
    /// From now until `horizon_days` ahead.
    ///
    /// Every calendar in a pass is fetched with the same range so that
    /// what counts as "already mirrored" is judged over the same window.
    pub fn upcoming(horizon_days: i64) -> Self {
        let now = Utc::now();
        DateRange {
            from: Some(now),
            to: Some(now + Duration::days(horizon_days)),
        }
    }

    /// Parse command-line bounds into a DateRange.
    /// - `from`: "start" for unbounded, "now", or YYYY-MM-DD; defaults to now
    /// - `to`: YYYY-MM-DD, defaults to `horizon_days` from now
    pub fn from_args(
        from: Option<&str>,
        to: Option<&str>,
        horizon_days: i64,
    ) -> Result<Self, String> {
        let now = Utc::now();

        let from_dt = match from {
            Some("start") => None,
            Some("now") | None => Some(now),
            Some(s) => Some(parse_date_start(s)?),
        };

        let to_dt = match to {
            Some(s) => Some(parse_date_end(s)?),
            None => Some(now + Duration::days(horizon_days)),
        };

        if let (Some(f), Some(t)) = (from_dt, to_dt)
            && f > t
        {
            return Err(format!(
                "Range start {} is after its end {}",
                f.date_naive(),
                t.date_naive()
            ));
        }

        Ok(DateRange {
            from: from_dt,
            to: to_dt,
        })
    }

    /// `from`, using the Unix epoch if unbounded.
    pub fn from_or_epoch(&self) -> DateTime<Utc> {
        self.from.unwrap_or_default()
    }

    /// `to`, using 2100-01-01 if unbounded.
    pub fn to_or_far_future(&self) -> DateTime<Utc> {
        self.to
            .or_else(|| DateTime::from_timestamp(4_102_444_800, 0))
            .unwrap_or_default()
    }

    pub fn from_rfc3339(&self) -> String {
        self.from_or_epoch().to_rfc3339()
    }

    pub fn to_rfc3339(&self) -> String {
        self.to_or_far_future().to_rfc3339()
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.from.is_none_or(|f| instant >= f) && self.to.is_none_or(|t| instant <= t)
    }
}

/// Parse YYYY-MM-DD as start of day in UTC
fn parse_date_start(s: &str) -> Result<DateTime<Utc>, String> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date format '{}'. Expected YYYY-MM-DD", s))?;
    Ok(date.and_time(NaiveTime::MIN).and_utc())
}

/// Parse YYYY-MM-DD as end of day in UTC
fn parse_date_end(s: &str) -> Result<DateTime<Utc>, String> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date format '{}'. Expected YYYY-MM-DD", s))?;
    let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    Ok(date.and_time(end_of_day).and_utc())
}
