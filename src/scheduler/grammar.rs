//! Schedule grammars (§4.9): standard cron-list and the custom interval
//! grammar, both with next-fire computation.
//!
//! The `cron` crate is deliberately not used here — parsing these two
//! grammars and computing next-fire times is exactly the hard engineering
//! this component exists to do, not something to delegate away.
//!
//! Cron fields are matched directly against a `DateTime<Utc>`; cron firing
//! is UTC-only and `SchedulerConfig.timezone` / `CRON_TIMEZONE` is not
//! consulted here. The interval grammar's `offset_minutes` is the only
//! place a non-UTC wall clock enters next-fire computation.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveTime, TimeZone, Timelike, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronField {
    pub minute: CronValue,
    pub hour: CronValue,
    pub day_of_month: CronValue,
    pub month: CronValue,
    pub day_of_week: CronValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CronValue {
    Every,
    Step(u32),
    Exact(u32),
}

impl CronValue {
    fn parse(field: &str) -> Result<Self, String> {
        if field == "*" {
            return Ok(CronValue::Every);
        }
        if let Some(step) = field.strip_prefix("*/") {
            let n: u32 = step.parse().map_err(|_| format!("invalid step field: {field}"))?;
            return Ok(CronValue::Step(n));
        }
        let n: u32 = field.parse().map_err(|_| format!("invalid cron field: {field}"))?;
        Ok(CronValue::Exact(n))
    }

    fn matches(&self, value: u32) -> bool {
        match self {
            CronValue::Every => true,
            CronValue::Step(n) => *n != 0 && value % n == 0,
            CronValue::Exact(n) => *n == value,
        }
    }
}

impl CronField {
    pub fn parse(expr: &str) -> Result<Self, String> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(format!("cron expression must have 5 fields: {expr}"));
        }
        Ok(CronField {
            minute: CronValue::parse(fields[0])?,
            hour: CronValue::parse(fields[1])?,
            day_of_month: CronValue::parse(fields[2])?,
            month: CronValue::parse(fields[3])?,
            day_of_week: CronValue::parse(fields[4])?,
        })
    }

    fn matches(&self, dt: &DateTime<Utc>) -> bool {
        self.minute.matches(dt.minute())
            && self.hour.matches(dt.hour())
            && self.day_of_month.matches(dt.day())
            && self.month.matches(dt.month())
            && self.day_of_week.matches(dt.weekday().num_days_from_sunday())
    }

    /// Smallest minute-aligned instant strictly after `now` matching this field.
    /// Bounded search over two years of minutes — a schedule that never
    /// fires within that window is treated as invalid.
    pub fn next_fire_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = (now + ChronoDuration::minutes(1))
            .with_second(0)
            .unwrap()
            .with_nanosecond(0)
            .unwrap();
        let limit = now + ChronoDuration::days(366 * 2);
        let mut candidate = start;
        while candidate < limit {
            if self.matches(&candidate) {
                return Some(candidate);
            }
            candidate += ChronoDuration::minutes(1);
        }
        None
    }
}

/// One or more cron expressions joined by `||` (§4.9 "Cron-list"). The
/// earliest of all next-fire times is reported as "next run".
#[derive(Debug, Clone)]
pub struct CronList(pub Vec<CronField>);

impl CronList {
    pub fn parse(expr: &str) -> Result<Self, String> {
        let fields: Result<Vec<CronField>, String> = expr.split("||").map(|e| CronField::parse(e.trim())).collect();
        Ok(CronList(fields?))
    }

    pub fn next_fire_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.0.iter().filter_map(|f| f.next_fire_after(now)).min()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalUnit {
    Minute,
    Hour,
    Day,
}

#[derive(Debug, Clone)]
pub struct IntervalSchedule {
    pub unit: IntervalUnit,
    pub value: u32,
    pub anchor: DateTime<Utc>,
    /// Minutes east of UTC at anchor time.
    pub offset_minutes: i32,
    /// Day-unit only: 1..6 strictly increasing local `HH:MM` shots per day.
    pub times: Vec<NaiveTime>,
}

/// Parse `interval:{unit}:{value}:{anchorISO}|offset={minutes}[|times=HH:MM,...]`
/// (§4.9 "Interval grammar").
pub fn parse_interval(expr: &str) -> Result<IntervalSchedule, String> {
    let mut parts = expr.split('|');
    let head = parts.next().ok_or_else(|| "empty interval expression".to_string())?;

    let head_fields: Vec<&str> = head.splitn(4, ':').collect();
    if head_fields.len() != 4 || head_fields[0] != "interval" {
        return Err(format!("malformed interval head: {head}"));
    }
    let unit = match head_fields[1] {
        "minute" => IntervalUnit::Minute,
        "hour" => IntervalUnit::Hour,
        "day" => IntervalUnit::Day,
        other => return Err(format!("unknown interval unit: {other}")),
    };
    let value: u32 = head_fields[2].parse().map_err(|_| format!("invalid interval value: {}", head_fields[2]))?;
    let range_ok = match unit {
        IntervalUnit::Minute => (1..=60).contains(&value),
        IntervalUnit::Hour => (1..=24).contains(&value),
        IntervalUnit::Day => (1..=7).contains(&value),
    };
    if !range_ok {
        let unit_str = head_fields[1];
        return Err(format!("interval value {value} out of range for unit {unit_str}"));
    }
    let anchor = DateTime::parse_from_rfc3339(head_fields[3])
        .map_err(|e| format!("invalid anchor timestamp: {e}"))?
        .with_timezone(&Utc);

    let mut offset_minutes: Option<i32> = None;
    let mut times = Vec::new();
    for part in parts {
        if let Some(raw) = part.strip_prefix("offset=") {
            offset_minutes = Some(raw.parse().map_err(|_| format!("invalid offset: {raw}"))?);
        } else if let Some(raw) = part.strip_prefix("times=") {
            for shot in raw.split(',') {
                let t = NaiveTime::parse_from_str(shot.trim(), "%H:%M").map_err(|e| format!("invalid time shot {shot}: {e}"))?;
                times.push(t);
            }
            if times.len() > 6 {
                return Err("at most 6 time shots per day are allowed".to_string());
            }
            if !times.windows(2).all(|w| w[0] < w[1]) {
                return Err("time shots must be strictly increasing".to_string());
            }
        } else {
            return Err(format!("unknown interval modifier: {part}"));
        }
    }

    let offset_minutes = offset_minutes.ok_or_else(|| "interval grammar requires offset=".to_string())?;
    if unit != IntervalUnit::Day && !times.is_empty() {
        return Err("times= is only valid for the day unit".to_string());
    }

    Ok(IntervalSchedule { unit, value, anchor, offset_minutes, times })
}

impl IntervalSchedule {
    /// §4.9 "Next-fire computation".
    pub fn next_fire_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.unit {
            IntervalUnit::Minute => self.next_fixed_step(now, ChronoDuration::minutes(self.value as i64)),
            IntervalUnit::Hour => self.next_fixed_step(now, ChronoDuration::hours(self.value as i64)),
            IntervalUnit::Day => self.next_day_shot(now),
        }
    }

    /// minute/hour: `next = anchor + k·intervalMs` for the smallest `k`
    /// such that `next > now`.
    fn next_fixed_step(&self, now: DateTime<Utc>, step: ChronoDuration) -> DateTime<Utc> {
        if now < self.anchor {
            return self.anchor;
        }
        let elapsed = now - self.anchor;
        let step_ms = step.num_milliseconds().max(1);
        let k = elapsed.num_milliseconds() / step_ms + 1;
        self.anchor + step * (k as i32)
    }

    /// day: reconstruct local calendar days using `offset_minutes`, walk
    /// `value`-day cycles and each day's `times[]`, return the first
    /// candidate strictly after `now`.
    fn next_day_shot(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let offset = ChronoDuration::minutes(self.offset_minutes as i64);
        let anchor_local_day = (self.anchor + offset).date_naive();
        let reference = now.max(self.anchor);
        let reference_local_day = (reference + offset).date_naive();

        let shots = if self.times.is_empty() {
            vec![(self.anchor + offset).time()]
        } else {
            self.times.clone()
        };

        let days_since_anchor = (reference_local_day - anchor_local_day).num_days();
        let cycle_len = self.value.max(1) as i64;
        let mut cycle_start_offset = (days_since_anchor / cycle_len) * cycle_len;

        loop {
            let local_day = anchor_local_day + ChronoDuration::days(cycle_start_offset);
            for shot in &shots {
                let local_naive = local_day.and_time(*shot);
                let candidate_utc = local_naive - offset;
                let candidate_utc = Utc.from_utc_datetime(&candidate_utc);
                if candidate_utc > now {
                    return candidate_utc;
                }
            }
            cycle_start_offset += cycle_len;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cron_every_n_minutes() {
        let field = CronField::parse("*/15 * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 1, 0).unwrap();
        let next = field.next_fire_after(now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 1, 0, 15, 0).unwrap());
    }

    #[test]
    fn cron_list_reports_earliest() {
        let list = CronList::parse("0 2 * * * || */30 * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 1, 0).unwrap();
        let next = list.next_fire_after(now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 1, 0, 30, 0).unwrap());
    }

    #[test]
    fn interval_minute_step() {
        let schedule = parse_interval("interval:minute:5:2024-01-01T00:00:00Z|offset=0").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 6, 0).unwrap();
        assert_eq!(schedule.next_fire_after(now), Utc.with_ymd_and_hms(2024, 1, 1, 0, 10, 0).unwrap());
    }

    /// S6: `interval:day:1:2024-01-01T00:00:00Z|offset=480|times=08:00,20:00`
    /// at `now=2024-01-03T11:30:00Z` (local +08 -> 19:30) -> next fire
    /// `2024-01-03T20:00` local = `2024-01-03T12:00:00Z`.
    #[test]
    fn interval_day_multi_shot_seed_scenario() {
        let schedule = parse_interval("interval:day:1:2024-01-01T00:00:00Z|offset=480|times=08:00,20:00").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 3, 11, 30, 0).unwrap();
        let next = schedule.next_fire_after(now);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap());
    }

    #[test]
    fn interval_day_without_times_uses_anchor_local_time() {
        let schedule = parse_interval("interval:day:2:2024-01-01T03:00:00Z|offset=0").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 4, 0, 0).unwrap();
        let next = schedule.next_fire_after(now);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 3, 3, 0, 0).unwrap());
    }

    #[test]
    fn rejects_unsorted_time_shots() {
        assert!(parse_interval("interval:day:1:2024-01-01T00:00:00Z|offset=0|times=20:00,08:00").is_err());
    }

    #[test]
    fn rejects_out_of_range_value() {
        assert!(parse_interval("interval:hour:25:2024-01-01T00:00:00Z|offset=0").is_err());
    }
}
