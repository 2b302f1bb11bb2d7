//! Wall-clock schedules for the price refresh and the notification cycle.

use std::future::Future;

use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Utc, Weekday};

use goldie_common::shutdown::Shutdown;

/// Fires once a day at `at` local time, optionally only on some weekdays.
#[derive(Debug, Clone)]
pub struct DailySchedule {
    at: NaiveTime,
    /// Empty means every day.
    weekdays: Vec<Weekday>,
    offset: FixedOffset,
}

impl DailySchedule {
    pub fn every_day(at: NaiveTime, offset: FixedOffset) -> Self {
        Self {
            at,
            weekdays: Vec::new(),
            offset,
        }
    }

    pub fn on_weekdays(at: NaiveTime, weekdays: Vec<Weekday>, offset: FixedOffset) -> Self {
        Self {
            at,
            weekdays,
            offset,
        }
    }

    fn runs_on(&self, weekday: Weekday) -> bool {
        self.weekdays.is_empty() || self.weekdays.contains(&weekday)
    }

    /// First run strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = now.with_timezone(&self.offset);

        local
            .date_naive()
            .iter_days()
            .take(8)
            .filter(|day| self.runs_on(day.weekday()))
            .filter_map(|day| day.and_time(self.at).and_local_timezone(self.offset).single())
            .find(|candidate| *candidate > local)
            .map(|candidate| candidate.with_timezone(&Utc))
    }
}

/// Run `job` on every tick of `schedule` until `shutdown` fires. A running job is
/// awaited to completion; shutdown is only observed between runs.
pub async fn run_daily<F, Fut>(
    name: &'static str,
    schedule: DailySchedule,
    mut shutdown: Shutdown,
    mut job: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        let now = Utc::now();
        let Some(next) = schedule.next_after(now) else {
            tracing::error!(job = name, "Schedule never fires, job disabled");
            return;
        };
        let wait = (next - now).to_std().unwrap_or_default();
        tracing::info!(job = name, next_run = %next, "Job scheduled");

        tokio::select! {
            _ = shutdown.triggered() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        tracing::info!(job = name, "Job started");
        job().await;
    }

    tracing::info!(job = name, "Schedule stopped");
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn bishkek() -> FixedOffset {
        FixedOffset::east_opt(6 * 3600).unwrap()
    }

    fn at(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    /// UTC instant of a Bishkek wall-clock time.
    fn local(y: i32, m: u32, d: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        bishkek()
            .with_ymd_and_hms(y, m, d, hour, minute, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_daily_runs_later_today() {
        let schedule = DailySchedule::every_day(at(10, 0), bishkek());
        // Friday 2025-11-07 08:00 local
        let next = schedule.next_after(local(2025, 11, 7, 8, 0)).unwrap();
        assert_eq!(next, local(2025, 11, 7, 10, 0));
        assert_eq!(next.to_rfc3339(), "2025-11-07T04:00:00+00:00");
    }

    #[test]
    fn test_daily_rolls_over_after_run_time() {
        let schedule = DailySchedule::every_day(at(10, 0), bishkek());
        assert_eq!(
            schedule.next_after(local(2025, 11, 7, 10, 0)).unwrap(),
            local(2025, 11, 8, 10, 0)
        );
    }

    #[test]
    fn test_weekday_schedule_skips_weekend() {
        let weekdays = vec![
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
        ];
        let schedule = DailySchedule::on_weekdays(at(9, 15), weekdays, bishkek());
        // Friday after the run -> Monday
        assert_eq!(
            schedule.next_after(local(2025, 11, 7, 12, 0)).unwrap(),
            local(2025, 11, 10, 9, 15)
        );
    }

    #[test]
    fn test_local_day_differs_from_utc_day() {
        let schedule = DailySchedule::every_day(at(0, 30), bishkek());
        // 2025-11-07 20:00 UTC is already 2025-11-08 02:00 in Bishkek
        let now = Utc.with_ymd_and_hms(2025, 11, 7, 20, 0, 0).unwrap();
        assert_eq!(schedule.next_after(now).unwrap(), local(2025, 11, 9, 0, 30));
    }

    #[tokio::test]
    async fn test_run_daily_stops_on_shutdown() {
        let (trigger, shutdown) = goldie_common::shutdown::channel();
        let schedule = DailySchedule::every_day(at(10, 0), bishkek());
        let task = tokio::spawn(run_daily("test", schedule, shutdown, || async {}));

        trigger.trigger();
        tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .expect("schedule should stop")
            .unwrap();
    }
}
