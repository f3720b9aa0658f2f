/// Clock-aligned job scheduling
///
/// Accepts either a cron expression (5 or 6 fields, consumed verbatim) or a
/// duration string that is converted to a cron expression, which makes
/// firings land on absolute clock boundaries: a "5m" schedule fires at
/// :00, :05, :10, ... regardless of when the process started.
///
/// The worker runs the job inline, so at most one job runs at a time; a
/// firing that falls due while the previous run is still executing is
/// skipped, not queued.
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use std::future::Future;
use std::pin::{pin, Pin};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::errors::ConfigError;
use crate::logger::{log, LogTag};

/// Grace interval reported for cron schedules, whose real cadence may be
/// irregular; used only by the health reporter.
const DEFAULT_EXPECTED_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Second/minute steps that divide evenly into their cycle
const VALID_SECOND_STEPS: [u64; 11] = [1, 2, 3, 4, 5, 6, 10, 12, 15, 20, 30];
const VALID_MINUTE_STEPS: [u64; 11] = [1, 2, 3, 4, 5, 6, 10, 12, 15, 20, 30];
const VALID_HOUR_STEPS: [u64; 8] = [1, 2, 3, 4, 6, 8, 12, 24];

/// The scheduled job: one tick over all wallets.
pub type JobFn =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send + Sync>;

pub struct Scheduler {
    interval: String,
    cron_expr: String,
    schedule: Schedule,
    timezone: Tz,
    run_immediately: bool,
    job: JobFn,
    stopped: AtomicBool,
    stop_notify: Notify,
    last_run: RwLock<Option<DateTime<Utc>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        interval: &str,
        timezone: Tz,
        run_immediately: bool,
        job: JobFn,
    ) -> Result<Self, ConfigError> {
        let cron_expr = schedule_expression(interval)?;
        let schedule = Schedule::from_str(&with_seconds_field(&cron_expr)).map_err(|e| {
            ConfigError::InvalidInterval {
                value: interval.to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            interval: interval.to_string(),
            cron_expr,
            schedule,
            timezone,
            run_immediately,
            job,
            stopped: AtomicBool::new(false),
            stop_notify: Notify::new(),
            last_run: RwLock::new(None),
            worker: Mutex::new(None),
        })
    }

    /// Spawn the worker. If `run_immediately` is set, the job executes once
    /// right away; a failure there is logged and does not prevent the
    /// scheduled firings.
    pub fn start(self: Arc<Self>) {
        let scheduler = self.clone();
        let handle = tokio::spawn(async move { scheduler.worker_loop().await });
        *self.worker.lock().unwrap() = Some(handle);

        match self.next_run() {
            Some(next) => log(
                LogTag::Scheduler,
                "INFO",
                &format!(
                    "Scheduler started ({}), next run {}",
                    self.describe(),
                    next.format("%Y-%m-%d %H:%M:%S %Z")
                ),
            ),
            None => log(
                LogTag::Scheduler,
                "WARN",
                &format!("Scheduler started ({}), but no future firings", self.describe()),
            ),
        }
    }

    async fn worker_loop(self: Arc<Self>) {
        if self.run_immediately {
            log(
                LogTag::Scheduler,
                "INFO",
                "Executing job immediately before first scheduled fire",
            );
            self.fire().await;
        }

        loop {
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }

            let now = Utc::now().with_timezone(&self.timezone);
            let Some(next) = self.schedule.after(&now).next() else {
                log(LogTag::Scheduler, "WARN", "Schedule has no future firings");
                break;
            };
            let wait = (next.with_timezone(&Utc) - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO);

            // Register the stop waiter before re-checking the flag so a
            // stop() between the check and the select cannot be missed.
            let mut stop = pin!(self.stop_notify.notified());
            stop.as_mut().enable();
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = &mut stop => break,
            }

            if self.stopped.load(Ordering::SeqCst) {
                break;
            }
            self.fire().await;
        }
    }

    /// Run the job once, inline, and record the firing time.
    async fn fire(&self) {
        let started = Utc::now();
        *self.last_run.write().unwrap() = Some(started);

        if let Err(e) = (self.job)().await {
            log(
                LogTag::Scheduler,
                "ERROR",
                &format!("Job execution failed: {:#}", e),
            );
        }
    }

    /// Signal the worker and wait for any running job to finish.
    pub async fn stop(&self) {
        log(LogTag::Scheduler, "INFO", "Stopping scheduler");
        self.stopped.store(true, Ordering::SeqCst);
        self.stop_notify.notify_waiters();

        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Next scheduled firing in the configured timezone.
    pub fn next_run(&self) -> Option<DateTime<Tz>> {
        self.schedule.upcoming(self.timezone).next()
    }

    /// When the job last started, if it has.
    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        *self.last_run.read().unwrap()
    }

    /// Expected gap between firings: the duration itself for duration specs,
    /// a conservative default for cron specs.
    pub fn expected_interval(&self) -> Duration {
        expected_interval_of(&self.interval)
    }

    /// Human-readable schedule summary for startup logging.
    pub fn describe(&self) -> String {
        if is_cron_expression(&self.interval) {
            format!("cron: {} [{}]", self.interval, self.timezone)
        } else {
            format!(
                "every {}, clock-aligned as {:?} [{}]",
                self.interval, self.cron_expr, self.timezone
            )
        }
    }
}

/// Expected gap between firings for an interval spec. Cron cadences can be
/// irregular, so they get a conservative default that is only used as a
/// liveness grace.
pub fn expected_interval_of(interval: &str) -> Duration {
    humantime::parse_duration(interval.trim()).unwrap_or(DEFAULT_EXPECTED_INTERVAL)
}

/// Cron expressions have 5 or 6 whitespace-separated fields; anything else
/// is treated as a duration string.
pub fn is_cron_expression(value: &str) -> bool {
    matches!(value.split_whitespace().count(), 5 | 6)
}

/// Resolve an interval spec to the cron expression the worker runs on.
fn schedule_expression(interval: &str) -> Result<String, ConfigError> {
    if interval.trim().is_empty() {
        return Err(ConfigError::InvalidInterval {
            value: interval.to_string(),
            reason: "empty interval (one-shot mode has no scheduler)".to_string(),
        });
    }
    if is_cron_expression(interval) {
        return Ok(interval.trim().to_string());
    }
    duration_to_cron(interval)
}

/// The `cron` crate wants a seconds column; plain 5-field expressions get a
/// literal `0` prepended, 6-field ones already carry their own.
fn with_seconds_field(expr: &str) -> String {
    if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

/// Convert a duration string to a clock-aligned cron expression.
///
/// "30s" -> "*/30 * * * * *"
/// "5m"  -> "*/5 * * * *"
/// "2h"  -> "0 */2 * * *"
///
/// Only steps that divide evenly into their cycle are admissible, otherwise
/// firings would not land on fixed clock positions.
pub fn duration_to_cron(raw: &str) -> Result<String, ConfigError> {
    let reject = |reason: String| ConfigError::InvalidInterval {
        value: raw.to_string(),
        reason,
    };

    let duration = humantime::parse_duration(raw.trim())
        .map_err(|e| reject(format!("not a duration: {e}")))?;

    if duration.subsec_nanos() != 0 {
        return Err(reject("sub-second intervals are not supported".to_string()));
    }

    let secs = duration.as_secs();
    if secs == 0 {
        return Err(reject("interval must be positive".to_string()));
    }

    if secs < 60 {
        if !VALID_SECOND_STEPS.contains(&secs) {
            return Err(reject(format!(
                "second interval {}s must divide evenly into 60",
                secs
            )));
        }
        Ok(format!("*/{secs} * * * * *"))
    } else if secs < 3600 {
        if secs % 60 != 0 {
            return Err(reject(
                "intervals under an hour must be whole minutes".to_string(),
            ));
        }
        let minutes = secs / 60;
        if !VALID_MINUTE_STEPS.contains(&minutes) {
            return Err(reject(format!(
                "minute interval {}m must divide evenly into 60",
                minutes
            )));
        }
        Ok(format!("*/{minutes} * * * *"))
    } else if secs % 3600 == 0 {
        let hours = secs / 3600;
        if !VALID_HOUR_STEPS.contains(&hours) {
            return Err(reject(format!(
                "hour interval {}h must divide evenly into 24",
                hours
            )));
        }
        Ok(format!("0 */{hours} * * *"))
    } else {
        Err(reject(
            "interval must be whole seconds, minutes, or hours".to_string(),
        ))
    }
}

/// Validate an interval spec at config-load time. Empty means one-shot mode
/// and is fine.
pub fn validate_interval(interval: &str) -> Result<(), ConfigError> {
    if interval.trim().is_empty() {
        return Ok(());
    }
    if is_cron_expression(interval) {
        Schedule::from_str(&with_seconds_field(interval.trim())).map_err(|e| {
            ConfigError::InvalidInterval {
                value: interval.to_string(),
                reason: e.to_string(),
            }
        })?;
        return Ok(());
    }
    duration_to_cron(interval)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_duration_to_cron_table() {
        assert_eq!(duration_to_cron("30s").unwrap(), "*/30 * * * * *");
        assert_eq!(duration_to_cron("1s").unwrap(), "*/1 * * * * *");
        assert_eq!(duration_to_cron("5m").unwrap(), "*/5 * * * *");
        assert_eq!(duration_to_cron("1m").unwrap(), "*/1 * * * *");
        assert_eq!(duration_to_cron("30m").unwrap(), "*/30 * * * *");
        assert_eq!(duration_to_cron("1h").unwrap(), "0 */1 * * *");
        assert_eq!(duration_to_cron("6h").unwrap(), "0 */6 * * *");
        assert_eq!(duration_to_cron("24h").unwrap(), "0 */24 * * *");
    }

    #[test]
    fn test_every_admissible_step_is_accepted() {
        for step in VALID_SECOND_STEPS {
            assert!(duration_to_cron(&format!("{step}s")).is_ok(), "{step}s");
        }
        for step in VALID_MINUTE_STEPS {
            assert!(duration_to_cron(&format!("{step}m")).is_ok(), "{step}m");
        }
        for step in VALID_HOUR_STEPS {
            assert!(duration_to_cron(&format!("{step}h")).is_ok(), "{step}h");
        }
    }

    #[test]
    fn test_non_aligning_durations_rejected() {
        for bad in ["7s", "45s", "7m", "45m", "90s", "5h", "7h", "25h", "1h30m", "0s", "500ms"] {
            assert!(duration_to_cron(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_cron_shape_detection() {
        assert!(is_cron_expression("*/5 * * * *"));
        assert!(is_cron_expression("*/30 * * * * *"));
        assert!(is_cron_expression("0 9,17 * * *"));
        assert!(!is_cron_expression("5m"));
        assert!(!is_cron_expression("*/5 * * *"));
        assert!(!is_cron_expression(""));
    }

    #[test]
    fn test_validate_interval() {
        assert!(validate_interval("").is_ok());
        assert!(validate_interval("5m").is_ok());
        assert!(validate_interval("*/5 * * * *").is_ok());
        assert!(validate_interval("0 9 * * 1-5").is_ok());
        assert!(validate_interval("*/30 * * * * *").is_ok());

        assert!(validate_interval("*/5 * * *").is_err());
        assert!(validate_interval("7m").is_err());
        assert!(validate_interval("not a schedule").is_err());
    }

    #[test]
    fn test_clock_alignment_five_minutes() {
        let schedule = Schedule::from_str(&with_seconds_field("*/5 * * * *")).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 3, 27).unwrap();
        let next = schedule.after(&start).next().unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 1, 9, 5, 0).unwrap());

        let following = schedule.after(&next).next().unwrap();
        assert_eq!(
            following,
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 10, 0).unwrap()
        );
    }

    #[test]
    fn test_clock_alignment_seconds() {
        let schedule = Schedule::from_str("*/15 * * * * *").unwrap();
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 7).unwrap();
        let next = schedule.after(&start).next().unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 15).unwrap());
    }

    #[test]
    fn test_hourly_alignment_fires_on_the_hour() {
        let schedule = Schedule::from_str(&with_seconds_field("0 */2 * * *")).unwrap();
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let next = schedule.after(&start).next().unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap());
        assert_eq!(next.minute(), 0);
        assert_eq!(next.second(), 0);
    }

    fn noop_job() -> JobFn {
        Arc::new(|| Box::pin(async { Ok(()) }))
    }

    #[test]
    fn test_expected_interval() {
        let scheduler =
            Scheduler::new("5m", chrono_tz::UTC, false, noop_job()).unwrap();
        assert_eq!(scheduler.expected_interval(), Duration::from_secs(300));

        let scheduler =
            Scheduler::new("0 9 * * 1-5", chrono_tz::UTC, false, noop_job()).unwrap();
        assert_eq!(scheduler.expected_interval(), DEFAULT_EXPECTED_INTERVAL);
    }

    #[test]
    fn test_next_run_is_aligned() {
        let scheduler =
            Scheduler::new("5m", chrono_tz::UTC, false, noop_job()).unwrap();
        let next = scheduler.next_run().unwrap();
        assert_eq!(next.minute() % 5, 0);
        assert_eq!(next.second(), 0);
    }

    #[test]
    fn test_rejects_empty_interval() {
        assert!(Scheduler::new("", chrono_tz::UTC, false, noop_job()).is_err());
    }

    #[tokio::test]
    async fn test_run_immediately_fires_once() {
        static COUNT: AtomicUsize = AtomicUsize::new(0);
        let job: JobFn = Arc::new(|| {
            Box::pin(async {
                COUNT.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });

        let scheduler =
            Arc::new(Scheduler::new("1h", chrono_tz::UTC, true, job).unwrap());
        scheduler.clone().start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop().await;

        assert_eq!(COUNT.load(Ordering::SeqCst), 1);
        assert!(scheduler.last_run().is_some());
    }
}
