//! Job scheduler.
//!
//! Every job runs in its own task, sleeping until its trigger fires. A job
//! never overlaps itself: the next fire time is computed only after the
//! current run finishes, and ticks missed in the meantime collapse into one.
//!
//! ```text
//! ┌ job task ───────────────────────────────────────────────────────┐
//! │ loop:  paused? ─▶ wait for resume                               │
//! │        sleep until next fire (cancel / pause wake it early)     │
//! │        distributed? ─▶ SET scheduler:lock:{id} NX EX ─▶ skip if held
//! │        run job ─▶ log outcome ─▶ release lock                   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Distributed mode guards each run with a [`JobLock`] so only one of several
//! service instances executes it.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveTime, Timelike, Utc, Weekday};
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use teleserve_storage::{DistributedLock, StorageResult};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{RuntimeError, RuntimeResult};

/// Prefix of lock keys: `scheduler:lock:{job_id}`.
pub const LOCK_KEY_PREFIX: &str = "scheduler:lock:";

/// Default lifetime of a job lock.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(300);

type JobFn = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

// =============================================================================
// Triggers
// =============================================================================

/// When a job fires. Daily and cron times are UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Interval(Duration),
    Daily(NaiveTime),
    Cron(CronSchedule),
}

impl Trigger {
    /// A daily trigger, or `None` if the time does not exist.
    pub fn daily(hour: u32, minute: u32, second: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, second).map(Self::Daily)
    }

    /// A cron-style trigger built from `fields`.
    pub fn cron(fields: &CronFields) -> Result<Self, String> {
        CronSchedule::new(fields).map(Self::Cron)
    }

    /// The first daily fire time strictly after `after`.
    fn next_daily(time: NaiveTime, after: DateTime<Utc>) -> DateTime<Utc> {
        let today = after.date_naive().and_time(time).and_utc();
        if today > after {
            today
        } else {
            today + chrono::Duration::days(1)
        }
    }

    /// Next fire instant. `prev` is the previous scheduled fire of an
    /// interval job; ticks already in the past are skipped.
    fn next_fire(&self, prev: Option<Instant>, now: Instant, wall_now: DateTime<Utc>) -> Instant {
        let at = match *self {
            Self::Interval(every) => {
                return match prev {
                    None => now + every,
                    Some(prev) => {
                        let next = prev + every;
                        if next > now {
                            return next;
                        }
                        let missed = ((now - prev).as_nanos() / every.as_nanos().max(1)) as u32;
                        debug!(missed, "Coalescing missed runs");
                        prev + every * (missed + 1)
                    }
                };
            }
            Self::Daily(time) => Self::next_daily(time, wall_now),
            Self::Cron(schedule) => schedule.next_after(wall_now),
        };
        now + (at - wall_now).to_std().unwrap_or_default()
    }
}

/// Fields of a cron-style trigger. A field left as `None` matches every
/// value when a later field is set, and its lowest value otherwise: `hour:
/// Some(3)` fires at 03:00:00, `minute: Some(30)` fires at :30:00 every hour.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CronFields {
    pub hour: Option<u32>,
    pub minute: Option<u32>,
    pub second: Option<u32>,
    /// Days such as `mon,wed`, `mon-fri` or `sat-mon`. Every day if `None`.
    pub day_of_week: Option<String>,
}

/// A resolved cron-style schedule in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CronSchedule {
    hour: Option<u32>,
    minute: Option<u32>,
    second: Option<u32>,
    /// Bit `n` set for the weekday `n` days from Monday.
    days: u8,
}

const ALL_DAYS: u8 = 0b111_1111;

impl CronSchedule {
    pub fn new(fields: &CronFields) -> Result<Self, String> {
        let days = match fields.day_of_week.as_deref() {
            Some(spec) => parse_days(spec)?,
            None => ALL_DAYS,
        };
        if fields.hour.is_none()
            && fields.minute.is_none()
            && fields.second.is_none()
            && days == ALL_DAYS
        {
            return Err("at least one cron field is required".to_string());
        }
        for (name, value, limit) in [
            ("hour", fields.hour, 24),
            ("minute", fields.minute, 60),
            ("second", fields.second, 60),
        ] {
            if let Some(value) = value
                && value >= limit
            {
                return Err(format!("{name} must be below {limit}, got {value}"));
            }
        }

        // Fields after the last one given take their lowest value.
        let mut schedule = Self {
            hour: fields.hour,
            minute: fields.minute,
            second: fields.second,
            days,
        };
        if fields.second.is_none() {
            schedule.second = Some(0);
            if fields.minute.is_none() {
                schedule.minute = Some(0);
                if fields.hour.is_none() {
                    schedule.hour = Some(0);
                }
            }
        }
        Ok(schedule)
    }

    /// The first fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let start = after
            .with_nanosecond(0)
            .unwrap_or(after)
            + chrono::Duration::seconds(1);

        // A matching weekday comes around within a week, and every
        // weekday has a matching time from midnight.
        let mut from = start.time();
        for offset in 0..8 {
            let date = start.date_naive() + chrono::Duration::days(offset);
            if self.days & day_bit(date.weekday()) != 0
                && let Some(time) = self.first_time_from(from)
            {
                return date.and_time(time).and_utc();
            }
            from = NaiveTime::MIN;
        }
        start + chrono::Duration::weeks(1)
    }

    /// The earliest matching time of day at or after `from`.
    fn first_time_from(&self, from: NaiveTime) -> Option<NaiveTime> {
        for hour in field_values(self.hour, 24).filter(|h| *h >= from.hour()) {
            let same_hour = hour == from.hour();
            let min_minute = if same_hour { from.minute() } else { 0 };
            for minute in field_values(self.minute, 60).filter(|m| *m >= min_minute) {
                let min_second = if same_hour && minute == from.minute() {
                    from.second()
                } else {
                    0
                };
                if let Some(second) = field_values(self.second, 60).find(|s| *s >= min_second) {
                    return NaiveTime::from_hms_opt(hour, minute, second);
                }
            }
        }
        None
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.days != ALL_DAYS {
            let days = WEEK
                .iter()
                .filter(|day| self.days & day_bit(**day) != 0)
                .map(|day| day.to_string().to_lowercase())
                .collect::<Vec<_>>();
            parts.push(format!("day_of_week='{}'", days.join(",")));
        }
        for (name, value) in [("hour", self.hour), ("minute", self.minute), ("second", self.second)] {
            if let Some(value) = value {
                parts.push(format!("{name}='{value}'"));
            }
        }
        write!(f, "cron[{}]", parts.join(", "))
    }
}

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

fn day_bit(day: Weekday) -> u8 {
    1 << day.num_days_from_monday()
}

fn field_values(field: Option<u32>, limit: u32) -> std::ops::Range<u32> {
    match field {
        Some(value) => value..value + 1,
        None => 0..limit,
    }
}

/// Parses `mon,wed-fri`. Ranges may wrap: `sat-mon` is Saturday to Monday.
fn parse_days(spec: &str) -> Result<u8, String> {
    let parse = |name: &str| {
        name.trim()
            .parse::<Weekday>()
            .map_err(|_| format!("unknown day of week '{}'", name.trim()))
    };

    let mut days = 0;
    for part in spec.split(',') {
        let part = part.trim();
        if part == "*" {
            days |= ALL_DAYS;
            continue;
        }
        match part.split_once('-') {
            Some((first, last)) => {
                let (mut day, last) = (parse(first)?, parse(last)?);
                days |= day_bit(day);
                while day != last {
                    day = day.succ();
                    days |= day_bit(day);
                }
            }
            None => days |= day_bit(parse(part)?),
        }
    }
    if days == 0 {
        return Err("day_of_week is empty".to_string());
    }
    Ok(days)
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interval(every) => write!(f, "interval[{}s]", every.as_secs_f64()),
            Self::Daily(time) => write!(f, "daily[{} UTC]", time.format("%H:%M:%S")),
            Self::Cron(schedule) => write!(f, "{schedule}"),
        }
    }
}

// =============================================================================
// Locks
// =============================================================================

/// Mutual exclusion for distributed jobs.
#[async_trait]
pub trait JobLock: Send + Sync {
    /// Takes `key` for `ttl`. Returns a token, or `None` if it is held.
    async fn acquire(&self, key: &str, ttl: Duration) -> StorageResult<Option<String>>;

    /// Releases `key` if it is still held with `token`.
    async fn release(&self, key: &str, token: &str) -> StorageResult<bool>;
}

#[async_trait]
impl JobLock for DistributedLock {
    async fn acquire(&self, key: &str, ttl: Duration) -> StorageResult<Option<String>> {
        DistributedLock::acquire(self, key, ttl).await
    }

    async fn release(&self, key: &str, token: &str) -> StorageResult<bool> {
        DistributedLock::release(self, key, token).await
    }
}

/// Process-local [`JobLock`] with expiry.
#[derive(Debug, Default)]
pub struct MemoryLock {
    held: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobLock for MemoryLock {
    async fn acquire(&self, key: &str, ttl: Duration) -> StorageResult<Option<String>> {
        let now = Instant::now();
        let mut held = self.held.lock();
        if let Some((_, expires)) = held.get(key)
            && *expires > now
        {
            return Ok(None);
        }
        let token = uuid::Uuid::new_v4().to_string();
        held.insert(key.to_string(), (token.clone(), now + ttl));
        Ok(Some(token))
    }

    async fn release(&self, key: &str, token: &str) -> StorageResult<bool> {
        let mut held = self.held.lock();
        if held.get(key).is_some_and(|(t, _)| t == token) {
            held.remove(key);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

// =============================================================================
// Jobs
// =============================================================================

/// Per-job settings.
#[derive(Debug, Clone, Copy)]
pub struct JobOptions {
    /// Guard runs with the scheduler's [`JobLock`].
    pub distributed: bool,
    pub lock_ttl: Duration,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            distributed: false,
            lock_ttl: DEFAULT_LOCK_TTL,
        }
    }
}

/// Snapshot of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    pub id: String,
    pub trigger: String,
    /// `None` while paused or before the scheduler starts.
    pub next_run: Option<DateTime<Utc>>,
    pub paused: bool,
    pub distributed: bool,
}

struct Job {
    id: String,
    trigger: Trigger,
    options: JobOptions,
    func: JobFn,
    paused: watch::Sender<bool>,
    next_run: Mutex<Option<DateTime<Utc>>>,
}

impl Job {
    fn info(&self) -> JobInfo {
        JobInfo {
            id: self.id.clone(),
            trigger: self.trigger.to_string(),
            next_run: *self.next_run.lock(),
            paused: *self.paused.borrow(),
            distributed: self.options.distributed,
        }
    }
}

struct RunningJob {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct JobSlot {
    job: Arc<Job>,
    task: Option<RunningJob>,
}

// =============================================================================
// Scheduler
// =============================================================================

/// Runs jobs on interval, daily and cron-style triggers.
pub struct Scheduler {
    jobs: Mutex<HashMap<String, JobSlot>>,
    lock: Option<Arc<dyn JobLock>>,
    defaults: JobOptions,
    running: AtomicBool,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            lock: None,
            defaults: JobOptions::default(),
            running: AtomicBool::new(false),
        }
    }

    /// Lock backend for distributed jobs.
    pub fn with_lock(mut self, lock: Arc<dyn JobLock>) -> Self {
        self.lock = Some(lock);
        self
    }

    /// Options used by [`add_interval_job`](Self::add_interval_job) and
    /// [`add_daily_job`](Self::add_daily_job).
    pub fn with_defaults(mut self, defaults: JobOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Adds a job firing every `every`, first after one period.
    pub fn add_interval_job<F, Fut>(&self, id: &str, every: Duration, func: F) -> RuntimeResult<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if every.is_zero() {
            return Err(RuntimeError::InvalidJob(format!(
                "job '{id}': interval must be positive"
            )));
        }
        self.add_job(id, Trigger::Interval(every), self.defaults, func)
    }

    /// Adds a job firing once a day at `hour:minute:second` UTC.
    pub fn add_daily_job<F, Fut>(
        &self,
        id: &str,
        hour: u32,
        minute: u32,
        second: u32,
        func: F,
    ) -> RuntimeResult<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let trigger = Trigger::daily(hour, minute, second).ok_or_else(|| {
            RuntimeError::InvalidJob(format!(
                "job '{id}': {hour:02}:{minute:02}:{second:02} is not a time of day"
            ))
        })?;
        self.add_job(id, trigger, self.defaults, func)
    }

    /// Adds a job firing on a cron-style schedule in UTC.
    pub fn add_cron_job<F, Fut>(&self, id: &str, fields: CronFields, func: F) -> RuntimeResult<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let trigger = Trigger::cron(&fields)
            .map_err(|e| RuntimeError::InvalidJob(format!("job '{id}': {e}")))?;
        self.add_job(id, trigger, self.defaults, func)
    }

    /// Adds a job, replacing any job with the same id.
    pub fn add_job<F, Fut>(
        &self,
        id: &str,
        trigger: Trigger,
        options: JobOptions,
        func: F,
    ) -> RuntimeResult<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if options.distributed && self.lock.is_none() {
            warn!(job = %id, "Distributed job without a lock backend, runs are unguarded");
        }

        let func: JobFn = Arc::new(move || func().boxed());
        let (paused, _) = watch::channel(false);
        let job = Arc::new(Job {
            id: id.to_string(),
            trigger,
            options,
            func,
            paused,
            next_run: Mutex::new(None),
        });

        // The replacement task starts only after the replaced one has
        // finished, so the two never run at once.
        let mut jobs = self.jobs.lock();
        let previous = jobs.remove(id).and_then(|slot| slot.task).map(|task| {
            task.cancel.cancel();
            task.handle
        });
        let task = self
            .is_running()
            .then(|| self.spawn(Arc::clone(&job), previous));
        jobs.insert(id.to_string(), JobSlot { job, task });
        drop(jobs);

        let lock_info = if options.distributed {
            format!(", distributed_lock=true, ttl={}s", options.lock_ttl.as_secs())
        } else {
            String::new()
        };
        info!("Added job: {id} ({trigger}{lock_info})");
        Ok(())
    }

    /// Removes a job, waiting for a run in progress. Returns `false` if
    /// there was no such job.
    pub async fn remove_job(&self, id: &str) -> bool {
        let Some(slot) = self.jobs.lock().remove(id) else {
            return false;
        };
        if let Some(task) = slot.task {
            task.cancel.cancel();
            join_job_task(id, task.handle).await;
        }
        info!(job = %id, "Removed job");
        true
    }

    pub fn pause_job(&self, id: &str) -> bool {
        self.set_paused(id, true)
    }

    pub fn resume_job(&self, id: &str) -> bool {
        self.set_paused(id, false)
    }

    fn set_paused(&self, id: &str, paused: bool) -> bool {
        let jobs = self.jobs.lock();
        let Some(slot) = jobs.get(id) else {
            return false;
        };
        slot.job.paused.send_replace(paused);
        if paused {
            info!(job = %id, "Paused job");
        } else {
            info!(job = %id, "Resumed job");
        }
        true
    }

    pub fn get_job_info(&self, id: &str) -> Option<JobInfo> {
        self.jobs.lock().get(id).map(|slot| slot.job.info())
    }

    /// All jobs, sorted by id.
    pub fn list_jobs(&self) -> Vec<JobInfo> {
        let mut jobs: Vec<_> = self.jobs.lock().values().map(|slot| slot.job.info()).collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        jobs
    }

    /// Starts every job.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Scheduler already running");
            return;
        }

        let mut jobs = self.jobs.lock();
        for slot in jobs.values_mut() {
            slot.task = Some(self.spawn(Arc::clone(&slot.job), None));
        }
        info!("Scheduler started with {} jobs", jobs.len());
    }

    /// Stops every job, letting runs in progress finish.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let tasks: Vec<_> = self
            .jobs
            .lock()
            .iter_mut()
            .filter_map(|(id, slot)| slot.task.take().map(|task| (id.clone(), task)))
            .collect();
        for (_, task) in &tasks {
            task.cancel.cancel();
        }
        for (id, task) in tasks {
            join_job_task(&id, task.handle).await;
        }
        info!("Scheduler stopped");
    }

    fn spawn(&self, job: Arc<Job>, replaced: Option<JoinHandle<()>>) -> RunningJob {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(job_loop(job, self.lock.clone(), cancel.clone(), replaced));
        RunningJob { cancel, handle }
    }
}

async fn join_job_task(id: &str, handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        warn!(job = %id, error = %e, "Job task ended abnormally");
    }
}

async fn job_loop(
    job: Arc<Job>,
    lock: Option<Arc<dyn JobLock>>,
    cancel: CancellationToken,
    replaced: Option<JoinHandle<()>>,
) {
    if let Some(handle) = replaced {
        join_job_task(&job.id, handle).await;
    }

    let mut paused = job.paused.subscribe();
    let mut prev: Option<Instant> = None;

    loop {
        if *paused.borrow_and_update() {
            *job.next_run.lock() = None;
            prev = None;
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = paused.changed() => if changed.is_err() { break } else { continue },
            }
        }

        let now = Instant::now();
        let wall_now = Utc::now();
        let next = job.trigger.next_fire(prev, now, wall_now);
        *job.next_run.lock() = chrono::Duration::from_std(next - now)
            .ok()
            .map(|wait| wall_now + wait);

        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = paused.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = tokio::time::sleep_until(next) => {}
        }

        prev = Some(next);
        run_once(&job, lock.as_deref()).await;
    }

    *job.next_run.lock() = None;
    debug!(job = %job.id, "Job task exited");
}

async fn run_once(job: &Job, lock: Option<&dyn JobLock>) {
    let key = format!("{LOCK_KEY_PREFIX}{}", job.id);
    let guard = match lock.filter(|_| job.options.distributed) {
        Some(lock) => match lock.acquire(&key, job.options.lock_ttl).await {
            Ok(Some(token)) => Some((lock, token)),
            Ok(None) => {
                debug!(job = %job.id, "Distributed lock held elsewhere, skipping run");
                return;
            }
            Err(e) => {
                warn!(job = %job.id, error = %e, "Failed to acquire job lock, skipping run");
                return;
            }
        },
        None => None,
    };

    match AssertUnwindSafe((job.func)()).catch_unwind().await {
        Ok(Ok(())) => debug!(job = %job.id, "Job executed"),
        Ok(Err(e)) => error!(job = %job.id, error = %e, "Job error"),
        Err(_) => error!(job = %job.id, "Job panicked"),
    }

    if let Some((lock, token)) = guard
        && let Err(e) = lock.release(&key, &token).await
    {
        warn!(job = %job.id, error = %e, "Failed to release job lock");
    }
}
