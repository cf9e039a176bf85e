//! The cronjob service.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use permissions::endowments::{self, CronjobDefinition, Endowment};
use permissions::PermissionStore;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::cronjob::{delay_until, CronSchedule, Cronjob, JobId, JobInfo};
use crate::handler::{CronjobHandler, SYSTEM_ORIGIN};
use crate::timer::Timer;
use crate::{Error, Result};

/// Schedules recurring requests for plugins holding `endowment:cronjob`.
///
/// Cloning is cheap and shares the same jobs.
pub struct CronjobService<H: CronjobHandler> {
    inner: Arc<Inner<H>>,
}

impl<H: CronjobHandler> Clone for CronjobService<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<H> {
    store: Arc<dyn PermissionStore>,
    handler: Arc<H>,
    clock: Arc<dyn Clock>,
    /// Runtime timers and deliveries are spawned on.
    runtime: Option<Handle>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    plugins: HashMap<String, Vec<JobId>>,
    jobs: HashMap<JobId, Cronjob>,
}

impl State {
    fn remove_plugin(&mut self, plugin: &str) -> Option<usize> {
        let ids = self.plugins.remove(plugin)?;
        for id in &ids {
            if let Some(mut job) = self.jobs.remove(id) {
                job.cancel();
            }
        }
        Some(ids.len())
    }
}

impl<H: CronjobHandler> CronjobService<H> {
    pub fn new(store: Arc<dyn PermissionStore>, handler: H) -> Self {
        Self::with_clock(store, handler, SystemClock)
    }

    /// Create a service computing occurrences from `clock`.
    ///
    /// Timers run on the tokio runtime current at construction. Without one,
    /// scheduling fails with [`Error::NoRuntime`]; see [`Self::with_runtime`].
    pub fn with_clock(
        store: Arc<dyn PermissionStore>,
        handler: H,
        clock: impl Clock + 'static,
    ) -> Self {
        Self::build(store, handler, clock, Handle::try_current().ok())
    }

    /// Create a service whose timers run on `runtime`.
    ///
    /// `register` and `schedule` may then be called from any thread.
    pub fn with_runtime(
        store: Arc<dyn PermissionStore>,
        handler: H,
        clock: impl Clock + 'static,
        runtime: Handle,
    ) -> Self {
        Self::build(store, handler, clock, Some(runtime))
    }

    fn build(
        store: Arc<dyn PermissionStore>,
        handler: H,
        clock: impl Clock + 'static,
        runtime: Option<Handle>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                handler: Arc::new(handler),
                clock: Arc::new(clock),
                runtime,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Schedule every job in the plugin's cronjob endowment.
    ///
    /// A plugin without the endowment has no jobs and is not an error.
    /// Registering an already registered plugin replaces its jobs. The whole
    /// payload is checked before anything is scheduled.
    pub fn register(&self, plugin: &str) -> Result<usize> {
        let target = Endowment::Cronjob.target_key();
        if !self.inner.store.has_permission(plugin, target) {
            debug!(plugin, "no cronjob endowment");
            return Ok(0);
        }

        let Some(permission) = self.inner.store.get_permissions(plugin).shift_remove(target) else {
            debug!(plugin, "cronjob endowment revoked during registration");
            return Ok(0);
        };

        let payload =
            endowments::cronjob_payload(&permission).map_err(|e| Error::InvalidEndowmentPayload {
                plugin: plugin.to_string(),
                reason: e.to_string(),
            })?;

        let jobs = payload
            .jobs
            .into_iter()
            .map(|definition| {
                let schedule = CronSchedule::parse(&definition.expression)?;
                Ok(Cronjob::new(plugin, schedule, definition.request))
            })
            .collect::<Result<Vec<_>>>()?;
        let count = jobs.len();
        self.inner.runtime()?;

        let mut state = self.inner.lock();
        if let Some(replaced) = state.remove_plugin(plugin) {
            debug!(plugin, replaced, "replacing registered cronjobs");
        }
        state
            .plugins
            .insert(plugin.to_string(), jobs.iter().map(|job| job.id).collect());
        for mut job in jobs {
            self.inner.arm(&mut job);
            state.jobs.insert(job.id, job);
        }

        info!(plugin, jobs = count, "registered cronjobs");
        Ok(count)
    }

    /// Register many plugins; a failure only affects its own plugin.
    pub fn register_all<I, S>(&self, plugins: I) -> Vec<(String, Result<usize>)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        plugins
            .into_iter()
            .map(|plugin| {
                let plugin = plugin.as_ref();
                let result = self.register(plugin);
                if let Err(e) = &result {
                    warn!(plugin, error = %e, "cronjob registration failed");
                }
                (plugin.to_string(), result)
            })
            .collect()
    }

    /// Add one job for `plugin` and arm it.
    ///
    /// A schedule with no future occurrence is kept but never armed.
    pub fn schedule(&self, plugin: &str, definition: CronjobDefinition) -> Result<JobId> {
        let schedule = CronSchedule::parse(&definition.expression)?;
        self.inner.runtime()?;
        let mut job = Cronjob::new(plugin, schedule, definition.request);
        let id = job.id;

        let mut state = self.inner.lock();
        self.inner.arm(&mut job);
        state.plugins.entry(plugin.to_string()).or_default().push(id);
        state.jobs.insert(id, job);
        Ok(id)
    }

    /// Cancel and forget every job of `plugin`.
    ///
    /// No delivery for those jobs happens after this returns. Returns whether
    /// the plugin was registered.
    pub fn unregister(&self, plugin: &str) -> bool {
        match self.inner.lock().remove_plugin(plugin) {
            Some(jobs) => {
                info!(plugin, jobs, "unregistered cronjobs");
                true
            }
            None => false,
        }
    }

    /// Unregister every plugin.
    pub fn shutdown(&self) {
        let mut state = self.inner.lock();
        let plugins: Vec<String> = state.plugins.keys().cloned().collect();
        for plugin in plugins {
            state.remove_plugin(&plugin);
        }
        debug!("cronjob service shut down");
    }

    pub fn registered_plugins(&self) -> Vec<String> {
        self.inner.lock().plugins.keys().cloned().collect()
    }

    pub fn job_count(&self, plugin: &str) -> usize {
        self.inner.lock().plugins.get(plugin).map_or(0, Vec::len)
    }

    /// Number of jobs with a live timer.
    pub fn armed_timers(&self) -> usize {
        self.inner
            .lock()
            .jobs
            .values()
            .filter(|job| job.timer.as_ref().is_some_and(|timer| !timer.is_finished()))
            .count()
    }

    /// Jobs of `plugin` in registration order.
    pub fn jobs(&self, plugin: &str) -> Vec<JobInfo> {
        let state = self.inner.lock();
        state
            .plugins
            .get(plugin)
            .into_iter()
            .flatten()
            .filter_map(|id| state.jobs.get(id))
            .map(JobInfo::from)
            .collect()
    }
}

impl<H: CronjobHandler> Inner<H> {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn runtime(&self) -> Result<&Handle> {
        self.runtime.as_ref().ok_or(Error::NoRuntime)
    }

    /// Arm the timer for the job's next occurrence.
    ///
    /// Callers hold the state lock, so a firing can't observe a half-armed job.
    fn arm(self: &Arc<Self>, job: &mut Cronjob) {
        let Some(runtime) = &self.runtime else {
            return;
        };
        if job.cancel.is_cancelled() {
            return;
        }

        let Some((next, delay)) = self.next_occurrence(job) else {
            info!(
                plugin = %job.plugin,
                job = %job.id,
                expression = job.schedule.expression(),
                "cron schedule exhausted"
            );
            job.next = None;
            return;
        };

        let inner = Arc::downgrade(self);
        let id = job.id;
        job.next = Some(next);
        job.timer = Some(Timer::start(runtime, delay, move || {
            if let Some(inner) = inner.upgrade() {
                inner.fire(id);
            }
        }));
        debug!(plugin = %job.plugin, job = %id, %next, ?delay, "armed cronjob");
    }

    /// Next occurrence and the delay until it.
    ///
    /// Occurrences only move forward: the search starts strictly after both
    /// `now` and the occurrence most recently served, so the result is
    /// always in the future.
    fn next_occurrence(&self, job: &Cronjob) -> Option<(DateTime<Utc>, Duration)> {
        let now = self.clock.now();
        let after = job.last.map_or(now, |last| last.max(now));
        let next = job.schedule.next_after(after)?;
        Some((next, delay_until(now, next)))
    }

    /// Timer callback: deliver the request, then arm the next occurrence.
    ///
    /// Runs entirely under the state lock and checks the job's cancellation
    /// token first, so an `unregister` either wins outright or cancels the
    /// freshly armed timer.
    fn fire(self: &Arc<Self>, id: JobId) {
        let mut state = self.lock();
        let Some(job) = state.jobs.get_mut(&id) else {
            return;
        };
        if job.cancel.is_cancelled() {
            debug!(job = %id, "skipping cancelled cronjob");
            return;
        }

        job.timer = None;
        job.last = job.next.take();
        self.deliver(job);
        self.arm(job);
    }

    fn deliver(&self, job: &Cronjob) {
        let Some(runtime) = &self.runtime else {
            return;
        };
        let handler = Arc::clone(&self.handler);
        let plugin = job.plugin.clone();
        let request = job.request.clone();
        let id = job.id;

        debug!(plugin = %plugin, job = %id, "delivering cronjob request");
        runtime.spawn(async move {
            if let Err(e) = handler.deliver(&plugin, SYSTEM_ORIGIN, request).await {
                warn!(plugin = %plugin, job = %id, error = %e, "cronjob delivery failed");
            }
        });
    }
}

impl<H> Drop for Inner<H> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        for job in state.jobs.values_mut() {
            job.cancel();
        }
    }
}
