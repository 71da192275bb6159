//! # Fusebox Registry
//!
//! Command-keyed breaker registry: the host-facing layer around
//! `fusebox-core`.
//!
//! A service typically holds one [`Breaker`] per downstream command id.
//! The registry owns that map, a whitelist of commands that bypass
//! breaking entirely, and the min-samples recalibration applied when the
//! number of service instances changes. Breakers built here get a
//! state-change handler that logs every transition with the window's
//! counters, unless the options already carry one.
//!
//! The core imposes nothing on this layer beyond holding breakers and
//! synchronizing its own map access; everything here is concurrent-map
//! plumbing over the core's admission API.


use dashmap::{DashMap, DashSet};
use fusebox_core::{Breaker, Error, Options, State, StateChangeHandler, MIN_BUCKET_COUNT};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Snapshot of breaker states across all commands.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySummary {
    pub closed: usize,
    pub open: usize,
    pub half_open: usize,
    pub total_trips: u64,
}

/// Registry of breakers, one per command id.
#[derive(Debug)]
pub struct Registry {
    breakers: DashMap<i32, Arc<Breaker>>,
    whitelist: DashSet<i32>,
    /// Options template for built breakers; recalibration rewrites its
    /// sample floor.
    options: RwLock<Options>,
}

impl Registry {
    /// Create an empty registry whose breakers will be built from
    /// `options`. The template is validated once here; breakers for
    /// unknown commands are then built on first access.
    pub fn new(options: Options) -> Result<Self, Error> {
        let options = options.normalized();
        if options.bucket_count < MIN_BUCKET_COUNT {
            return Err(Error::Config {
                field: "bucket_count",
                message: format!(
                    "must be at least {MIN_BUCKET_COUNT}, got {}",
                    options.bucket_count
                ),
            });
        }
        Ok(Self {
            breakers: DashMap::new(),
            whitelist: DashSet::new(),
            options: RwLock::new(options),
        })
    }

    /// Create a registry with breakers pre-built for every command in
    /// `cmds`.
    pub fn init_all(cmds: &[i32], options: Options) -> Result<Self, Error> {
        let registry = Self::new(options)?;
        for &cmd in cmds {
            registry.breakers.insert(cmd, registry.build_breaker(cmd));
        }
        Ok(registry)
    }

    /// Fetch the breaker for `cmd`, building and storing one from the
    /// options template if the command is new.
    pub fn get(&self, cmd: i32) -> Arc<Breaker> {
        if let Some(breaker) = self.breakers.get(&cmd) {
            return Arc::clone(&breaker);
        }
        let entry = self
            .breakers
            .entry(cmd)
            .or_insert_with(|| self.build_breaker(cmd));
        Arc::clone(&entry)
    }

    /// Should the caller fast-fail `cmd` right now?
    ///
    /// Whitelisted commands never trip; otherwise this is the inverse of
    /// the breaker's admission check.
    pub fn is_tripped(&self, cmd: i32) -> bool {
        if self.whitelist.contains(&cmd) {
            return false;
        }
        !self.get(cmd).is_allowed()
    }

    /// Exempt `cmd` from breaking.
    pub fn whitelist_add(&self, cmd: i32) {
        self.whitelist.insert(cmd);
    }

    /// Remove `cmd` from the whitelist.
    pub fn whitelist_remove(&self, cmd: i32) {
        self.whitelist.remove(&cmd);
    }

    /// Is `cmd` exempt from breaking?
    pub fn is_whitelisted(&self, cmd: i32) -> bool {
        self.whitelist.contains(&cmd)
    }

    /// Recompute the minimum-samples floor for `instance_count` running
    /// instances and rebuild every breaker with it.
    ///
    /// Traffic spreads across instances, so each instance sees fewer
    /// requests per window and the per-breaker floor shrinks:
    /// `min_samples = window_seconds x min_qps / instance_count`.
    /// Call this whenever the instance count changes; rebuilt breakers
    /// start CLOSED with empty windows.
    pub fn recalibrate(&self, instance_count: usize) {
        if instance_count == 0 {
            warn!("breaker recalibration skipped: zero instances reported");
            return;
        }

        let min_samples = {
            let mut options = self.options.write();
            let window_secs = options.window_length().as_secs();
            let min_samples = window_secs * options.breaker_min_qps / instance_count as u64;
            options.breaker_min_samples = min_samples;
            min_samples
        };
        info!(
            instances = instance_count,
            min_samples, "breaker min samples recalibrated"
        );

        for mut entry in self.breakers.iter_mut() {
            let cmd = *entry.key();
            *entry.value_mut() = self.build_breaker(cmd);
        }
    }

    /// Current options template (normalized, including any recalibrated
    /// sample floor).
    pub fn options(&self) -> Options {
        self.options.read().clone()
    }

    /// All registered breakers.
    pub fn all(&self) -> Vec<(i32, Arc<Breaker>)> {
        self.breakers
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect()
    }

    /// Number of registered breakers.
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Whether any breakers are registered.
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Snapshot of breaker states for monitoring.
    pub fn summary(&self) -> RegistrySummary {
        let mut summary = RegistrySummary {
            closed: 0,
            open: 0,
            half_open: 0,
            total_trips: 0,
        };
        for entry in self.breakers.iter() {
            match entry.value().state() {
                State::Closed => summary.closed += 1,
                State::Open => summary.open += 1,
                State::HalfOpen => summary.half_open += 1,
            }
            summary.total_trips += entry.value().total_trips();
        }
        summary
    }

    fn build_breaker(&self, cmd: i32) -> Arc<Breaker> {
        let mut options = self.options.read().clone();
        if options.on_state_change.is_none() {
            options.on_state_change = Some(command_handler(cmd));
        }
        // The template was validated in `new`; recalibration only ever
        // rewrites the sample floor.
        let breaker = Breaker::new(options).expect("options template validated at construction");
        Arc::new(breaker)
    }
}

/// Default state-change handler: log the transition with the window's
/// counters, tagged with the command id.
fn command_handler(cmd: i32) -> StateChangeHandler {
    Arc::new(move |old, new, metrics| {
        let counts = metrics.counts();
        info!(
            cmd,
            old = %old,
            new = %new,
            successes = counts.successes,
            failures = counts.failures,
            timeouts = counts.timeouts,
            error_rate = metrics.error_rate(),
            "breaker state change"
        );
    })
}
