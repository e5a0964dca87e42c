//! Timer APIs
//!
//! Implements setTimeout, setInterval and their clear functions. Callbacks
//! stay on the script side keyed by timer id; this manager only tracks
//! deadlines and tells the environment which ids are due.

use crate::environment::host_namespace;
use rquickjs::{Ctx, Function};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Timer entry
#[derive(Debug, Clone)]
pub struct Timer {
    pub id: u32,
    pub delay: Duration,
    pub repeat: bool,
    pub due_at: Instant,
}

/// Timer manager
#[derive(Debug)]
pub struct TimerManager {
    timers: BTreeMap<u32, Timer>,
    next_id: u32,
}

impl Default for TimerManager {
    fn default() -> Self {
        Self {
            timers: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl TimerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a timer and return its id
    pub fn schedule(&mut self, delay: Duration, repeat: bool) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.timers.insert(
            id,
            Timer {
                id,
                delay,
                repeat,
                due_at: Instant::now() + delay,
            },
        );
        id
    }

    /// Clear a timer
    pub fn clear(&mut self, id: u32) {
        self.timers.remove(&id);
    }

    /// Take the timers that are due, in firing order. One-shot timers are
    /// removed; repeating timers are rescheduled from `now`.
    pub fn take_due(&mut self, now: Instant) -> Vec<Timer> {
        let mut due: Vec<Timer> = self
            .timers
            .values()
            .filter(|timer| timer.due_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|timer| (timer.due_at, timer.id));

        for timer in &due {
            if timer.repeat {
                if let Some(entry) = self.timers.get_mut(&timer.id) {
                    entry.due_at = now + entry.delay;
                }
            } else {
                self.timers.remove(&timer.id);
            }
        }

        due
    }

    /// Check if there are pending timers
    pub fn has_pending(&self) -> bool {
        !self.timers.is_empty()
    }

    /// Get time until next timer fires
    pub fn time_until_next(&self, now: Instant) -> Option<Duration> {
        self.timers
            .values()
            .map(|timer| timer.due_at.saturating_duration_since(now))
            .min()
    }
}

/// Largest delay a timer accepts (2^31 - 1 ms).
const MAX_DELAY_MS: f64 = i32::MAX as f64;

const TIMERS_BOOTSTRAP: &str = r#"
(() => {
    const host = globalThis.__embridge;
    const callbacks = new Map();

    const register = (callback, delay, args, repeat) => {
        const run = typeof callback === 'function'
            ? callback
            : () => (0, eval)(String(callback));
        const id = host.scheduleTimer(Number(delay) || 0, repeat);
        callbacks.set(id, { run, args, repeat });
        return id;
    };
    const clear = (id) => {
        callbacks.delete(id);
        host.cancelTimer(Number(id) || 0);
    };

    host.fireTimer = (id) => {
        const entry = callbacks.get(id);
        if (entry === undefined) {
            return;
        }
        if (!entry.repeat) {
            callbacks.delete(id);
        }
        entry.run(...entry.args);
    };

    globalThis.setTimeout = (callback, delay, ...args) => register(callback, delay, args, false);
    globalThis.setInterval = (callback, delay, ...args) => register(callback, Math.max(Number(delay) || 0, 1), args, true);
    globalThis.clearTimeout = clear;
    globalThis.clearInterval = clear;
    globalThis.queueMicrotask = (callback) => { Promise.resolve().then(callback); };
})();
"#;

/// Install timer APIs into the global object
pub fn install_timers(ctx: &Ctx<'_>, timers: Rc<RefCell<TimerManager>>) -> rquickjs::Result<()> {
    let host = host_namespace(ctx)?;

    let tm = timers.clone();
    host.set(
        "scheduleTimer",
        Function::new(ctx.clone(), move |delay_ms: f64, repeat: bool| -> rquickjs::Result<u32> {
            // Out-of-range delays fire immediately, as in browsers.
            let delay_ms = if delay_ms.is_finite() && delay_ms <= MAX_DELAY_MS {
                delay_ms.max(0.0)
            } else {
                0.0
            };
            let delay = Duration::from_secs_f64(delay_ms / 1000.0);
            Ok(tm.borrow_mut().schedule(delay, repeat))
        })?,
    )?;

    let tm = timers;
    host.set(
        "cancelTimer",
        Function::new(ctx.clone(), move |id: f64| -> rquickjs::Result<()> {
            tm.borrow_mut().clear(id as u32);
            Ok(())
        })?,
    )?;

    ctx.eval::<(), _>(TIMERS_BOOTSTRAP)?;
    Ok(())
}
