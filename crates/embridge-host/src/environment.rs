//! Host environment
//!
//! One QuickJS runtime and context with the console, timer and location
//! APIs installed. Global state persists between evaluations; nothing is
//! sandboxed beyond the engine's memory and stack limits.

use crate::bridge::{self, EvalOutcome};
use crate::console;
use crate::location::{self, DisplaySurface, LocationManager};
use crate::timers::{self, TimerManager};
use crate::{describe_thrown, HostConfig, HostError};
use rquickjs::{Context, Ctx, Object, Runtime, Value};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};
use url::Url;

/// Global holding the native helpers the bootstrap scripts call into.
pub(crate) const HOST_NAMESPACE: &str = "__embridge";

/// Evaluates each script inside a function with a direct `eval`, so its
/// `let`, `const` and `var` declarations end with the call while writes to
/// `globalThis` persist.
const EVALUATE_BOOTSTRAP: &str = r#"
globalThis.__embridge.evaluate = (__embridgeSource) => eval(__embridgeSource);
"#;

/// Upper bound on timer rounds per [`HostEnvironment::pump`]; a timeout that
/// re-arms itself with zero delay is due again on every round.
const MAX_PUMP_ROUNDS: usize = 32;

/// Get (or create) the helper namespace object.
pub(crate) fn host_namespace<'js>(ctx: &Ctx<'js>) -> rquickjs::Result<Object<'js>> {
    let globals = ctx.globals();
    if let Some(namespace) = globals.get::<_, Option<Object>>(HOST_NAMESPACE)? {
        return Ok(namespace);
    }
    let namespace = Object::new(ctx.clone())?;
    globals.set(HOST_NAMESPACE, namespace.clone())?;
    Ok(namespace)
}

fn install_evaluate(ctx: &Ctx<'_>) -> rquickjs::Result<()> {
    host_namespace(ctx)?;
    ctx.eval::<Value, _>(EVALUATE_BOOTSTRAP)?;
    Ok(())
}

/// Evaluate `code` with call-scoped declarations.
pub(crate) fn evaluate<'js>(ctx: &Ctx<'js>, code: &str) -> rquickjs::Result<Value<'js>> {
    let evaluate: rquickjs::Function = host_namespace(ctx)?.get("evaluate")?;
    evaluate.call((code,))
}

/// Embedded script environment with browser-like globals
pub struct HostEnvironment {
    runtime: Runtime,
    context: Context,
    timers: Rc<RefCell<TimerManager>>,
    location: Rc<RefCell<LocationManager>>,
}

impl HostEnvironment {
    /// Create a new environment with console, timers and location installed
    pub fn new(config: &HostConfig) -> Result<Self, HostError> {
        let runtime = Runtime::new()?;
        runtime.set_memory_limit(config.memory_limit);
        runtime.set_max_stack_size(config.max_stack_size);

        let context = Context::full(&runtime)?;
        let timers = Rc::new(RefCell::new(TimerManager::new()));
        let location = Rc::new(RefCell::new(LocationManager::new(&config.initial_url)?));

        context.with(|ctx| {
            let install = || -> rquickjs::Result<()> {
                install_evaluate(&ctx)?;
                console::install_console(&ctx)?;
                timers::install_timers(&ctx, timers.clone())?;
                location::install_location(&ctx, location.clone())?;
                crate::bonds::install_bonds(&ctx)?;
                Ok(())
            };
            install().map_err(|e| HostError::from_js(&ctx, e))
        })?;

        tracing::debug!(
            memory_limit = config.memory_limit,
            initial_url = %config.initial_url,
            "host environment ready"
        );
        Ok(Self { runtime, context, timers, location })
    }

    /// Run `f` inside the script context
    pub fn with_context<F, R>(&self, f: F) -> R
    where
        F: for<'js> FnOnce(Ctx<'js>) -> R,
    {
        self.context.with(f)
    }

    /// Evaluate `code` and classify the result for the foreign caller.
    ///
    /// Top-level declarations are scoped to this call; only explicit
    /// `globalThis` writes outlive it.
    pub fn eval_bridge(&self, code: &str) -> Result<EvalOutcome, HostError> {
        self.context.with(|ctx| {
            let value = evaluate(&ctx, code).map_err(|e| HostError::from_js(&ctx, e))?;
            bridge::classify(&ctx, value)
        })
    }

    /// Execute JavaScript, ignoring the result
    pub fn exec(&self, code: &str) -> Result<(), HostError> {
        self.context.with(|ctx| {
            evaluate(&ctx, code).map_err(|e| HostError::from_js(&ctx, e))?;
            Ok(())
        })
    }

    /// Drain the promise job queue. Returns how many jobs ran.
    ///
    /// A job that throws is reported and does not stop the drain.
    pub fn run_pending_jobs(&self) -> usize {
        let mut ran = 0;
        loop {
            match self.runtime.execute_pending_job() {
                Ok(true) => ran += 1,
                Ok(false) => break,
                Err(_) => {
                    ran += 1;
                    let message = self.context.with(|ctx| describe_thrown(&ctx.catch()));
                    tracing::error!("[JS] uncaught error in job: {}", message);
                }
            }
        }
        ran
    }

    /// Check if promise jobs are queued
    pub fn has_pending_jobs(&self) -> bool {
        self.runtime.is_job_pending()
    }

    /// Fire every timer that is due. Returns how many fired.
    ///
    /// Callback errors are reported like uncaught browser errors.
    pub fn process_timers(&self) -> usize {
        // The borrow must end before callbacks run; they may schedule timers.
        let due = self.timers.borrow_mut().take_due(Instant::now());
        for timer in &due {
            if let Err(err) = self.fire_timer(timer.id) {
                tracing::error!(timer = timer.id, "[JS] uncaught error in timer: {}", err);
            }
        }
        due.len()
    }

    fn fire_timer(&self, id: u32) -> Result<(), HostError> {
        self.context.with(|ctx| {
            let fire: rquickjs::Function = host_namespace(&ctx)?.get("fireTimer")?;
            fire.call::<_, ()>((id,)).map_err(|e| HostError::from_js(&ctx, e))
        })
    }

    /// Turn the event loop without blocking: fire due timers and drain the
    /// jobs they queue until nothing is left to do. Returns how many timers
    /// fired.
    pub fn pump(&self) -> usize {
        self.run_pending_jobs();
        let mut fired = 0;
        for _ in 0..MAX_PUMP_ROUNDS {
            let round = self.process_timers();
            let jobs = self.run_pending_jobs();
            fired += round;
            if round == 0 && jobs == 0 {
                break;
            }
        }
        fired
    }

    /// Run the cycle collector
    pub fn collect_garbage(&self) {
        self.runtime.run_gc();
    }

    /// Check if timers are scheduled
    pub fn has_pending_timers(&self) -> bool {
        self.timers.borrow().has_pending()
    }

    /// Time until the earliest timer is due
    pub fn time_until_next_timer(&self) -> Option<Duration> {
        self.timers.borrow().time_until_next(Instant::now())
    }

    /// Navigate the display surface in place
    pub fn navigate(&self, target: &str) -> Result<Url, HostError> {
        self.location.borrow_mut().navigate(target)
    }

    /// Current document URL
    pub fn href(&self) -> String {
        self.location.borrow().href().to_string()
    }

    /// Install the surface navigations are forwarded to
    pub fn set_display_surface(&self, surface: impl DisplaySurface + 'static) {
        self.location.borrow_mut().set_surface(Box::new(surface));
    }
}

impl std::fmt::Debug for HostEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostEnvironment")
            .field("location", &self.href())
            .field("timers", &self.timers.borrow())
            .finish_non_exhaustive()
    }
}
