//! embridge Test Harness
//!
//! Loads one test module into a [`HostEnvironment`], hands it a config
//! object with a `postRun` callback, and drives timers and promise jobs
//! until `postRun` is called.
//!
//! Completion travels over an in-process channel; the process exit code
//! comes from `process.exitCode` (0 when unset).

mod loader;

pub use loader::ModuleSource;

use embridge_host::{describe_thrown, HostConfig, HostEnvironment, HostError};
use rquickjs::{Ctx, Function, Object, Value};
use smol::channel::{Receiver, Sender};
use std::path::{Path, PathBuf};

/// Program name reported in `process.argv[0]`
pub const HARNESS_NAME: &str = "embridge-harness";

/// Calls the returned thenable's rejection handler, if there is one.
const WATCH_RESULT: &str = r#"
((result, fail) => {
    if ((result !== null && typeof result === "object") || typeof result === "function") {
        if (typeof result.then === "function") {
            result.then(undefined, fail);
        }
    }
})
"#;

/// Harness error
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("failed to read module {}: {}", .path.display(), .source)]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("module {0} does not export a function")]
    NotCallable(String),

    #[error("module entry rejected: {0}")]
    Rejected(String),

    #[error("postRun was released without being called")]
    Abandoned,

    #[error(transparent)]
    Host(#[from] HostError),
}

impl From<rquickjs::Error> for HarnessError {
    fn from(err: rquickjs::Error) -> Self {
        Self::Host(err.into())
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub exit_code: i32,
}

#[derive(Debug)]
enum Signal {
    PostRun,
    Rejected(String),
}

/// One-shot module runner
pub struct Harness {
    env: HostEnvironment,
}

impl Harness {
    pub fn new(config: &HostConfig) -> Result<Self, HarnessError> {
        let env = HostEnvironment::new(config)?;
        Ok(Self { env })
    }

    /// The environment modules run in
    pub fn environment(&self) -> &HostEnvironment {
        &self.env
    }

    /// Read, load and run the module at `path`
    pub fn run_file(&self, path: &Path) -> Result<Completion, HarnessError> {
        let module = ModuleSource::read(path)?;
        self.run(&module)
    }

    /// Load `module`, call its entry point and block until `postRun`.
    ///
    /// There is no timeout: a module that holds on to `postRun` without
    /// calling it keeps the harness waiting. Once every reference to
    /// `postRun` is gone the run fails with [`HarnessError::Abandoned`].
    pub fn run(&self, module: &ModuleSource) -> Result<Completion, HarnessError> {
        tracing::info!(module = %module.name, "running module");
        self.env.with_context(|ctx| install_process(&ctx, &module.name))?;
        // The only senders live in script callbacks.
        let (signal_tx, signal_rx) = smol::channel::bounded(1);
        self.start(module, signal_tx)?;
        smol::block_on(self.wait(&signal_rx))
    }

    fn start(&self, module: &ModuleSource, signal_tx: Sender<Signal>) -> Result<(), HarnessError> {
        let done = signal_tx.clone();
        let failed = signal_tx;
        self.env.with_context(|ctx| {
            let entry = loader::load(&ctx, module)?;

            let config = Object::new(ctx.clone())?;
            let post_run = Function::new(ctx.clone(), move || {
                tracing::debug!("postRun called");
                // First signal wins; later ones find the channel full.
                done.try_send(Signal::PostRun).ok();
            })?
            .with_name("postRun")?;
            config.set("postRun", post_run)?;

            let result: Value = entry
                .call((config,))
                .map_err(|e| HostError::from_js(&ctx, e))?;

            let fail = Function::new(ctx.clone(), move |reason: Value<'_>| {
                failed.try_send(Signal::Rejected(describe_thrown(&reason))).ok();
            })?;
            let watch: Function = ctx.eval(WATCH_RESULT)?;
            watch.call::<_, ()>((result, fail))?;
            Ok(())
        })
    }

    async fn wait(&self, signals: &Receiver<Signal>) -> Result<Completion, HarnessError> {
        let mut idle_reported = false;
        loop {
            self.env.run_pending_jobs();
            self.env.process_timers();

            if let Ok(signal) = signals.try_recv() {
                return self.finish(signal);
            }
            if self.env.has_pending_jobs() {
                continue;
            }

            match self.env.time_until_next_timer() {
                Some(delay) => {
                    smol::Timer::after(delay).await;
                }
                None => {
                    if !idle_reported {
                        tracing::warn!("module is idle and has not called postRun; waiting");
                        idle_reported = true;
                    }
                    // Releases callbacks the module dropped inside a cycle.
                    self.env.collect_garbage();
                    let signal = signals.recv().await.map_err(|_| HarnessError::Abandoned)?;
                    return self.finish(signal);
                }
            }
        }
    }

    fn finish(&self, signal: Signal) -> Result<Completion, HarnessError> {
        match signal {
            Signal::PostRun => {
                let exit_code = self.env.with_context(|ctx| exit_code(&ctx))?;
                tracing::info!(exit_code, "module finished");
                Ok(Completion { exit_code })
            }
            Signal::Rejected(message) => Err(HarnessError::Rejected(message)),
        }
    }
}

impl std::fmt::Debug for Harness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harness").field("env", &self.env).finish_non_exhaustive()
    }
}

/// Minimal `process` global: `argv` and a writable `exitCode`.
fn install_process(ctx: &Ctx<'_>, module_name: &str) -> rquickjs::Result<()> {
    let process = Object::new(ctx.clone())?;
    process.set("argv", vec![HARNESS_NAME.to_string(), module_name.to_string()])?;
    process.set("exitCode", Value::new_undefined(ctx.clone()))?;
    ctx.globals().set("process", process)
}

fn exit_code(ctx: &Ctx<'_>) -> rquickjs::Result<i32> {
    let Some(process) = ctx.globals().get::<_, Option<Object>>("process")? else {
        return Ok(0);
    };
    let code: Value = process.get("exitCode")?;
    Ok(code.as_number().map_or(0, |n| n as i32))
}
