//! Asynchronous evaluation slots
//!
//! A script's result is "bonded" to a caller-chosen slot index. Promises
//! settle as the environment turns its event loop; plain values settle
//! on the next turn. Callers poll with [`check`] and collect with [`take`].
//!
//! Slots are keyed by the decimal text of the index, so every `usize` gets
//! its own slot.

use crate::bridge::{classify, EvalOutcome};
use crate::environment::{evaluate, host_namespace};
use crate::{HostEnvironment, HostError};
use rquickjs::{Ctx, Function, Object, Value};

/// Slot state as reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondState {
    /// Still waiting on the promise
    Pending,
    /// Resolved; the value can be taken
    Settled,
    /// Rejected; the slot has been cleared
    Rejected,
}

impl BondState {
    /// Code returned across the foreign boundary
    pub fn code(self) -> i32 {
        match self {
            Self::Pending => 0,
            Self::Settled => 1,
            Self::Rejected => -1,
        }
    }
}

const BONDS_BOOTSTRAP: &str = r#"
(() => {
    const bonds = new Map();

    globalThis.__embridge.bonds = {
        run(index, value) {
            const bond = { finished: false, hadErrors: false, result: undefined };
            bonds.set(index, bond);
            Promise.resolve(value).then(
                (result) => {
                    bond.finished = true;
                    bond.result = result;
                },
                (error) => {
                    bond.finished = true;
                    bond.hadErrors = true;
                    console.error(error);
                },
            );
        },
        check(index) {
            const bond = bonds.get(index);
            if (bond === undefined) {
                return -2;
            }
            if (!bond.finished) {
                return 0;
            }
            if (bond.hadErrors) {
                bonds.delete(index);
                return -1;
            }
            return 1;
        },
        take(index) {
            const bond = bonds.get(index);
            if (bond === undefined) {
                return { state: -2 };
            }
            if (!bond.finished) {
                return { state: 0 };
            }
            bonds.delete(index);
            return { state: bond.hadErrors ? -1 : 1, result: bond.result };
        },
    };
})();
"#;

pub(crate) fn install_bonds(ctx: &Ctx<'_>) -> rquickjs::Result<()> {
    host_namespace(ctx)?;
    ctx.eval::<(), _>(BONDS_BOOTSTRAP)
}

fn bond_fn<'js>(ctx: &Ctx<'js>, name: &str) -> rquickjs::Result<Function<'js>> {
    host_namespace(ctx)?.get::<_, Object>("bonds")?.get(name)
}

fn slot_key(index: usize) -> String {
    index.to_string()
}

/// Evaluate `code` and bond its result to `index`, replacing whatever the
/// slot held before.
pub fn run(env: &HostEnvironment, code: &str, index: usize) -> Result<(), HostError> {
    env.with_context(|ctx| {
        let value: Value = evaluate(&ctx, code).map_err(|e| HostError::from_js(&ctx, e))?;
        bond_fn(&ctx, "run")?
            .call::<_, ()>((slot_key(index), value))
            .map_err(|e| HostError::from_js(&ctx, e))
    })?;
    tracing::trace!(index, "async evaluation started");
    Ok(())
}

/// Turn the event loop (due timers and pending jobs), then report the slot
/// state. A rejected slot is cleared by this call.
pub fn check(env: &HostEnvironment, index: usize) -> Result<BondState, HostError> {
    env.pump();
    let code: i32 = env.with_context(|ctx| {
        bond_fn(&ctx, "check")?
            .call((slot_key(index),))
            .map_err(|e| HostError::from_js(&ctx, e))
    })?;
    match code {
        0 => Ok(BondState::Pending),
        1 => Ok(BondState::Settled),
        -1 => Ok(BondState::Rejected),
        _ => Err(HostError::UnknownSlot(index)),
    }
}

/// Take the settled value out of the slot, clearing it.
pub fn take(env: &HostEnvironment, index: usize) -> Result<EvalOutcome, HostError> {
    env.with_context(|ctx| {
        let taken: Object = bond_fn(&ctx, "take")?
            .call((slot_key(index),))
            .map_err(|e| HostError::from_js(&ctx, e))?;
        match taken.get::<_, i32>("state")? {
            1 => classify(&ctx, taken.get("result")?),
            0 => Err(HostError::SlotPending(index)),
            -1 => Err(HostError::Exception(format!("async evaluation in slot {index} was rejected"))),
            _ => Err(HostError::UnknownSlot(index)),
        }
    })
}
