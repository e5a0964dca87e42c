//! C-compatible entry points for native code.
//!
//! # Strings
//!
//! Inputs are NUL-terminated UTF-8 strings owned by the caller and only
//! borrowed for the duration of the call.
//!
//! # Results
//!
//! `emEval` and `emEvalAsyncGet` return one of:
//! - a fresh NUL-terminated UTF-8 buffer, owned by the caller and released
//!   with [`emFree`] (not libc `free`),
//! - null when the script produced `undefined`,
//! - [`EVAL_FAILED`] (`-1` as a pointer) after logging the failure.
//!
//! # Event loop
//!
//! There is no background thread. `emEval` and `emEvalAsyncCheck` first
//! fire due timers and drain promise jobs, so work scheduled by earlier
//! calls runs between native calls.
//!
//! # Threads
//!
//! Each thread lazily gets its own [`HostEnvironment`], configured from the
//! `EMBRIDGE_*` environment variables unless one was installed with
//! [`install_host`]. Panics never cross the boundary.

#![allow(non_snake_case)]

use crate::bridge::EvalOutcome;
use crate::{bonds, clock, HostConfig, HostEnvironment, HostError};
use std::cell::RefCell;
use std::ffi::{c_char, CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

/// Failure sentinel returned in place of a result pointer.
pub const EVAL_FAILED: isize = -1;

thread_local! {
    static HOST: RefCell<Option<HostEnvironment>> = const { RefCell::new(None) };
}

/// Install `env` as this thread's host, returning the previous one.
pub fn install_host(env: HostEnvironment) -> Result<Option<HostEnvironment>, HostError> {
    HOST.with(|cell| {
        let mut slot = cell.try_borrow_mut().map_err(|_| HostError::Reentrant)?;
        Ok(slot.replace(env))
    })
}

/// Run `f` against this thread's host, creating it on first use.
pub fn with_host<R>(f: impl FnOnce(&HostEnvironment) -> Result<R, HostError>) -> Result<R, HostError> {
    HOST.with(|cell| {
        let missing = cell.try_borrow().map_err(|_| HostError::Reentrant)?.is_none();
        if missing {
            let env = HostEnvironment::new(&HostConfig::from_env()?)?;
            *cell.try_borrow_mut().map_err(|_| HostError::Reentrant)? = Some(env);
        }
        let host = cell.try_borrow().map_err(|_| HostError::Reentrant)?;
        match host.as_ref() {
            Some(env) => f(env),
            None => Err(HostError::Reentrant),
        }
    })
}

/// Wall-clock seconds since the Unix epoch.
#[unsafe(no_mangle)]
pub extern "C" fn now() -> f64 {
    clock::now_seconds()
}

/// Alias of [`now`] under the name native clock libraries link against.
#[unsafe(no_mangle)]
pub extern "C" fn emscripten_get_now() -> f64 {
    clock::now_seconds()
}

/// Evaluate a script in the host environment.
///
/// # Safety
///
/// `code` must be null or point to a NUL-terminated string that stays valid
/// for the duration of the call. A non-null, non-sentinel result must be
/// released with [`emFree`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn emEval(code: *const c_char) -> *mut c_char {
    let outcome = guard(|| {
        let code = unsafe { decode(code) }?;
        with_host(|host| {
            host.pump();
            host.eval_bridge(code)
        })
    });
    encode("emEval", outcome)
}

/// Navigate the host display surface to `url`, in place.
///
/// # Safety
///
/// `url` must be null or point to a NUL-terminated string that stays valid
/// for the duration of the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn emBrowsePage(url: *const c_char) {
    let outcome = guard(|| {
        if url.is_null() {
            return Err(HostError::NullPointer);
        }
        let url = unsafe { CStr::from_ptr(url) }.to_string_lossy();
        with_host(|host| host.navigate(&url)).map(drop)
    });
    if let Err(err) = outcome {
        tracing::warn!("emBrowsePage: navigation ignored: {}", err);
    }
}

/// Start an async evaluation bonded to slot `index`.
///
/// # Safety
///
/// Same contract as [`emEval`] for `code`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn emEvalAsyncRun(code: *const c_char, index: usize) -> bool {
    let outcome = guard(|| {
        let code = unsafe { decode(code) }?;
        with_host(|host| bonds::run(host, code, index))
    });
    match outcome {
        Ok(()) => true,
        Err(err) => {
            tracing::error!(index, "emEvalAsyncRun: {}", err);
            false
        }
    }
}

/// Poll slot `index`: `0` pending, `1` settled, `-1` rejected or unknown.
#[unsafe(no_mangle)]
pub extern "C" fn emEvalAsyncCheck(index: usize) -> i32 {
    match guard(|| with_host(|host| bonds::check(host, index))) {
        Ok(state) => state.code(),
        Err(err) => {
            tracing::error!(index, "emEvalAsyncCheck: {}", err);
            -1
        }
    }
}

/// Take the settled value of slot `index`; encoded like [`emEval`].
#[unsafe(no_mangle)]
pub extern "C" fn emEvalAsyncGet(index: usize) -> *mut c_char {
    let outcome = guard(|| with_host(|host| bonds::take(host, index)));
    encode("emEvalAsyncGet", outcome)
}

/// Release a buffer returned by [`emEval`] or [`emEvalAsyncGet`].
///
/// # Safety
///
/// `ptr` must be null, the failure sentinel, or a buffer from this library
/// that has not been freed yet.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn emFree(ptr: *mut c_char) {
    if ptr.is_null() || is_failure(ptr) {
        return;
    }
    drop(unsafe { CString::from_raw(ptr) });
}

/// True when `ptr` is the failure sentinel.
pub fn is_failure(ptr: *const c_char) -> bool {
    ptr as isize == EVAL_FAILED
}

unsafe fn decode<'a>(ptr: *const c_char) -> Result<&'a str, HostError> {
    if ptr.is_null() {
        return Err(HostError::NullPointer);
    }
    Ok(unsafe { CStr::from_ptr(ptr) }.to_str()?)
}

fn guard<R>(f: impl FnOnce() -> Result<R, HostError>) -> Result<R, HostError> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
        Err(HostError::Engine("panic caught at the foreign boundary".to_string()))
    })
}

fn encode(op: &str, outcome: Result<EvalOutcome, HostError>) -> *mut c_char {
    match outcome.and_then(EvalOutcome::into_c_string) {
        Ok(Some(text)) => text.into_raw(),
        Ok(None) => ptr::null_mut(),
        Err(err) => {
            tracing::error!("{}: {}", op, err);
            EVAL_FAILED as *mut c_char
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_sentinel() {
        assert!(is_failure(EVAL_FAILED as *const c_char));
        assert!(!is_failure(ptr::null()));
    }

    #[test]
    fn test_encode_absent_is_null() {
        assert!(encode("test", Ok(EvalOutcome::Absent)).is_null());
    }

    #[test]
    fn test_encode_error_is_sentinel() {
        assert!(is_failure(encode("test", Err(HostError::NullPointer))));
        assert!(is_failure(encode("test", Ok(EvalOutcome::Text("a\0b".to_string())))));
    }

    #[test]
    fn test_guard_catches_panic() {
        let result: Result<(), HostError> = guard(|| panic!("boom"));
        assert!(matches!(result, Err(HostError::Engine(_))));
    }

    #[test]
    fn test_free_tolerates_sentinels() {
        unsafe {
            emFree(ptr::null_mut());
            emFree(EVAL_FAILED as *mut c_char);
        }
    }

    #[test]
    fn test_install_host_replaces() {
        let config = HostConfig {
            initial_url: "https://example.com/".to_string(),
            ..HostConfig::default()
        };
        install_host(HostEnvironment::new(&config).unwrap()).unwrap();
        assert_eq!(with_host(|host| Ok(host.href())).unwrap(), "https://example.com/");
    }

    #[test]
    fn test_with_host_rejects_reentry() {
        let nested = with_host(|_| install_host(HostEnvironment::new(&HostConfig::default())?));
        assert!(matches!(nested, Err(HostError::Reentrant)));
    }
}
