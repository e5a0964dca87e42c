//! Edge case tests for the exported C ABI
//!
//! Every test drives the symbols the way native code does: raw pointers
//! in, raw pointers (or sentinels) out.

use embridge_host::ffi::*;
use embridge_host::{HostConfig, HostEnvironment};
use std::cell::RefCell;
use std::ffi::{c_char, CStr, CString};
use std::io;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::fmt::MakeWriter;

/// Log sink collecting formatted events in memory.
#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl CapturedLog {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLog {
    type Writer = CapturedLog;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run `f` with every event at `warn` or above recorded.
fn with_captured_log<R>(f: impl FnOnce() -> R) -> (R, String) {
    let log = CapturedLog::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(log.clone())
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, log.contents())
}

/// Call `emEval` and decode the three-way result.
fn eval(code: &str) -> Result<Option<String>, ()> {
    let code = CString::new(code).unwrap();
    let result = unsafe { emEval(code.as_ptr()) };
    if is_failure(result) {
        return Err(());
    }
    if result.is_null() {
        return Ok(None);
    }
    let text = unsafe { CStr::from_ptr(result) }.to_str().unwrap().to_string();
    unsafe { emFree(result) };
    Ok(Some(text))
}

fn browse(url: &str) {
    let url = CString::new(url).unwrap();
    unsafe { emBrowsePage(url.as_ptr()) };
}

// ============================================================================
// CLOCK
// ============================================================================

#[test]
fn test_clock_aliases_agree() {
    let primary = now();
    let alias = emscripten_get_now();
    assert!((alias - primary).abs() < 0.05, "{primary} vs {alias}");
}

#[test]
fn test_clock_is_seconds_not_millis() {
    // Milliseconds since the epoch would already be past 1e12.
    let value = now();
    assert!(value > 1.0e9 && value < 1.0e11);
}

// ============================================================================
// EVAL BRIDGE
// ============================================================================

#[test]
fn test_scenario_table() {
    assert_eq!(eval(r#""hello""#), Ok(Some("hello".to_string())));
    assert_eq!(eval("undefined"), Ok(None));
    assert_eq!(eval("1+1"), Ok(Some("2".to_string())));
    assert_eq!(eval("({a:1})"), Ok(Some(r#"{"a":1}"#.to_string())));
    assert_eq!(eval("throw new Error('x')"), Err(()));
}

#[test]
fn test_undefined_identifier_fails() {
    assert_eq!(eval("someUndefinedIdentifier"), Err(()));
}

#[test]
fn test_thrown_error_is_logged() {
    let (result, log) = with_captured_log(|| eval("throw new Error('disk quota exceeded')"));
    assert_eq!(result, Err(()));
    let line = log
        .lines()
        .find(|line| line.contains("disk quota exceeded"))
        .unwrap_or_else(|| panic!("no diagnostic in log: {log:?}"));
    assert!(line.contains("ERROR"), "{line}");
    assert!(line.contains("emEval"), "{line}");
}

#[test]
fn test_success_logs_nothing() {
    let (result, log) = with_captured_log(|| eval("'quiet'"));
    assert_eq!(result, Ok(Some("quiet".to_string())));
    assert!(log.is_empty(), "{log}");
}

#[test]
fn test_repeated_script_with_declarations() {
    assert_eq!(eval("const x = 2; x * 2"), Ok(Some("4".to_string())));
    assert_eq!(eval("const x = 2; x * 2"), Ok(Some("4".to_string())));
    assert_eq!(eval("typeof x"), Ok(Some("undefined".to_string())));
}

#[test]
fn test_timers_run_between_calls() {
    assert_eq!(eval("globalThis.fired = false; setTimeout(() => { fired = true; }, 0); undefined"), Ok(None));
    assert_eq!(eval("fired"), Ok(Some("true".to_string())));
}

#[test]
fn test_null_pointer_fails() {
    let result = unsafe { emEval(std::ptr::null()) };
    assert!(is_failure(result));
}

#[test]
fn test_invalid_utf8_fails() {
    let bytes = [b'\'', 0xff, 0xfe, b'\'', 0];
    let result = unsafe { emEval(bytes.as_ptr() as *const c_char) };
    assert!(is_failure(result));
}

#[test]
fn test_unicode_round_trip() {
    let value = "héllo wörld ✓ 🌍";
    let script = format!("'{value}'");
    assert_eq!(eval(&script), Ok(Some(value.to_string())));
}

#[test]
fn test_string_with_nul_fails() {
    assert_eq!(eval("'a\\u0000b'"), Err(()));
}

#[test]
fn test_globals_persist_across_calls() {
    assert_eq!(eval("globalThis.answer = 41; undefined"), Ok(None));
    assert_eq!(eval("++answer"), Ok(Some("42".to_string())));
}

#[test]
fn test_failure_does_not_poison_environment() {
    assert_eq!(eval("throw 'bad'"), Err(()));
    assert_eq!(eval("'fine'"), Ok(Some("fine".to_string())));
}

#[test]
fn test_each_result_is_a_fresh_buffer() {
    let code = CString::new("'same'").unwrap();
    let first = unsafe { emEval(code.as_ptr()) };
    let second = unsafe { emEval(code.as_ptr()) };
    assert_ne!(first, second);
    unsafe {
        emFree(first);
        emFree(second);
    }
}

#[test]
fn test_function_result_fails() {
    assert_eq!(eval("(() => 1)"), Err(()));
}

// ============================================================================
// NAVIGATION
// ============================================================================

#[test]
fn test_browse_updates_location() {
    browse("https://example.com/start");
    assert_eq!(eval("location.href"), Ok(Some("https://example.com/start".to_string())));
    assert_eq!(eval("location.pathname"), Ok(Some("/start".to_string())));
}

#[test]
fn test_browse_relative_url() {
    browse("https://example.com/app/index.html");
    browse("../other.html");
    assert_eq!(eval("location.href"), Ok(Some("https://example.com/other.html".to_string())));
}

#[test]
fn test_browse_invalid_is_ignored() {
    browse("https://example.com/");
    browse("http://[bad");
    unsafe { emBrowsePage(std::ptr::null()) };
    assert_eq!(eval("location.href"), Ok(Some("https://example.com/".to_string())));
}

#[test]
fn test_browse_reaches_installed_surface() {
    let env = HostEnvironment::new(&HostConfig::default()).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    env.set_display_surface(move |url: &embridge_host::Url| sink.borrow_mut().push(url.to_string()));
    install_host(env).unwrap();

    browse("https://example.com/a");
    assert_eq!(eval("window.open('/b', '_self') === window"), Ok(Some("true".to_string())));
    assert_eq!(eval("location.replace('c'); undefined"), Ok(None));
    assert_eq!(eval("window.open('https://elsewhere.com/', '_blank')"), Ok(Some("null".to_string())));

    assert_eq!(
        *seen.borrow(),
        vec![
            "https://example.com/a".to_string(),
            "https://example.com/b".to_string(),
            "https://example.com/c".to_string(),
        ]
    );
}

#[test]
fn test_script_navigation_to_bad_url_throws() {
    assert_eq!(eval("location.replace('page.html')"), Err(()));
}

// ============================================================================
// ASYNC SLOTS
// ============================================================================

#[test]
fn test_async_slot_lifecycle() {
    let code = CString::new("new Promise((resolve) => setTimeout(() => resolve([1, 2]), 100))").unwrap();
    assert!(unsafe { emEvalAsyncRun(code.as_ptr(), 9) });
    assert_eq!(emEvalAsyncCheck(9), 0);

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut state = emEvalAsyncCheck(9);
    while state == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
        state = emEvalAsyncCheck(9);
    }
    assert_eq!(state, 1);

    let result = emEvalAsyncGet(9);
    assert!(!result.is_null() && !is_failure(result));
    assert_eq!(unsafe { CStr::from_ptr(result) }.to_str().unwrap(), "[1,2]");
    unsafe { emFree(result) };

    assert_eq!(emEvalAsyncCheck(9), -1);
}

#[test]
fn test_async_slot_rejection() {
    let code = CString::new("Promise.reject(new Error('later'))").unwrap();
    assert!(unsafe { emEvalAsyncRun(code.as_ptr(), 1) });
    assert_eq!(emEvalAsyncCheck(1), -1);
    assert!(is_failure(emEvalAsyncGet(1)));
}

#[test]
fn test_async_run_failure() {
    let code = CString::new("syntax error here").unwrap();
    assert!(!unsafe { emEvalAsyncRun(code.as_ptr(), 2) });
    assert!(!unsafe { emEvalAsyncRun(std::ptr::null(), 2) });
}

#[test]
fn test_async_get_undefined_is_null() {
    let code = CString::new("Promise.resolve(undefined)").unwrap();
    assert!(unsafe { emEvalAsyncRun(code.as_ptr(), 3) });
    assert_eq!(emEvalAsyncCheck(3), 1);
    assert!(emEvalAsyncGet(3).is_null());
}
