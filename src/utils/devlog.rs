//! Developer-level ("dev6") logging of per-operation benchmark lines.
//!
//! Lines go to the `objrepo::dev6` log target and, when a thread has enabled its sink, into a
//! thread-local buffer so tests can assert on them without racing a global logger.

use std::cell::RefCell;

thread_local! {
    static TL_SINK: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Disables the thread-local sink on drop.
pub struct DevSinkGuard;

impl Drop for DevSinkGuard {
    fn drop(&mut self) {
        TL_SINK.with(|s| *s.borrow_mut() = None);
    }
}

/// Starts capturing on the current thread until the guard drops.
#[must_use]
pub fn enable_thread_sink() -> DevSinkGuard {
    TL_SINK.with(|s| *s.borrow_mut() = Some(Vec::new()));
    DevSinkGuard
}

pub fn write_str(msg: &str) {
    TL_SINK.with(|s| {
        if let Some(buf) = s.borrow_mut().as_mut() {
            buf.push(msg.to_owned());
        }
    });
}

/// Takes the captured lines, leaving the sink enabled and empty.
#[must_use]
pub fn drain() -> Vec<String> {
    TL_SINK.with(|s| s.borrow_mut().as_mut().map(std::mem::take).unwrap_or_default())
}

#[must_use]
pub fn snapshot() -> Vec<String> {
    TL_SINK.with(|s| s.borrow().as_ref().cloned().unwrap_or_default())
}

/// Captured benchmark lines for query operation `op` (`find`, `count`, ...), parsed.
#[must_use]
pub fn bench_lines(op: &str) -> Vec<serde_json::Value> {
    snapshot()
        .iter()
        .filter_map(|l| serde_json::from_str::<serde_json::Value>(l).ok())
        .filter(|v| v["bench"] == "query" && v["op"] == op)
        .collect()
}

/// Emits a developer log line and captures it in the thread-local sink if enabled.
#[macro_export]
macro_rules! dev6 {
    ($($arg:tt)*) => {{
        let __s = format!($($arg)*);
        $crate::utils::devlog::write_str(&__s);
        log::log!(target: "objrepo::dev6", log::Level::Trace, "{}", __s);
    }};
}
