//! Stack trace capture for panic reporting.
//!
//! A panic hook installed with [`install_panic_hook`] records the stack of the
//! panicking thread. Recovery code running on the same thread (for example a
//! `CatchPanic` layer) picks it up with [`take_last_panic`] and logs it under
//! the `stack_trace` field.

use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::fmt;
use std::sync::Once;

use serde::{Deserialize, Serialize};

thread_local! {
    static LAST_PANIC: RefCell<Option<StackTrace>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// A single call frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub function: String,
    pub file: String,
    pub line: String,
}

/// Captured call stack of a thread together with the panic reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackTrace {
    pub thread: String,
    pub frames: Vec<Frame>,
    pub reason: String,
}

impl StackTrace {
    /// Capture the current thread's stack.
    pub fn capture(reason: impl Into<String>) -> Self {
        let backtrace = Backtrace::force_capture();
        Self {
            thread: current_thread_name(),
            frames: parse(&backtrace),
            reason: reason.into(),
        }
    }

    /// Drop the first `n` frames, always keeping at least one.
    pub fn skip(&self, n: usize) -> Self {
        let n = n.min(self.frames.len().saturating_sub(1));
        Self {
            thread: self.thread.clone(),
            frames: self.frames[n..].to_vec(),
            reason: self.reason.clone(),
        }
    }

    /// Drop the capture and unwinding frames so the trace starts at the
    /// code that panicked. Unchanged when no panic frame is present.
    pub fn skip_frames_after_panic(&self) -> Self {
        self.skip(self.internal_frame_count())
    }

    fn internal_frame_count(&self) -> usize {
        self.frames
            .iter()
            .rposition(is_panic_frame)
            .map(|index| index + 1)
            .filter(|count| *count < self.frames.len())
            .unwrap_or(0)
    }

    /// Frames as a JSON array, the shape logged under `stack_trace`.
    pub fn frames_json(&self) -> String {
        serde_json::to_string(&self.frames).unwrap_or_else(|_| "[]".to_string())
    }
}

impl fmt::Display for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panic in {}: {}", self.thread, self.reason)
    }
}

impl std::error::Error for StackTrace {}

fn is_panic_frame(frame: &Frame) -> bool {
    let function = frame.function.as_str();
    function.starts_with("core::panicking::")
        || function.starts_with("std::panicking::")
        || function.starts_with("std::panic::")
        || function == "rust_begin_unwind"
        || function.contains("__rust_end_short_backtrace")
}

fn current_thread_name() -> String {
    let thread = std::thread::current();
    thread
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{:?}", thread.id()))
}

/// Parse frames from a captured backtrace.
pub fn parse(backtrace: &Backtrace) -> Vec<Frame> {
    parse_text(&backtrace.to_string())
}

/// Parse frames from the textual form of a backtrace:
///
/// ```text
///    3: my_crate::handler
///              at ./src/handler.rs:12:9
/// ```
pub fn parse_text(text: &str) -> Vec<Frame> {
    let mut frames: Vec<Frame> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(location) = trimmed.strip_prefix("at ") {
            if let Some(frame) = frames.last_mut() {
                let (file, line) = split_location(location);
                frame.file = file;
                frame.line = line;
            }
            continue;
        }

        if let Some((index, function)) = trimmed.split_once(": ") {
            if !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()) {
                frames.push(Frame {
                    function: function.to_string(),
                    file: String::new(),
                    line: String::new(),
                });
            }
        }
    }

    frames
}

/// Split `path/to/file.rs:12:9` into file and line, dropping the column.
fn split_location(location: &str) -> (String, String) {
    let mut parts = location.rsplitn(3, ':');
    let last = parts.next().unwrap_or_default();
    let middle = parts.next();
    let rest = parts.next();

    match (rest, middle) {
        (Some(file), Some(line)) if is_number(line) && is_number(last) => {
            (file.to_string(), line.to_string())
        }
        _ => match location.rsplit_once(':') {
            Some((file, line)) if is_number(line) => (file.to_string(), line.to_string()),
            _ => (location.to_string(), String::new()),
        },
    }
}

fn is_number(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

/// Install a process-wide panic hook recording the stack of each panic.
///
/// The previously installed hook still runs afterwards. Calling this more
/// than once has no further effect.
pub fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let reason = if let Some(s) = info.payload().downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = info.payload().downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic payload".to_string()
            };
            let trace = StackTrace::capture(reason).skip_frames_after_panic();
            LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

/// Take the stack recorded by the last panic on this thread.
pub fn take_last_panic() -> Option<StackTrace> {
    LAST_PANIC.with(|slot| slot.borrow_mut().take())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "   0: commonlib_core::stacktrace::StackTrace::capture
             at ./src/stacktrace.rs:40:25
   1: std::panicking::rust_panic_with_hook
             at /rustc/abc/library/std/src/panicking.rs:836:13
   2: core::panicking::panic_fmt
             at /rustc/abc/library/core/src/panicking.rs:72:14
   3: my_service::handlers::orders
             at ./src/handlers.rs:12:9
   4: tokio::runtime::task::harness::poll
             at /cargo/tokio/src/runtime/task/harness.rs:473:9";

    fn frame(function: &str) -> Frame {
        Frame {
            function: function.to_string(),
            file: String::new(),
            line: String::new(),
        }
    }

    #[test]
    fn test_parse_text_reads_functions_and_locations() {
        let frames = parse_text(SAMPLE);
        assert_eq!(frames.len(), 5);
        assert_eq!(frames[3].function, "my_service::handlers::orders");
        assert_eq!(frames[3].file, "./src/handlers.rs");
        assert_eq!(frames[3].line, "12");
    }

    #[test]
    fn test_skip_frames_after_panic() {
        let trace = StackTrace {
            thread: "main".to_string(),
            frames: parse_text(SAMPLE),
            reason: "boom".to_string(),
        };

        let trimmed = trace.skip_frames_after_panic();
        assert_eq!(trimmed.frames.len(), 2);
        assert_eq!(trimmed.frames[0].function, "my_service::handlers::orders");
    }

    #[test]
    fn test_skip_frames_without_panic_frame_is_identity() {
        let trace = StackTrace {
            thread: "main".to_string(),
            frames: vec![frame("a"), frame("b")],
            reason: "boom".to_string(),
        };
        assert_eq!(trace.skip_frames_after_panic(), trace);
    }

    #[test]
    fn test_skip_keeps_last_frame() {
        let trace = StackTrace {
            thread: "main".to_string(),
            frames: vec![frame("a"), frame("b")],
            reason: "boom".to_string(),
        };
        assert_eq!(trace.skip(10).frames, vec![frame("b")]);
        assert_eq!(trace.skip(0).frames.len(), 2);
    }

    #[test]
    fn test_display() {
        let trace = StackTrace {
            thread: "worker-1".to_string(),
            frames: vec![],
            reason: "index out of bounds".to_string(),
        };
        assert_eq!(trace.to_string(), "panic in worker-1: index out of bounds");
    }

    #[test]
    fn test_panic_hook_records_trace() {
        install_panic_hook();
        let result = std::panic::catch_unwind(|| panic!("recorded panic"));
        assert!(result.is_err());

        let trace = take_last_panic().unwrap();
        assert_eq!(trace.reason, "recorded panic");
        assert!(!trace.frames.is_empty());
        assert!(trace.frames.iter().all(|f| !f.function.starts_with("std::panicking::")));
        assert!(take_last_panic().is_none());
    }
}
