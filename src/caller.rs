//! Caller attribution for state updates.
//!
//! Frames are handled in a one-line textual form, most recent first:
//!
//! ```text
//! at app::counter::increment (/src/app/counter.rs:42:9)
//! at core::ops::function::FnOnce::call_once (<anonymous>)
//! at some_symbol_without_location
//! ```
//!
//! [`stack`] cleans a captured trace up for logging, [`caller`] picks the
//! single frame an update is attributed to, and [`capture`] renders the
//! current thread's backtrace into this form.

use crate::error::{Result, StoreError};
use std::backtrace::Backtrace;
use std::panic::Location;

/// Prefix that opens every frame line.
pub const FRAME_MARKER: &str = "at ";

/// Location text of frames with no source file.
pub const ANONYMOUS: &str = "<anonymous>";

/// Caller reported when attribution is disabled.
pub const UNKNOWN_CALLER: &str = "<unknown>";

/// How updates are attributed to a call site.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Attribution {
    /// `#[track_caller]` location of the update call. Cheap and exact.
    #[default]
    Location,
    /// Capture a backtrace and resolve the caller from it.
    Backtrace,
    /// No attribution; the log carries an empty stack.
    Disabled,
}

/// Symbol prefixes of the store's own update machinery.
pub fn default_internal_frames() -> Vec<String> {
    ["store", "registry", "binding", "caller"]
        .iter()
        .map(|module| format!("{}::{}::", env!("CARGO_CRATE_NAME"), module))
        .collect()
}

/// Trim every frame and strip its marker, keeping order.
pub fn stack(raw: &str) -> Result<Vec<String>> {
    let frames: Vec<String> = frame_lines(raw)
        .map(|line| strip_marker(line).to_string())
        .collect();

    if frames.is_empty() {
        return Err(StoreError::CallerResolution("empty stack".to_string()));
    }
    Ok(frames)
}

/// Pick the frame an update is attributed to.
///
/// Internal and anonymous frames are skipped. Among the rest, the first
/// change of source file marks where the store's call chain ends; the frame
/// just before it is the caller. Without such a change the last retained
/// frame is used.
pub fn caller(raw: &str, internal: &[String]) -> Result<String> {
    let mut previous: Option<(&str, &str)> = None;

    for line in frame_lines(raw) {
        let frame = strip_marker(line);
        if is_internal(frame, internal) {
            continue;
        }
        let Some(file) = location_of(frame).and_then(file_of) else {
            continue;
        };

        if let Some((prev_file, prev_frame)) = previous {
            if prev_file != file {
                return Ok(prev_frame.to_string());
            }
        }
        previous = Some((file, frame));
    }

    previous
        .map(|(_, frame)| frame.to_string())
        .ok_or_else(|| StoreError::CallerResolution("no attributable frame in stack".to_string()))
}

/// Render the current backtrace as frame lines.
///
/// Frames of the backtrace machinery and of this module are dropped from
/// the top, so the first line is the code that asked for attribution.
pub fn capture() -> String {
    let rendered = Backtrace::force_capture().to_string();
    let mut frames = parse_backtrace(&rendered);

    let skip = frames
        .iter()
        .take_while(|(symbol, _)| is_capture_frame(symbol))
        .count();
    frames.drain(..skip);

    frames
        .iter()
        .map(|(symbol, location)| match location {
            Some(location) => format!("{FRAME_MARKER}{symbol} ({location})"),
            None => format!("{FRAME_MARKER}{symbol}"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Stack and caller for one update, per the configured mode.
pub(crate) fn attribute(
    mode: Attribution,
    location: &'static Location<'static>,
    internal: &[String],
) -> Result<(Vec<String>, String)> {
    match mode {
        Attribution::Location => {
            let frame = format!("{}:{}:{}", location.file(), location.line(), location.column());
            Ok((vec![frame.clone()], frame))
        }
        Attribution::Backtrace => {
            let raw = capture();
            Ok((stack(&raw)?, caller(&raw, internal)?))
        }
        Attribution::Disabled => Ok((Vec::new(), UNKNOWN_CALLER.to_string())),
    }
}

/// Strip the leading frame marker (and surrounding space).
pub fn strip_marker(line: &str) -> &str {
    let line = line.trim();
    line.strip_prefix(FRAME_MARKER)
        .map(str::trim_start)
        .unwrap_or(line)
}

fn frame_lines(raw: &str) -> impl Iterator<Item = &str> {
    raw.lines().map(str::trim).filter(|line| !line.is_empty())
}

fn is_internal(frame: &str, internal: &[String]) -> bool {
    let symbol = frame.strip_prefix('<').unwrap_or(frame);
    internal.iter().any(|prefix| symbol.starts_with(prefix.as_str()))
}

/// Text inside the trailing parentheses of a frame.
fn location_of(frame: &str) -> Option<&str> {
    let inner = frame.strip_suffix(')')?;
    let open = inner.rfind('(')?;
    let location = inner[open + 1..].trim();
    if location.is_empty() || location == ANONYMOUS {
        None
    } else {
        Some(location)
    }
}

/// File name of a `path:line:col` location.
fn file_of(location: &str) -> Option<&str> {
    let mut path = location;
    for _ in 0..2 {
        match path.rsplit_once(':') {
            Some((head, tail)) if !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) => {
                path = head;
            }
            _ => break,
        }
    }

    let file = path.rsplit(['/', '\\']).next()?;
    if file.is_empty() {
        None
    } else {
        Some(file)
    }
}

fn is_capture_frame(symbol: &str) -> bool {
    let own = format!("{}::caller::", env!("CARGO_CRATE_NAME"));
    symbol.starts_with("std::backtrace") || symbol.starts_with(own.as_str())
}

/// Parse `Backtrace`'s display output into `(symbol, location)` pairs.
///
/// Symbol lines look like `  3: path::to::fn` (inlined symbols omit the
/// index); a following `at file:line:col` line carries the location.
fn parse_backtrace(rendered: &str) -> Vec<(String, Option<String>)> {
    let mut frames: Vec<(String, Option<String>)> = Vec::new();

    for line in frame_lines(rendered) {
        if let Some(location) = line.strip_prefix(FRAME_MARKER) {
            if let Some(last) = frames.last_mut() {
                if last.1.is_none() {
                    last.1 = Some(location.trim().to_string());
                }
            }
            continue;
        }

        let symbol = match line.split_once(": ") {
            Some((index, rest)) if index.bytes().all(|b| b.is_ascii_digit()) => rest,
            _ => line,
        };
        frames.push((symbol.trim().to_string(), None));
    }

    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    fn internal() -> Vec<String> {
        default_internal_frames()
    }

    #[test]
    fn test_stack_strips_markers() {
        let raw = "  at a::one (/src/a.rs:1:1)\n\tat b::two (/src/b.rs:2:2)\n";
        let frames = stack(raw).unwrap();
        assert_eq!(frames, vec!["a::one (/src/a.rs:1:1)", "b::two (/src/b.rs:2:2)"]);
    }

    #[test]
    fn test_stack_keeps_unmarked_lines() {
        let frames = stack("plain frame").unwrap();
        assert_eq!(frames, vec!["plain frame"]);
    }

    #[test]
    fn test_stack_empty_fails() {
        assert!(matches!(stack("  \n"), Err(StoreError::CallerResolution(_))));
    }

    #[test]
    fn test_caller_returns_last_frame_before_file_boundary() {
        let raw = "at app::click (/src/A.rs:10:5)\n\
                   at app::handler (/src/A.rs:20:5)\n\
                   at ui::dispatch (/src/B.rs:30:5)";
        assert_eq!(caller(raw, &internal()).unwrap(), "app::handler (/src/A.rs:20:5)");
    }

    #[test]
    fn test_caller_skips_internal_and_anonymous_frames() {
        let raw = "at state_context::store::Store::update (/src/store.rs:1:1)\n\
                   at <state_context::binding::Setter>::set (/src/binding.rs:2:2)\n\
                   at core::ops::function::Fn::call (<anonymous>)\n\
                   at app::toggle (/src/app.rs:5:5)\n\
                   at runtime::tick (/src/runtime.rs:6:6)";
        assert_eq!(caller(raw, &internal()).unwrap(), "app::toggle (/src/app.rs:5:5)");
    }

    #[test]
    fn test_caller_skips_frames_without_location() {
        let raw = "at no_location_here\n\
                   at app::a (/src/app.rs:1:1)\n\
                   at app::b (/src/app.rs:2:1)";
        assert_eq!(caller(raw, &internal()).unwrap(), "app::b (/src/app.rs:2:1)");
    }

    #[test]
    fn test_caller_without_boundary_returns_last_retained() {
        let raw = "at app::a (/src/app.rs:1:1)\n\
                   at app::b (/src/app.rs:2:1)\n\
                   at <anonymous_thing> (<anonymous>)";
        assert_eq!(caller(raw, &internal()).unwrap(), "app::b (/src/app.rs:2:1)");
    }

    #[test]
    fn test_caller_with_nothing_attributable_fails() {
        let raw = "at state_context::store::Store::update (/src/store.rs:1:1)\n\
                   at helper (<anonymous>)";
        assert!(matches!(
            caller(raw, &internal()),
            Err(StoreError::CallerResolution(_))
        ));
    }

    #[test]
    fn test_file_of_handles_separators() {
        assert_eq!(file_of("/a/b/c.rs:1:2"), Some("c.rs"));
        assert_eq!(file_of("C:\\work\\app.rs:7:1"), Some("app.rs"));
        assert_eq!(file_of("./tests/integration.rs:12"), Some("integration.rs"));
        assert_eq!(file_of("/trailing/"), None);
    }

    #[test]
    fn test_parse_backtrace_pairs_locations() {
        let rendered = "   0: std::backtrace::Backtrace::create\n\
                        \x20            at /rustc/library/std/src/backtrace.rs:331:13\n\
                        \x20  1: app::main\n\
                        \x20            at ./src/main.rs:4:5\n\
                        \x20     app::inlined\n\
                        \x20  2: __libc_start_main";
        let frames = parse_backtrace(rendered);
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[1].0, "app::main");
        assert_eq!(frames[1].1.as_deref(), Some("./src/main.rs:4:5"));
        assert_eq!(frames[2], ("app::inlined".to_string(), None));
        assert_eq!(frames[3], ("__libc_start_main".to_string(), None));
    }

    #[test]
    fn test_attribute_location_mode() {
        let location = Location::caller();
        let (frames, caller) = attribute(Attribution::Location, location, &internal()).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(caller.contains("caller.rs"));
    }

    #[test]
    fn test_attribute_disabled_mode() {
        let (frames, caller) =
            attribute(Attribution::Disabled, Location::caller(), &internal()).unwrap();
        assert!(frames.is_empty());
        assert_eq!(caller, UNKNOWN_CALLER);
    }

    #[test]
    fn test_capture_drops_own_frames() {
        let raw = capture();
        let first = raw.lines().next().unwrap_or_default();
        assert!(!first.contains("std::backtrace"));
        assert!(!first.contains("caller::capture"));
    }
}
