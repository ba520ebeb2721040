use crate::executor::SerialExecutorRef;
use crate::executor::tracking;
use std::sync::LazyLock;
use tracing::{error, warn};

/// Environment variable selecting how [`report_unexpected_executor`] reacts:
/// `0` ignores, `1` logs a warning, `2` logs an error and panics.
const LOG_LEVEL_ENV: &str = "STAGEHAND_UNEXPECTED_EXECUTOR_LOG_LEVEL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnexpectedExecutorLogLevel {
    Ignore,
    Warn,
    Crash,
}

impl UnexpectedExecutorLogLevel {
    fn from_env() -> Self {
        match std::env::var(LOG_LEVEL_ENV).as_deref().map(str::trim) {
            Ok("0") => Self::Ignore,
            Ok("1") => Self::Warn,
            _ => Self::Crash,
        }
    }
}

static LOG_LEVEL: LazyLock<UnexpectedExecutorLogLevel> =
    LazyLock::new(UnexpectedExecutorLogLevel::from_env);

/// Checks that the current thread runs on `expected`.
///
/// Returns `true` on a match, either by identity or because a custom
/// executor reports sharing `expected`'s exclusive context. Otherwise a
/// custom `expected` gets to prove isolation through
/// [`check_isolated`](crate::executor::SerialExecutor::check_isolated), and
/// anything else panics.
#[track_caller]
pub fn is_current_executor(expected: &SerialExecutorRef) -> bool {
    let current = tracking::current_executor();
    if current == *expected || current.is_complex_equal(expected) {
        return true;
    }

    match expected {
        SerialExecutorRef::Custom(custom) => {
            custom.check_isolated();
            true
        }
        _ => incorrect_executor(expected, &current),
    }
}

#[cold]
#[track_caller]
fn incorrect_executor(expected: &SerialExecutorRef, current: &SerialExecutorRef) -> ! {
    panic!("incorrect actor executor assumption; expected {expected:?}, current {current:?}")
}

/// Reports actor-isolated code at `file:line` running off `executor`.
pub fn report_unexpected_executor(file: &str, line: u32, executor: &SerialExecutorRef) {
    let current = tracking::current_executor();

    match *LOG_LEVEL {
        UnexpectedExecutorLogLevel::Ignore => {}
        UnexpectedExecutorLogLevel::Warn => {
            warn!(
                ?executor, ?current,
                "data race detected: actor-isolated function at {file}:{line} was not called on the same actor"
            );
        }
        UnexpectedExecutorLogLevel::Crash => {
            error!(
                ?executor, ?current,
                "data race detected: actor-isolated function at {file}:{line} was not called on the same actor"
            );
            panic!(
                "data race detected: actor-isolated function at {file}:{line} was not called on the same actor"
            );
        }
    }
}
