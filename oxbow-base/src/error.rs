// Error handling wants three things here:
// 1. Backtraces captured at construction, since most faults surface a long
//    way from where they were made.
// 2. One place to set a breakpoint that traps every error in the system
//    soon after it exists (or at least when a library error propagates
//    back into our code).
// 3. Every error echoed into the tracing stream as it is constructed.

use backtrace_error::DynBacktraceError;
use std::borrow::Cow;
use tracing::error;

#[cfg(test)]
use test_log::test;

#[derive(Debug)]
pub struct Error(DynBacktraceError);
pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

struct MsgErr(Cow<'static, str>);

impl std::fmt::Debug for MsgErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
impl std::fmt::Display for MsgErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
impl std::error::Error for MsgErr {}

impl<E: std::error::Error + Send + Sync + 'static> From<E> for Error {
    fn from(err: E) -> Error {
        Error::new(err)
    }
}

impl Error {
    pub fn new<E: std::error::Error + Send + Sync + 'static>(err: E) -> Error {
        error!(target: "oxbow", "{:?}", err);
        Error(DynBacktraceError::from(err))
    }
}

pub fn err(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::new(MsgErr(msg.into()))
}

/// Shorthand for the common `return Err(err(..))` tail.
pub fn fail<T>(msg: impl Into<Cow<'static, str>>) -> Result<T> {
    Err(err(msg))
}

#[test]
fn test_error_construction() {
    let e = err("boom");
    assert!(format!("{}", e).contains("boom"));
    let r: Result<()> = fail("no such thing");
    assert!(r.is_err());
}
