use std::future::Future;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

/// Outcome of [`race`], so callers can tell a fallback from a real result.
#[derive(Debug, Clone, PartialEq)]
pub enum Guarded<T> {
    Completed(T),
    TimedOut(T),
    Cancelled(T),
}

impl<T> Guarded<T> {
    pub fn into_inner(self) -> T {
        match self {
            Guarded::Completed(v) | Guarded::TimedOut(v) | Guarded::Cancelled(v) => v,
        }
    }
}

/// Race `op` against `deadline`, returning `fallback` if the deadline wins.
///
/// `cancel` is shared with the operation. When the deadline elapses the token
/// is cancelled and `op` is dropped, which aborts whatever request it had in
/// flight. A token cancelled from outside also resolves to the fallback.
pub async fn race<F, T>(op: F, fallback: T, deadline: Duration, cancel: &CancellationToken) -> Guarded<T>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        out = op => Guarded::Completed(out),
        _ = cancel.cancelled() => Guarded::Cancelled(fallback),
        _ = time::sleep(deadline) => {
            cancel.cancel();
            Guarded::TimedOut(fallback)
        }
    }
}
