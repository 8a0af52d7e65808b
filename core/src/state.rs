//! Scoped loading bookkeeping for the observable state containers.
//!
//! Every state type keeps a count of operations in flight; it reads as
//! "loading" while the count is non-zero. `LoadingGuard` bumps the count when
//! an operation starts and drops it again when the guard goes out of scope,
//! so the flag is reset on success, on error, and when the operation's future
//! is dropped half-way.

use tokio::sync::watch;

pub(crate) trait InFlight {
    fn in_flight(&mut self) -> &mut usize;
}

pub(crate) struct LoadingGuard<'a, S: InFlight> {
    state: &'a watch::Sender<S>,
}

impl<'a, S: InFlight> LoadingGuard<'a, S> {
    pub(crate) fn begin(state: &'a watch::Sender<S>) -> Self {
        state.send_modify(|s| *s.in_flight() += 1);
        Self { state }
    }
}

impl<S: InFlight> Drop for LoadingGuard<'_, S> {
    fn drop(&mut self) {
        self.state.send_modify(|s| {
            let count = s.in_flight();
            *count = count.saturating_sub(1);
        });
    }
}
