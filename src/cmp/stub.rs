//! The `__tcfapi` entry point that exists before the CMP is ready.
//!
//! Calls made before [`TcfApiStub::attach`] are queued verbatim. Attaching a
//! [`CmpApi`] replays the queue in arrival order, then every later call is
//! forwarded directly. The stub is cheap to clone; all clones share one queue.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::cmp::api::{CmpApi, TcfCallback};

/// A call captured before the CMP was ready.
pub struct StubCall {
    pub command: String,
    pub version: u32,
    pub callback: TcfCallback,
    pub parameter: Option<Value>,
}

impl fmt::Debug for StubCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StubCall")
            .field("command", &self.command)
            .field("version", &self.version)
            .field("parameter", &self.parameter)
            .finish_non_exhaustive()
    }
}

impl StubCall {
    fn dispatch(self, api: &CmpApi) {
        api.handle(&self.command, self.version, self.callback, self.parameter);
    }
}

enum StubState {
    Queued(VecDeque<StubCall>),
    Forwarding(Arc<CmpApi>),
}

#[derive(Clone)]
pub struct TcfApiStub {
    state: Arc<Mutex<StubState>>,
}

impl fmt::Debug for TcfApiStub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcfApiStub")
            .field("attached", &self.is_attached())
            .field("queued", &self.queued())
            .finish()
    }
}

impl Default for TcfApiStub {
    fn default() -> Self {
        Self::new()
    }
}

impl TcfApiStub {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StubState::Queued(VecDeque::new()))),
        }
    }

    fn state(&self) -> MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `__tcfapi(command, version, callback, parameter)`.
    pub fn call<S: Into<String>>(&self, command: S, version: u32, callback: TcfCallback, parameter: Option<Value>) {
        let call = StubCall {
            command: command.into(),
            version,
            callback,
            parameter,
        };

        let api = match &mut *self.state() {
            StubState::Queued(queue) => {
                log::trace!("queueing {} until the cmp is ready", call.command);
                queue.push_back(call);
                return;
            }
            StubState::Forwarding(api) => api.clone(),
        };
        call.dispatch(&api);
    }

    /// Hands the queue to `api` and switches to forwarding.
    ///
    /// Calls that arrive while the queue is being replayed (including calls
    /// made from inside callbacks) are appended and replayed in turn, so the
    /// overall order is preserved. Attaching twice is a no-op.
    pub fn attach(&self, api: Arc<CmpApi>) {
        let mut replayed = 0usize;
        loop {
            let batch = {
                let mut state = self.state();
                let StubState::Queued(queue) = &mut *state else {
                    log::warn!("tcf api stub is already attached");
                    return;
                };
                if queue.is_empty() {
                    *state = StubState::Forwarding(api.clone());
                    break;
                }
                std::mem::take(queue)
            };

            replayed += batch.len();
            for call in batch {
                call.dispatch(&api);
            }
        }
        log::debug!("tcf api stub attached, replayed {replayed} queued calls");
    }

    pub fn is_attached(&self) -> bool {
        matches!(&*self.state(), StubState::Forwarding(_))
    }

    /// Number of calls waiting for [`TcfApiStub::attach`].
    pub fn queued(&self) -> usize {
        match &*self.state() {
            StubState::Queued(queue) => queue.len(),
            StubState::Forwarding(_) => 0,
        }
    }
}
