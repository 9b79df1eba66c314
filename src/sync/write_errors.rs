use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

use crate::access::Mutation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFailure {
    pub mutation: Mutation,
    pub target: String,
    pub message: String,
}

pub type WriteErrorHook = Arc<dyn Fn(&WriteFailure) + Send + Sync>;

/// Where failed writes go. Failures are always logged and otherwise dropped;
/// an optional hook lets callers observe them. Nothing is retried.
#[derive(Clone, Default)]
pub struct WriteErrorSink {
    hook: Arc<RwLock<Option<WriteErrorHook>>>,
}

impl WriteErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_hook(&self, hook: WriteErrorHook) {
        *self.hook.write() = Some(hook);
    }

    pub fn clear_hook(&self) {
        *self.hook.write() = None;
    }

    pub fn report(&self, mutation: Mutation, target: &str, error: &dyn fmt::Display) {
        tracing::error!(mutation = mutation.as_str(), "Write to {} failed: {}", target, error);

        let hook = self.hook.read().clone();
        if let Some(hook) = hook {
            hook(&WriteFailure {
                mutation,
                target: target.to_string(),
                message: error.to_string(),
            });
        }
    }
}
