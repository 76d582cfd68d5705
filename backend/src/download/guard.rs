//! Process-wide deduplication of in-flight operations per content key

use crate::error::{Error, Result};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Kind of operation running for a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Download,
    Delete,
}

type Outcome = Shared<BoxFuture<'static, std::result::Result<(), Arc<Error>>>>;
type Running = Arc<Mutex<HashMap<String, (Operation, Outcome)>>>;

/// Map of content key to the outcome of the operation running for it
#[derive(Clone, Default)]
pub struct InFlightGuard {
    running: Running,
}

/// Removes the key once the operation ends, even if it panicked
struct Release {
    running: Running,
    key: String,
}

impl Drop for Release {
    fn drop(&mut self) {
        self.running.lock().remove(&self.key);
    }
}

impl InFlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` for `key` unless an operation is already running for it.
    ///
    /// A caller asking for the same operation joins the running one and
    /// receives its outcome; `work` is then dropped unpolled. A download
    /// asked for while a delete runs is declined with `Ok(())`; a delete
    /// asked for while a download runs fails with [`Error::Busy`]. The work
    /// runs on its own task, so it completes even if every caller stops
    /// waiting.
    pub async fn run<F>(&self, key: String, operation: Operation, work: F) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let outcome = {
            let mut running = self.running.lock();
            match running.get(&key) {
                Some((current, outcome)) if *current == operation => {
                    debug!("Joining in-flight {:?} of {}", operation, key);
                    outcome.clone()
                }
                Some((Operation::Delete, _)) if operation == Operation::Download => {
                    debug!("Not downloading {}: delete in flight", key);
                    return Ok(());
                }
                Some((current, _)) => {
                    debug!("Refusing {:?} of {}: {:?} in flight", operation, key, current);
                    return Err(Error::Busy(key));
                }
                None => {
                    let release = Release {
                        running: Arc::clone(&self.running),
                        key: key.clone(),
                    };
                    let handle = tokio::spawn(async move {
                        let _release = release;
                        work.await
                    });
                    let outcome: Outcome = async move {
                        match handle.await {
                            Ok(result) => result.map_err(Arc::new),
                            Err(e) => Err(Arc::new(Error::Task(e.to_string()))),
                        }
                    }
                    .boxed()
                    .shared();
                    running.insert(key, (operation, outcome.clone()));
                    outcome
                }
            }
        };

        outcome.await.map_err(Error::Shared)
    }

    /// Whether any operation is running for `key`
    pub fn is_running(&self, key: &str) -> bool {
        self.running.lock().contains_key(key)
    }
}
