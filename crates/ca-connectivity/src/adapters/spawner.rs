//! Thread-backed task spawner.

use std::thread;

use tracing::debug;

use crate::domain::{CaError, CaResult};
use crate::ports::TaskSpawner;

/// Runs each task on its own named OS thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSpawner {
    stack_size: Option<usize>,
}

impl ThreadSpawner {
    #[must_use]
    pub fn new() -> Self {
        Self { stack_size: None }
    }

    /// Use a fixed stack size for spawned threads.
    #[must_use]
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}

impl TaskSpawner for ThreadSpawner {
    fn spawn(&self, name: &str, task: Box<dyn FnOnce() + Send + 'static>) -> CaResult<()> {
        let mut builder = thread::Builder::new().name(name.to_string());
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }
        builder
            .spawn(task)
            .map(|_| debug!(task = name, "spawned background task"))
            .map_err(|e| CaError::failed(format!("cannot spawn {name}: {e}")))
    }
}
