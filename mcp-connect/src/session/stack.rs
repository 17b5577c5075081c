//! Ordered, idempotent release of acquired resources.

use std::fmt;
use std::mem;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::error::Result;

/// Something acquired while opening a session that must be released.
#[async_trait]
pub trait Resource: Send {
    /// Short label used in diagnostics.
    fn name(&self) -> &str;

    /// Releases the resource.
    async fn release(self: Box<Self>) -> Result<()>;
}

/// Resources in acquisition order, released last-in first-out.
///
/// `release_all` empties the stack, so calling it again is a no-op. A stack
/// dropped while still holding resources releases them on a background task
/// of the current Tokio runtime, or simply drops them outside one.
#[derive(Default)]
pub struct ResourceStack {
    entries: Vec<Box<dyn Resource>>,
}

impl ResourceStack {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a newly acquired resource.
    pub fn push<R: Resource + 'static>(&mut self, resource: R) {
        debug!(resource = resource.name(), "acquired session resource");
        self.entries.push(Box::new(resource));
    }

    /// Number of held resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Moves every resource of `other` on top of this stack.
    pub fn append(&mut self, other: &mut Self) {
        self.entries.append(&mut other.entries);
    }

    /// Releases every resource in reverse acquisition order.
    ///
    /// A failing release does not stop the others.
    ///
    /// # Errors
    ///
    /// Returns the first release failure, after all releases were attempted.
    pub async fn release_all(&mut self) -> Result<()> {
        let mut first_error = None;
        while let Some(resource) = self.entries.pop() {
            let name = resource.name().to_owned();
            match resource.release().await {
                Ok(()) => debug!(resource = %name, "released session resource"),
                Err(e) => {
                    warn!(resource = %name, error = %e, "failed to release session resource");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for ResourceStack {
    fn drop(&mut self) {
        if self.entries.is_empty() {
            return;
        }

        let mut orphaned = Self {
            entries: mem::take(&mut self.entries),
        };
        let Ok(handle) = Handle::try_current() else {
            warn!(resources = orphaned.len(), "no runtime to release session resources, dropping them");
            orphaned.entries.clear();
            return;
        };

        debug!(resources = orphaned.len(), "releasing orphaned session resources");
        drop(handle.spawn(async move {
            if let Err(e) = orphaned.release_all().await {
                warn!(error = %e, "failed to release orphaned session resources");
            }
        }));
    }
}

impl fmt::Debug for ResourceStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|r| r.name()))
            .finish()
    }
}
