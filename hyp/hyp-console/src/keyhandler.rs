//! Single-key debug commands.
//!
//! Subsystems register a handler per key; the console driver calls
//! [`KeyHandlerTable::handle`] when the operator presses one. Handlers report
//! through the `log` facade.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use hyp_sync::SpinLock;
use log::{info, warn};

/// Prints the list of registered keys; cannot be taken by a subsystem.
pub const HELP_KEY: char = 'h';

pub trait KeyHandler: Send + Sync {
    fn handle(&self, key: char);
}

impl<F> KeyHandler for F
where
    F: Fn(char) + Send + Sync,
{
    fn handle(&self, key: char) {
        self(key);
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum KeyHandlerError {
    #[error("debug key '{0}' is reserved")]
    Reserved(char),
}

struct Entry {
    description: &'static str,
    handler: Arc<dyn KeyHandler>,
}

#[derive(Default)]
pub struct KeyHandlerTable {
    entries: SpinLock<BTreeMap<char, Entry>>,
}

impl KeyHandlerTable {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: SpinLock::new(BTreeMap::new()),
        }
    }

    /// Bind `key` to `handler`, replacing any previous binding.
    ///
    /// # Errors
    /// [`KeyHandlerError::Reserved`] for [`HELP_KEY`].
    pub fn register(
        &self,
        key: char,
        description: &'static str,
        handler: Arc<dyn KeyHandler>,
    ) -> Result<(), KeyHandlerError> {
        if key == HELP_KEY {
            return Err(KeyHandlerError::Reserved(key));
        }
        let previous = self.entries.with_lock(|entries| {
            entries.insert(
                key,
                Entry {
                    description,
                    handler,
                },
            )
        });
        if let Some(previous) = previous {
            warn!(
                "debug key '{key}' rebound (was: {})",
                previous.description
            );
        }
        Ok(())
    }

    /// Dispatch `key`. Returns `false` if nothing is bound to it.
    pub fn handle(&self, key: char) -> bool {
        if key == HELP_KEY {
            self.help();
            return true;
        }
        // Clone out so the handler runs without the table lock held.
        let handler = self
            .entries
            .with_lock(|entries| entries.get(&key).map(|e| Arc::clone(&e.handler)));
        handler.is_some_and(|h| {
            h.handle(key);
            true
        })
    }

    /// Registered keys and descriptions, in key order.
    pub fn keys(&self) -> Vec<(char, &'static str)> {
        self.entries
            .with_lock(|entries| entries.iter().map(|(k, e)| (*k, e.description)).collect())
    }

    pub fn help(&self) {
        info!("'{HELP_KEY}' pressed -> showing installed handlers");
        for (key, description) in self.keys() {
            info!(" key '{key}' (ascii '{:02x}') => {description}", key as u32);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn help_key_is_reserved() {
        let table = KeyHandlerTable::new();
        let err = table
            .register(HELP_KEY, "nope", Arc::new(|_key: char| {}))
            .unwrap_err();
        assert_eq!(err, KeyHandlerError::Reserved('h'));
        assert!(table.handle(HELP_KEY));
    }

    #[test]
    fn rebinding_replaces_handler() {
        let table = KeyHandlerTable::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&first);
        let s = Arc::clone(&second);
        table
            .register('K', "first", Arc::new(move |_key: char| {
                f.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        table
            .register('K', "second", Arc::new(move |_key: char| {
                s.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        assert!(table.handle('K'));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(table.keys(), vec![('K', "second")]);
    }
}
