//! Command List Pool
//!
//! Recycles [`CommandList`] allocations across passes and frames.
//!
//! # Lifecycle
//!
//! ```text
//!   get(name) ──► PooledCommandList ──► record ──► ctx.execute(&list)
//!                        │                                  │
//!                        │ drop                             │
//!                        ▼                                  │
//!                 cleared, back in pool ◄───────────────────┘
//!
//!   detach() ──► CommandList (owned) ──► give_back(list) ──► pool
//! ```
//!
//! The guard returns its list on drop, so the common path cannot forget a
//! release. Detached lists must be returned through
//! [`CommandListPool::give_back`], which rejects lists this pool does not
//! have checked out (double release or foreign list) instead of corrupting
//! the free list.

use std::ops::{Deref, DerefMut};

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use super::command::CommandList;
use crate::errors::{PipelineError, Result};

#[derive(Default)]
struct PoolState {
    free: Vec<CommandList>,
    checked_out: FxHashSet<u64>,
    next_id: u64,
}

/// Pool of reusable command lists.
///
/// Shared between components as `Arc<CommandListPool>`; all methods take
/// `&self`.
#[derive(Default)]
pub struct CommandListPool {
    state: Mutex<PoolState>,
}

impl CommandListPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks out a list, reusing a free one when available.
    pub fn get(&self, name: &str) -> PooledCommandList<'_> {
        let mut state = self.state.lock();
        let mut list = match state.free.pop() {
            Some(list) => list,
            None => {
                let id = state.next_id;
                state.next_id += 1;
                CommandList::new(id)
            }
        };
        list.name.clear();
        list.name.push_str(name);
        state.checked_out.insert(list.id);

        PooledCommandList {
            pool: self,
            list,
            detached: false,
        }
    }

    /// Returns a detached list to the pool.
    ///
    /// Fails with [`PipelineError::CommandListNotAcquired`] if the list is not
    /// currently checked out from this pool; the pool is left untouched.
    pub fn give_back(&self, mut list: CommandList) -> Result<()> {
        let mut state = self.state.lock();
        if !state.checked_out.remove(&list.id) {
            log::error!(
                "Trying to release command list '{}' (#{}) that is not checked out",
                list.name,
                list.id
            );
            return Err(PipelineError::CommandListNotAcquired {
                id: list.id,
                name: std::mem::take(&mut list.name),
            });
        }
        list.clear();
        state.free.push(list);
        Ok(())
    }

    /// Lists currently sitting in the pool.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.state.lock().free.len()
    }

    /// Lists handed out and not yet returned.
    #[must_use]
    pub fn checked_out_count(&self) -> usize {
        self.state.lock().checked_out.len()
    }
}

/// Scope guard over a checked-out [`CommandList`].
///
/// Dereferences to the list; returns it to the pool when dropped.
pub struct PooledCommandList<'a> {
    pool: &'a CommandListPool,
    list: CommandList,
    detached: bool,
}

impl PooledCommandList<'_> {
    /// Takes ownership of the list. It stays checked out until passed to
    /// [`CommandListPool::give_back`].
    #[must_use]
    pub fn detach(mut self) -> CommandList {
        self.detached = true;
        std::mem::replace(&mut self.list, CommandList::new(u64::MAX))
    }
}

impl Deref for PooledCommandList<'_> {
    type Target = CommandList;

    fn deref(&self) -> &CommandList {
        &self.list
    }
}

impl DerefMut for PooledCommandList<'_> {
    fn deref_mut(&mut self) -> &mut CommandList {
        &mut self.list
    }
}

impl Drop for PooledCommandList<'_> {
    fn drop(&mut self) {
        if self.detached {
            return;
        }
        let list = std::mem::replace(&mut self.list, CommandList::new(u64::MAX));
        // Failure is already logged by the pool.
        let _ = self.pool.give_back(list);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_returns_list_on_drop() {
        let pool = CommandListPool::new();
        {
            let mut cmd = pool.get("Opaque");
            cmd.set_global_float("_Test", 1.0);
            assert_eq!(pool.checked_out_count(), 1);
        }
        assert_eq!(pool.checked_out_count(), 0);
        assert_eq!(pool.free_count(), 1);

        let cmd = pool.get("Transparent");
        assert!(cmd.is_empty(), "recycled list must be cleared");
        assert_eq!(cmd.name, "Transparent");
    }

    #[test]
    fn test_double_release_is_rejected() {
        let pool = CommandListPool::new();
        let list = pool.get("Shadows").detach();
        let id = list.id();
        assert!(pool.give_back(list).is_ok());

        let mut forged = CommandList::new(id);
        forged.name = "Shadows".into();
        let err = pool.give_back(forged).unwrap_err();
        assert!(matches!(err, PipelineError::CommandListNotAcquired { .. }));
        assert_eq!(pool.free_count(), 1, "rejected release must not grow the pool");
    }
}
