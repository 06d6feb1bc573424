//! Connection pooling (spec §4.7.4): a free-list of slots, each
//! `Closed | Open | Busy`, shared by every SQL backend regardless of
//! which client crate it wraps.

use crate::storage::{StorageError, StorageResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Closed,
    Open,
    Busy,
}

struct Slot<C> {
    state: SlotState,
    conn: Option<C>,
}

/// How many fresh slots to add when the pool is exhausted (spec
/// §4.7.4: "grows the pool by a small constant (2)").
const GROWTH: usize = 2;

pub struct Pool<C> {
    slots: Vec<Slot<C>>,
    pinned: Option<usize>,
}

impl<C> Pool<C> {
    pub fn new() -> Self {
        Pool {
            slots: Vec::new(),
            pinned: None,
        }
    }

    /// Returns a usable slot index: the pinned transaction handle if
    /// one is bound, else any `Open` slot (marked `Busy`), else a
    /// freshly (re)connected `Closed` slot — growing the pool first if
    /// none is available.
    pub fn get_handle(
        &mut self,
        mut connect: impl FnMut() -> StorageResult<C>,
    ) -> StorageResult<usize> {
        if let Some(idx) = self.pinned {
            return Ok(idx);
        }
        if let Some(idx) = self.slots.iter().position(|s| s.state == SlotState::Open) {
            self.slots[idx].state = SlotState::Busy;
            return Ok(idx);
        }
        if let Some(idx) = self.slots.iter().position(|s| s.state == SlotState::Closed) {
            self.slots[idx].conn = Some(connect()?);
            self.slots[idx].state = SlotState::Busy;
            return Ok(idx);
        }
        let base = self.slots.len();
        for _ in 0..GROWTH {
            self.slots.push(Slot {
                state: SlotState::Closed,
                conn: None,
            });
        }
        self.slots[base].conn = Some(connect()?);
        self.slots[base].state = SlotState::Busy;
        Ok(base)
    }

    pub fn conn_mut(&mut self, idx: usize) -> StorageResult<&mut C> {
        self.slots
            .get_mut(idx)
            .and_then(|slot| slot.conn.as_mut())
            .ok_or_else(|| StorageError::Backend("pool slot has no live connection".to_string()))
    }

    /// Marks a `Busy` slot `Open` again. A no-op while `idx` is the
    /// pinned transaction handle (spec §4.7.4) — it stays bound until
    /// `commit`/`rollback` unpins it.
    pub fn release_handle(&mut self, idx: usize) {
        if self.pinned == Some(idx) {
            return;
        }
        if let Some(slot) = self.slots.get_mut(idx) {
            if slot.state == SlotState::Busy {
                slot.state = SlotState::Open;
            }
        }
    }

    pub fn pin(&mut self, idx: usize) -> StorageResult<()> {
        if self.pinned.is_some() {
            return Err(StorageError::Concurrency(
                "a transaction is already started on this storage".to_string(),
            ));
        }
        self.pinned = Some(idx);
        Ok(())
    }

    /// Releases the pinned handle, if any, returning its index so the
    /// caller can still issue a final `COMMIT`/`ROLLBACK` on it before
    /// calling `release_handle`.
    pub fn unpin(&mut self) -> Option<usize> {
        self.pinned.take()
    }

    pub fn is_transaction_active(&self) -> bool {
        self.pinned.is_some()
    }

    /// Closes every slot (spec §4.7.4: "on terminate, all slots are
    /// closed"). Dropping the connection values runs each client
    /// crate's own disconnect logic.
    pub fn close_all(&mut self) {
        for slot in &mut self.slots {
            slot.conn = None;
            slot.state = SlotState::Closed;
        }
        self.pinned = None;
    }
}

impl<C> Default for Pool<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_connect() -> StorageResult<u32> {
        Ok(1)
    }

    #[test]
    fn grows_by_two_when_exhausted() {
        let mut pool: Pool<u32> = Pool::new();
        let a = pool.get_handle(ok_connect).unwrap();
        let b = pool.get_handle(ok_connect).unwrap();
        assert_ne!(a, b);
        pool.release_handle(a);
        pool.release_handle(b);
        let c = pool.get_handle(ok_connect).unwrap();
        assert!(c == a || c == b, "reuses a released slot before growing further");
    }

    #[test]
    fn pinned_handle_survives_release() {
        let mut pool: Pool<u32> = Pool::new();
        let idx = pool.get_handle(ok_connect).unwrap();
        pool.pin(idx).unwrap();
        pool.release_handle(idx);
        assert!(pool.is_transaction_active());
        assert_eq!(pool.get_handle(ok_connect).unwrap(), idx);
    }

    #[test]
    fn double_pin_is_a_concurrency_error() {
        let mut pool: Pool<u32> = Pool::new();
        let idx = pool.get_handle(ok_connect).unwrap();
        pool.pin(idx).unwrap();
        let other = pool.get_handle(ok_connect).unwrap();
        assert!(matches!(pool.pin(other), Err(StorageError::Concurrency(_))));
    }
}
