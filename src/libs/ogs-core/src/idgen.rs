//! Identifier Generator
//!
//! Bounded-range integer allocator. Values are first handed out in
//! ascending order; once the cursor has passed the upper bound, released
//! values are reused in the order they were freed.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use crate::error::{PoolError, PoolResult};

#[derive(Debug)]
struct IdPoolState {
    /// Next never-issued value; may exceed `max`
    cursor: i64,
    /// Released values awaiting reuse
    released: VecDeque<i64>,
    /// Values held by live allocations
    in_use: HashSet<i64>,
}

/// Thread-safe allocator over the inclusive range `[min, max]`
#[derive(Debug)]
pub struct IdGenerator {
    name: String,
    min: i64,
    max: i64,
    state: Mutex<IdPoolState>,
}

impl IdGenerator {
    /// Create a generator over `[min, max]`
    pub fn new(name: &str, min: i64, max: i64) -> PoolResult<Self> {
        if min > max {
            return Err(PoolError::InvalidRange { min, max });
        }
        Ok(Self {
            name: name.to_string(),
            min,
            max,
            state: Mutex::new(IdPoolState {
                cursor: min,
                released: VecDeque::new(),
                in_use: HashSet::new(),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, IdPoolState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Allocate a value not currently held by anyone
    pub fn allocate(&self) -> PoolResult<i64> {
        let mut state = self.lock();

        let id = if state.cursor <= self.max {
            let id = state.cursor;
            state.cursor += 1;
            id
        } else if let Some(id) = state.released.pop_front() {
            id
        } else {
            return Err(PoolError::Exhausted {
                name: self.name.clone(),
                min: self.min,
                max: self.max,
            });
        };

        state.in_use.insert(id);
        Ok(id)
    }

    /// Return a value to the pool.
    ///
    /// Returns false (and changes nothing) if the value is not currently
    /// allocated, so a double free can never make a live id reissuable.
    pub fn free(&self, id: i64) -> bool {
        let mut state = self.lock();
        if !state.in_use.remove(&id) {
            log::warn!("[{}] free of unallocated id {}", self.name, id);
            return false;
        }
        state.released.push_back(id);
        true
    }

    /// Check whether `id` is held by a live allocation
    pub fn is_allocated(&self, id: i64) -> bool {
        self.lock().in_use.contains(&id)
    }

    /// Number of live allocations
    pub fn in_use(&self) -> usize {
        self.lock().in_use.len()
    }

    /// Range lower bound
    pub fn min(&self) -> i64 {
        self.min
    }

    /// Range upper bound
    pub fn max(&self) -> i64 {
        self.max
    }

    /// Pool name used in logs and errors
    pub fn name(&self) -> &str {
        &self.name
    }
}
