//! A single lazily loaded dataset slot.

use arc_swap::ArcSwap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

/// What a reader finds in a slot.
#[derive(Debug)]
pub enum EntryStatus<T> {
    Ready(Arc<T>),
    Loading,
    Unloaded,
    /// The last load failed; kept until the slot is unloaded.
    Failed(String),
}

#[derive(Debug)]
enum State<T> {
    Empty,
    Loading,
    Ready(Arc<T>),
    Failed(String),
}

/// Cache slot: EMPTY -> LOADING -> READY | FAILED -> EMPTY.
///
/// Only the caller whose [`reserve`](CacheEntry::reserve) succeeded may
/// [`set`](CacheEntry::set) the slot.
#[derive(Debug)]
pub struct CacheEntry<T> {
    state: RwLock<State<T>>,
    last_used: ArcSwap<SystemTime>,
}

impl<T> Default for CacheEntry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CacheEntry<T> {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::Empty),
            last_used: ArcSwap::from_pointee(UNIX_EPOCH),
        }
    }

    /// Current content. A READY read refreshes `last_used`.
    pub fn get(&self) -> EntryStatus<T> {
        let status = match &*self.state.read() {
            State::Empty => EntryStatus::Unloaded,
            State::Loading => EntryStatus::Loading,
            State::Failed(reason) => EntryStatus::Failed(reason.clone()),
            State::Ready(dataset) => EntryStatus::Ready(dataset.clone()),
        };
        if matches!(status, EntryStatus::Ready(_)) {
            self.touch();
        }
        status
    }

    /// Claim an EMPTY slot for loading. Returns `true` iff this caller now
    /// owns the load.
    pub fn reserve(&self) -> bool {
        let mut state = self.state.write();
        if matches!(*state, State::Empty) {
            *state = State::Loading;
            true
        } else {
            false
        }
    }

    /// Complete a reserved load with its outcome.
    pub fn set(&self, result: Result<T>) -> Result<()> {
        let ready = {
            let mut state = self.state.write();
            if !matches!(*state, State::Loading) {
                return Err(Error::NotOwner);
            }
            match result {
                Ok(dataset) => {
                    *state = State::Ready(Arc::new(dataset));
                    true
                }
                Err(e) => {
                    *state = State::Failed(e.to_string());
                    false
                }
            }
        };
        if ready {
            self.touch();
        }
        Ok(())
    }

    /// Drop a READY dataset or a sticky failure. No-op while loading.
    ///
    /// Returns `true` if the slot changed.
    pub fn unload(&self) -> bool {
        let released = {
            let mut state = self.state.write();
            if !matches!(*state, State::Ready(_) | State::Failed(_)) {
                return false;
            }
            std::mem::replace(&mut *state, State::Empty)
        };
        self.last_used.store(Arc::new(UNIX_EPOCH));
        // The dataset is freed here, outside the lock, unless a reader still
        // holds it.
        drop(released);
        true
    }

    /// The READY dataset, without counting as a use.
    pub fn peek(&self) -> Option<Arc<T>> {
        match &*self.state.read() {
            State::Ready(dataset) => Some(dataset.clone()),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.state.read(), State::Ready(_))
    }

    /// READY or LOADING; either way the slot holds (or will hold) memory.
    pub fn is_resident(&self) -> bool {
        matches!(*self.state.read(), State::Ready(_) | State::Loading)
    }

    pub fn is_failed(&self) -> bool {
        matches!(*self.state.read(), State::Failed(_))
    }

    /// Last READY read or successful load; the epoch when unloaded.
    pub fn last_used(&self) -> SystemTime {
        **self.last_used.load()
    }

    fn touch(&self) {
        let now = SystemTime::now();
        self.last_used
            .rcu(|prev| if now > **prev { Arc::new(now) } else { prev.clone() });
    }
}
