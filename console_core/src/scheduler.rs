//! Cancellable, self re-arming poll timers.
//!
//! The scheduler owns no callbacks. It stores an action token per handle and
//! hands due tokens back to the owner, which runs them on its own timeline.
//! Handles live in a generational arena so a cancelled slot can be reused
//! without a stale handle ever firing again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Clock advanced by hand; used by tests and capture replay.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, delta_ms: u64) -> u64 {
        self.now.fetch_add(delta_ms, Ordering::SeqCst) + delta_ms
    }

    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PollHandle {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
struct Entry<A> {
    action: A,
    interval_ms: u64,
    next_due: u64,
}

#[derive(Debug)]
struct Slot<A> {
    generation: u32,
    entry: Option<Entry<A>>,
}

#[derive(Debug)]
pub struct PollScheduler<A> {
    slots: Vec<Slot<A>>,
    free: Vec<u32>,
}

impl<A> Default for PollScheduler<A> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<A: Clone> PollScheduler<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `action`. It is due immediately, then every `interval_ms` after
    /// each firing. Intervals below 1 ms are raised to 1 ms.
    pub fn schedule(&mut self, now: u64, interval_ms: u64, action: A) -> PollHandle {
        let entry = Entry {
            action,
            interval_ms: interval_ms.max(1),
            next_due: now,
        };
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            return PollHandle {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            entry: Some(entry),
        });
        PollHandle {
            index,
            generation: 0,
        }
    }

    /// Returns `false` when the handle was already cancelled.
    pub fn cancel(&mut self, handle: PollHandle) -> bool {
        match self.slots.get_mut(handle.index as usize) {
            Some(slot) if slot.generation == handle.generation && slot.entry.is_some() => {
                slot.entry = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(handle.index);
                true
            }
            _ => false,
        }
    }

    pub fn is_active(&self, handle: PollHandle) -> bool {
        self.slots
            .get(handle.index as usize)
            .is_some_and(|slot| slot.generation == handle.generation && slot.entry.is_some())
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn next_due(&self) -> Option<u64> {
        self.slots
            .iter()
            .filter_map(|slot| slot.entry.as_ref().map(|entry| entry.next_due))
            .min()
    }

    /// Collect every action due at `now`, oldest first, re-arming each one
    /// `interval_ms` after `now` whatever its outcome turns out to be.
    ///
    /// An action may cancel a handle that is still pending in the returned
    /// batch; callers check [`PollScheduler::is_active`] before running each.
    pub fn take_due(&mut self, now: u64) -> Vec<(PollHandle, A)> {
        let mut due: Vec<(u64, PollHandle, A)> = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(entry) = slot.entry.as_mut() {
                if entry.next_due <= now {
                    due.push((
                        entry.next_due,
                        PollHandle {
                            index: index as u32,
                            generation: slot.generation,
                        },
                        entry.action.clone(),
                    ));
                    entry.next_due = now + entry.interval_ms;
                }
            }
        }
        due.sort_by_key(|(at, handle, _)| (*at, *handle));
        due.into_iter()
            .map(|(_, handle, action)| (handle, action))
            .collect()
    }

    pub fn clear(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.entry.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
            }
        }
    }
}
