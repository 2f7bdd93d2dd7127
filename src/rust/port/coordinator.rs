// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    pal::NativeThread,
    runtime::{
        fail::Fail,
        limits::MAX_TASKS,
    },
};
use ::arrayvec::ArrayVec;
use ::std::{
    os::unix::thread::JoinHandleExt,
    sync::{
        Condvar,
        Mutex,
        MutexGuard,
        PoisonError,
    },
    thread::JoinHandle,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Where the thread of a task is in the handoff protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotStatus {
    /// Thread was created but did not reach its wrapper yet.
    Starting,
    /// Thread is blocked on its wait condition.
    Parked,
    /// Thread was handed the baton but did not wake up yet.
    Ready,
    /// Thread is running task code or the tick handler.
    Running,
}

/// Per task entry of the slot table.
pub struct SlotState {
    status: SlotStatus,
    native: NativeThread,
    /// Task threads are never joined.
    #[allow(unused)]
    thread: JoinHandle<()>,
}

/// Coordinator state. Everything in here is guarded by the coordination lock.
pub struct CoordinatorState {
    /// Number of admitted tasks.
    created: usize,
    /// Number of task threads that reached their wrapper.
    started: usize,
    /// Is the start routine blocked on the startup barrier?
    awaiting: bool,
    /// Was the startup barrier signaled?
    barrier_signaled: bool,
    /// Did the startup barrier release?
    released: bool,
    /// Was the first task dispatched?
    running: bool,
    /// Slot of the task that owns the baton.
    dispatched: Option<usize>,
    /// Number of handoffs performed.
    switches: u64,
    slots: ArrayVec<SlotState, MAX_TASKS>,
}

/// Coordinator of task threads. One coordination lock guards the whole state, and each slot has its own wait
/// condition, which lives in a fixed-size arena sized at construction.
pub struct Coordinator {
    state: Mutex<CoordinatorState>,
    barrier: Condvar,
    wait_conditions: ArrayVec<Condvar, MAX_TASKS>,
}

/// Snapshot of the coordinator, for instrumentation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PortStats {
    /// Number of admitted tasks.
    pub created: usize,
    /// Number of task threads that reached their wrapper.
    pub started: usize,
    /// Number of task threads that did not reach their wrapper yet.
    pub starting: usize,
    /// Number of task threads blocked on their wait condition.
    pub parked: usize,
    /// Number of task threads that were handed the baton but did not wake up yet.
    pub ready: usize,
    /// Number of task threads outside of a wait state.
    pub running: usize,
    /// Slot of the task that owns the baton.
    pub dispatched: Option<usize>,
    /// Number of handoffs performed.
    pub switches: u64,
    /// Number of ticks delivered to task threads.
    pub ticks: u64,
    /// Did the startup barrier release?
    pub released: bool,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Coordinator {
    /// Creates a coordinator that admits up to `capacity` tasks.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity <= MAX_TASKS);
        let wait_conditions: ArrayVec<Condvar, MAX_TASKS> =
            (0..capacity.min(MAX_TASKS)).map(|_| Condvar::new()).collect();
        Self {
            state: Mutex::new(CoordinatorState {
                created: 0,
                started: 0,
                awaiting: false,
                barrier_signaled: false,
                released: false,
                running: false,
                dispatched: None,
                switches: 0,
                slots: ArrayVec::new(),
            }),
            barrier: Condvar::new(),
            wait_conditions,
        }
    }

    /// Number of tasks this coordinator admits.
    pub fn capacity(&self) -> usize {
        self.wait_conditions.len()
    }

    /// Acquires the coordination lock. A task that panicked while holding the lock does not poison the coordinator.
    pub fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the slot index the next admitted task gets.
    pub fn next_slot(&self, state: &CoordinatorState) -> Result<usize, Fail> {
        if state.created >= self.capacity() {
            let cause: String = format!("too many tasks (max_tasks={})", self.capacity());
            error!("next_slot(): {}", cause);
            return Err(Fail::new(libc::ENOSPC, &cause));
        }
        Ok(state.created)
    }

    /// Admits the task whose thread is `thread` into the next slot.
    pub fn admit(&self, state: &mut CoordinatorState, thread: JoinHandle<()>) -> usize {
        let slot: usize = state.created;
        let native: NativeThread = thread.as_pthread_t();
        state.slots.push(SlotState {
            status: SlotStatus::Starting,
            native,
            thread,
        });
        state.created += 1;
        slot
    }

    /// Accounts for a task thread that reached its wrapper. Signals the startup barrier if this was the last one.
    pub fn arrive(&self, state: &mut CoordinatorState, slot: usize) {
        state.started += 1;
        debug_assert!(state.started <= state.created);

        // The kernel may have selected a task created at run time before its thread got here.
        if state.slots[slot].status == SlotStatus::Starting {
            state.slots[slot].status = SlotStatus::Parked;
        }

        if state.started == state.created && state.awaiting && !state.barrier_signaled {
            state.barrier_signaled = true;
            self.barrier.notify_one();
        }
    }

    /// Blocks until every admitted task parked.
    pub fn await_all_parked(&self) -> Result<(), Fail> {
        let mut state: MutexGuard<CoordinatorState> = self.lock();
        if state.created == 0 {
            let cause: String = String::from("no task was registered");
            error!("await_all_parked(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }

        state.awaiting = true;
        while state.started < state.created {
            state = self.barrier.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state.awaiting = false;
        state.released = true;
        Ok(())
    }

    /// Hands the baton to the task in `slot` without parking anyone. This is how the first task is dispatched.
    pub fn dispatch_first(&self, slot: usize) -> Result<(), Fail> {
        let mut state: MutexGuard<CoordinatorState> = self.lock();
        if slot >= state.created {
            let cause: String = format!("cannot dispatch unknown task (slot={})", slot);
            error!("dispatch_first(): {}", cause);
            return Err(Fail::new(libc::ESRCH, &cause));
        }
        state.running = true;
        state.dispatched = Some(slot);
        self.wake(&mut state, slot);
        Ok(())
    }

    /// Signals the wait condition of `to`, then waits on the one of `from`. Returns once some later handoff names
    /// `from` again. The lock is released only while waiting.
    pub fn handoff<'a>(
        &'a self,
        mut state: MutexGuard<'a, CoordinatorState>,
        from: usize,
        to: usize,
    ) -> MutexGuard<'a, CoordinatorState> {
        debug_assert_eq!(state.slots[from].status, SlotStatus::Running);
        state.slots[from].status = SlotStatus::Parked;
        state.dispatched = Some(to);
        state.switches += 1;
        self.wake(&mut state, to);
        self.park(state, from)
    }

    /// Waits on the wait condition of `slot` until the slot is handed the baton.
    pub fn park<'a>(
        &'a self,
        mut state: MutexGuard<'a, CoordinatorState>,
        slot: usize,
    ) -> MutexGuard<'a, CoordinatorState> {
        // Wake ups that do not come with the baton are spurious.
        while state.slots[slot].status != SlotStatus::Ready {
            state = self.wait_conditions[slot]
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.slots[slot].status = SlotStatus::Running;
        state
    }

    /// Hands the baton to `slot`.
    fn wake(&self, state: &mut CoordinatorState, slot: usize) {
        state.slots[slot].status = SlotStatus::Ready;
        self.wait_conditions[slot].notify_one();
    }

    /// Native thread of the task that owns the baton.
    pub fn dispatched_thread(&self) -> Option<NativeThread> {
        let state: MutexGuard<CoordinatorState> = self.lock();
        state.dispatched.map(|slot| state.slots[slot].native)
    }

    /// Takes a snapshot of the coordinator.
    pub fn stats(&self) -> PortStats {
        let state: MutexGuard<CoordinatorState> = self.lock();
        let mut stats: PortStats = PortStats {
            created: state.created,
            started: state.started,
            dispatched: state.dispatched,
            switches: state.switches,
            released: state.released,
            ..Default::default()
        };
        for slot in state.slots.iter() {
            match slot.status {
                SlotStatus::Starting => stats.starting += 1,
                SlotStatus::Parked => stats.parked += 1,
                SlotStatus::Ready => stats.ready += 1,
                SlotStatus::Running => stats.running += 1,
            }
        }
        stats
    }
}

impl CoordinatorState {
    /// Number of admitted tasks.
    pub fn created(&self) -> usize {
        self.created
    }

    /// Was the first task dispatched?
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Status of the task in `slot`.
    pub fn status(&self, slot: usize) -> Option<SlotStatus> {
        self.slots.get(slot).map(|slot| slot.status)
    }
}

impl PortStats {
    /// Number of task threads that own the baton, whether they already woke up or not.
    pub fn owners(&self) -> usize {
        self.ready + self.running
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
