// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    pal,
    port::{
        bootstrap::{
            BootstrapHandle,
            TaskArgument,
            TaskEntry,
        },
        coordinator::CoordinatorState,
        critical::{
            critical_section,
            CriticalSection,
        },
        Port,
    },
    runtime::{
        fail::Fail,
        limits,
    },
};
use ::std::{
    any::Any,
    cell::Cell,
    panic::{
        self,
        AssertUnwindSafe,
    },
    sync::{
        Arc,
        MutexGuard,
    },
    thread::{
        self,
        JoinHandle,
    },
};

//======================================================================================================================
// Thread Local Variables
//======================================================================================================================

thread_local! {
    /// Port and slot of the task that runs on this thread. Set once by the wrapper, before ticks are unmasked.
    static CURRENT_TASK: Cell<Option<(*const Port, usize)>> = const { Cell::new(None) };
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Port and slot of the task that runs on the calling thread, if any. Safe to call from the tick handler.
pub(crate) fn current_task() -> Option<(*const Port, usize)> {
    CURRENT_TASK.try_with(Cell::get).ok().flatten()
}

/// Renders the payload of a panic.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Port {
    /// Admits the task described by `handle` and starts its thread. The thread parks in its wrapper until the task is
    /// dispatched. Returns the slot index of the task.
    ///
    /// Fails if the port is full, if the task was already registered, or if the host refuses to create a thread. In
    /// all of these cases the task is not admitted.
    pub fn register(self: &Arc<Self>, handle: &BootstrapHandle) -> Result<usize, Fail> {
        // Threads inherit the signal mask of their creator, so the new thread starts with ticks masked.
        let _section: CriticalSection = CriticalSection::enter();
        let mut state: MutexGuard<CoordinatorState> = self.coordinator.lock();

        let slot: usize = self.coordinator.next_slot(&state)?;
        handle.claim_slot(slot)?;

        let mut builder: thread::Builder = thread::Builder::new().name(format!("task-{}", slot));
        if handle.stack_size() >= limits::MIN_TASK_STACK_SIZE {
            builder = builder.stack_size(handle.stack_size());
        }

        let port: Arc<Port> = self.clone();
        let record: BootstrapHandle = handle.clone();
        let thread: JoinHandle<()> = match builder.spawn(move || port.run_task(slot, record)) {
            Ok(thread) => thread,
            Err(e) => {
                handle.release_slot();
                let cause: String = format!("cannot create thread for task (slot={}): {}", slot, e);
                error!("register(): {}", cause);
                return Err(Fail::new(e.raw_os_error().unwrap_or(libc::EAGAIN), &cause));
            },
        };

        let admitted: usize = self.coordinator.admit(&mut state, thread);
        debug_assert_eq!(admitted, slot);
        debug!("register(): task admitted (slot={}, running={})", slot, state.is_running());
        Ok(slot)
    }

    /// Body of every task thread: park until dispatched, then run the task.
    fn run_task(self: Arc<Self>, slot: usize, record: BootstrapHandle) {
        // Ticks are already masked by inheritance. Keep them masked until the thread parked at least once.
        pal::block_tick_signal();

        // This function never returns, so the port outlives every use of this pointer.
        let port: *const Port = Arc::as_ptr(&self);
        CURRENT_TASK.with(|task| task.set(Some((port, slot))));

        {
            let mut state: MutexGuard<CoordinatorState> = self.coordinator.lock();
            self.coordinator.arrive(&mut state, slot);
            let _state: MutexGuard<CoordinatorState> = self.coordinator.park(state, slot);
        }

        pal::unblock_tick_signal();

        let entry: TaskEntry = record.entry();
        let argument: TaskArgument = record.argument().clone();
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || entry(argument))) {
            critical_section(|_| {
                error!(
                    "run_task(): task panicked, idling its thread (slot={}, cause={:?})",
                    slot,
                    panic_message(payload.as_ref())
                )
            });
        }

        // Ticks stay unmasked: the kernel may still switch away from this thread.
        loop {
            thread::park();
        }
    }
}
