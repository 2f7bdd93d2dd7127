// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    port::{
        bootstrap::BootstrapHandle,
        coordinator::CoordinatorState,
        critical::CriticalSection,
        lifecycle,
        Port,
    },
    runtime::fail::Fail,
};
use ::std::{
    ptr,
    sync::MutexGuard,
};

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Port {
    /// Hands the processor from the current task of the kernel to its highest priority ready task, and blocks the
    /// calling thread until some later switch names the current task again. This is used both for preemption, from
    /// [crate::Kernel::int_exit], and for voluntary yields, after the kernel updated its selection.
    ///
    /// The caller must be the thread of the current task. A switch that names the current task as next returns right
    /// away.
    ///
    /// This runs inside of the tick handler, so it neither logs nor allocates, not even when it fails.
    pub fn switch_context(&self) -> Result<(), Fail> {
        let _section: CriticalSection = CriticalSection::enter();
        let state: MutexGuard<CoordinatorState> = self.coordinator.lock();

        let from: usize = self.known_slot(&state, self.kernel.current())?;
        let to: usize = self.known_slot(&state, self.kernel.high_ready())?;

        match lifecycle::current_task() {
            Some((port, slot)) if ptr::eq(port, self) && slot == from => (),
            _ => return Err(Fail::from_static(libc::EPERM, "caller is not the thread of the current task")),
        }

        self.kernel.promote_high_ready();

        // Returns with the lock held once this task is named again.
        let _state: MutexGuard<CoordinatorState> = self.coordinator.handoff(state, from, to);
        Ok(())
    }

    /// Slot of a task named by the kernel, checked against the tasks admitted by this port.
    fn known_slot(&self, state: &CoordinatorState, handle: Option<BootstrapHandle>) -> Result<usize, Fail> {
        match Self::slot_of(handle) {
            Ok(slot) if slot < state.created() => Ok(slot),
            Ok(_) => Err(Fail::from_static(libc::ESRCH, "task was not admitted by this port")),
            Err(e) => Err(e),
        }
    }
}
