// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::port::{
    bootstrap::BootstrapHandle,
    Port,
};

//======================================================================================================================
// Traits
//======================================================================================================================

/// Services that the port requires from the kernel core.
///
/// The kernel owns task selection. The port only reads the selection when it performs a handoff, and calls back into
/// the kernel once per timer tick.
///
/// Every method except [Kernel::start_hook] may run inside the tick handler, that is, on a task thread that was
/// interrupted at an arbitrary point outside of a critical section. Implementations must not allocate nor take locks
/// that task code can hold outside of a critical section. Atomics are fine.
pub trait Kernel: Send + Sync + 'static {
    /// Task that currently owns the processor.
    fn current(&self) -> Option<BootstrapHandle>;

    /// Highest priority ready task, the one that should run next.
    fn high_ready(&self) -> Option<BootstrapHandle>;

    /// Commits the selection, making the highest priority ready task the current one. The port calls this while
    /// holding the coordination lock, right before it hands the baton over.
    fn promote_high_ready(&self);

    /// Called once by the start routine, after the startup barrier released and before the first task is dispatched.
    fn start_hook(&self) {}

    /// Marks the beginning of an interrupt service routine.
    fn int_enter(&self);

    /// Processes one tick of the kernel time base.
    fn time_tick(&self);

    /// Marks the end of an interrupt service routine. This is the point where the kernel preempts the running task,
    /// by updating its selection and calling [Port::switch_context].
    fn int_exit(&self, port: &Port);
}
