// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::fail::Fail;
use ::std::{
    any::Any,
    fmt,
    mem,
    sync::{
        atomic::{
            AtomicUsize,
            Ordering,
        },
        Arc,
    },
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Marks a record that was not admitted by any port yet.
const UNASSIGNED: usize = usize::MAX;

//======================================================================================================================
// Types
//======================================================================================================================

/// Argument handed to a task entry point.
pub type TaskArgument = Arc<dyn Any + Send + Sync>;

/// Entry point of a task. Tasks run forever.
pub type TaskEntry = fn(TaskArgument) -> !;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Everything the thread of a task needs to start running it.
pub struct BootstrapRecord {
    entry: TaskEntry,
    argument: TaskArgument,
    stack_size: usize,
    /// Slot index, written once by registration.
    slot: AtomicUsize,
}

/// Shared handle to a [BootstrapRecord]. This is what the kernel keeps in its task control block.
#[derive(Clone)]
pub struct BootstrapHandle(Arc<BootstrapRecord>);

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Exact number of bytes a caller must reserve per task.
pub fn minimum_bootstrap_size() -> usize {
    mem::size_of::<BootstrapRecord>()
}

/// Describes a task without admitting it into the schedule. The slot index stays unset until the task is registered.
///
/// `stack_size` is the size of the stack region the kernel reserved for this task and must be at least
/// [minimum_bootstrap_size]. Smaller regions are a precondition violation that is only caught in debug builds.
pub fn prepare(entry: TaskEntry, argument: TaskArgument, stack_size: usize) -> BootstrapHandle {
    debug_assert!(
        stack_size >= minimum_bootstrap_size(),
        "stack region is smaller than a bootstrap record (stack_size={})",
        stack_size
    );
    BootstrapHandle(Arc::new(BootstrapRecord {
        entry,
        argument,
        stack_size,
        slot: AtomicUsize::new(UNASSIGNED),
    }))
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl BootstrapHandle {
    /// Slot index of the task, if it was registered.
    pub fn slot(&self) -> Option<usize> {
        match self.0.slot.load(Ordering::Acquire) {
            UNASSIGNED => None,
            slot => Some(slot),
        }
    }

    /// Argument of the task.
    pub fn argument(&self) -> &TaskArgument {
        &self.0.argument
    }

    /// Size of the stack region reserved for the task.
    pub fn stack_size(&self) -> usize {
        self.0.stack_size
    }

    /// Checks whether two handles refer to the same record.
    pub fn ptr_eq(&self, other: &BootstrapHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn entry(&self) -> TaskEntry {
        self.0.entry
    }

    /// Claims `slot` for this record. Fails if the record is already registered.
    pub(crate) fn claim_slot(&self, slot: usize) -> Result<(), Fail> {
        match self
            .0
            .slot
            .compare_exchange(UNASSIGNED, slot, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(current) => {
                let cause: String = format!("task is already registered (slot={})", current);
                error!("claim_slot(): {}", cause);
                Err(Fail::new(libc::EEXIST, &cause))
            },
        }
    }

    /// Gives back a slot claimed by [BootstrapHandle::claim_slot], when the task could not be admitted after all.
    pub(crate) fn release_slot(&self) {
        self.0.slot.store(UNASSIGNED, Ordering::Release);
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl fmt::Debug for BootstrapHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapHandle")
            .field("slot", &self.slot())
            .field("stack_size", &self.0.stack_size)
            .finish()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
