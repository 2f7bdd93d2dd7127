// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::pal::{
    self,
    SignalMask,
};
use ::std::marker::PhantomData;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Critical section. While one is alive the calling thread does not take ticks, which is how this port disables
/// interrupts. Dropping it restores the mask that was in place when it was entered, so nested sections only re-enable
/// ticks when the outermost one ends. Sections must end in the reverse order they were entered.
///
/// A critical section only protects against preemption by the tick source. Mutual exclusion between tasks comes from
/// the fact that only one task thread runs at a time.
pub struct CriticalSection {
    saved: SignalMask,
    // The mask belongs to the thread that entered the section.
    _not_send: PhantomData<*const ()>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl CriticalSection {
    /// Masks ticks on the calling thread.
    pub fn enter() -> Self {
        Self {
            saved: pal::block_tick_signal(),
            _not_send: PhantomData,
        }
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Enters a critical section.
pub fn enter_critical() -> CriticalSection {
    CriticalSection::enter()
}

/// Exits a critical section. A tick that arrived while the section was in place is taken right away.
pub fn exit_critical(section: CriticalSection) {
    drop(section);
}

/// Runs `f` inside of a critical section.
pub fn critical_section<R, F: FnOnce(&CriticalSection) -> R>(f: F) -> R {
    let section: CriticalSection = CriticalSection::enter();
    f(&section)
}

/// Checks whether ticks are masked on the calling thread.
pub fn is_masked() -> bool {
    pal::is_tick_signal_blocked()
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Drop for CriticalSection {
    fn drop(&mut self) {
        pal::restore_signal_mask(&self.saved);
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
