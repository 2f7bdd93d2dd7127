// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    pal::constants::TICK_SIGNAL,
    runtime::fail::Fail,
};
use ::libc::{
    c_int,
    pthread_t,
    sigset_t,
};
use ::std::{
    io,
    mem,
    ptr,
};

//======================================================================================================================
// Types
//======================================================================================================================

/// Signal mask of a thread.
pub type SignalMask = sigset_t;

/// Native thread handle.
pub type NativeThread = pthread_t;

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Builds a signal set that contains only the tick signal.
fn tick_signal_set() -> sigset_t {
    let mut set: sigset_t = unsafe { mem::zeroed() };
    unsafe {
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, TICK_SIGNAL);
    }
    set
}

/// Changes the signal mask of the calling thread and returns the previous one.
fn set_thread_mask(how: c_int, set: *const sigset_t) -> SignalMask {
    let mut old: sigset_t = unsafe { mem::zeroed() };
    let ret: c_int = unsafe { libc::pthread_sigmask(how, set, &mut old) };
    // pthread_sigmask() only fails on an invalid `how`.
    debug_assert_eq!(ret, 0);
    old
}

/// Blocks the tick signal on the calling thread. Returns the mask that was in place before.
pub fn block_tick_signal() -> SignalMask {
    let set: sigset_t = tick_signal_set();
    set_thread_mask(libc::SIG_BLOCK, &set)
}

/// Unblocks the tick signal on the calling thread. A tick that is pending on this thread is delivered before this
/// function returns. Returns the mask that was in place before.
pub fn unblock_tick_signal() -> SignalMask {
    let set: sigset_t = tick_signal_set();
    set_thread_mask(libc::SIG_UNBLOCK, &set)
}

/// Restores a signal mask previously returned by [block_tick_signal] or [unblock_tick_signal].
pub fn restore_signal_mask(mask: &SignalMask) {
    set_thread_mask(libc::SIG_SETMASK, mask);
}

/// Checks whether the tick signal is blocked on the calling thread.
pub fn is_tick_signal_blocked() -> bool {
    let current: sigset_t = set_thread_mask(libc::SIG_BLOCK, ptr::null());
    unsafe { libc::sigismember(&current, TICK_SIGNAL) == 1 }
}

/// Installs `handler` as the process-wide handler of the tick signal. Interrupted system calls are restarted.
pub fn install_tick_handler(handler: extern "C" fn(c_int)) -> Result<(), Fail> {
    let mut action: libc::sigaction = unsafe { mem::zeroed() };
    action.sa_sigaction = handler as libc::sighandler_t;
    action.sa_flags = libc::SA_RESTART;
    unsafe { libc::sigemptyset(&mut action.sa_mask) };

    if unsafe { libc::sigaction(TICK_SIGNAL, &action, ptr::null_mut()) } != 0 {
        let errno: c_int = io::Error::last_os_error().raw_os_error().unwrap_or(libc::EINVAL);
        let cause: String = format!("sigaction failed for signal {}", TICK_SIGNAL);
        error!("install_tick_handler(): {}", cause);
        return Err(Fail::new(errno, &cause));
    }
    Ok(())
}

/// Sends the tick signal to `thread`. If the thread has the signal blocked, the tick stays pending on it.
pub fn send_tick(thread: NativeThread) -> Result<(), Fail> {
    match unsafe { libc::pthread_kill(thread, TICK_SIGNAL) } {
        0 => Ok(()),
        errno => Err(Fail::new(errno, "failed to deliver tick signal")),
    }
}

/// Reads the errno of the calling thread.
pub fn errno() -> c_int {
    unsafe { *libc::__errno_location() }
}

/// Overwrites the errno of the calling thread.
pub fn set_errno(value: c_int) {
    unsafe { *libc::__errno_location() = value };
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
