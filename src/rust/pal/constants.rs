// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Linux constants
//==============================================================================

/// Signal that carries timer ticks to the dispatched task thread.
#[cfg(target_os = "linux")]
pub const TICK_SIGNAL: libc::c_int = libc::SIGALRM;
