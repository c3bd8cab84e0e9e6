// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Process-wide SIGINT/SIGTERM handling for blocking waits.
//
// The handlers only set flags. Blocking calls (`Node::wait`, the WaitSet)
// wake up with EINTR and report the flag as `Interrupt` or
// `TerminationRequest`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

/// Whether nodes and WaitSets react to SIGINT and SIGTERM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignalHandlingMode {
    /// Install handlers; waits end with `Interrupt` / `TerminationRequest`.
    #[default]
    HandleTerminationRequests,
    /// Leave signal dispositions alone.
    Disabled,
}

static INTERRUPT: AtomicBool = AtomicBool::new(false);
static TERMINATION: AtomicBool = AtomicBool::new(false);
static INSTALL: Once = Once::new();

extern "C" fn on_signal(signal: libc::c_int) {
    match signal {
        libc::SIGINT => INTERRUPT.store(true, Ordering::Release),
        libc::SIGTERM => TERMINATION.store(true, Ordering::Release),
        _ => {}
    }
}

/// Install the SIGINT and SIGTERM handlers once per process.
pub(crate) fn install_handlers() {
    INSTALL.call_once(|| unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
        // no SA_RESTART: blocking calls must return EINTR
        action.sa_flags = 0;
        libc::sigemptyset(&mut action.sa_mask);
        for signal in [libc::SIGINT, libc::SIGTERM] {
            if libc::sigaction(signal, &action, std::ptr::null_mut()) != 0 {
                log::warn!(
                    "unable to install handler for signal {signal}: {}",
                    std::io::Error::last_os_error()
                );
            }
        }
        log::debug!("signal handlers installed");
    });
}

/// `true` once SIGTERM was received. Stays set.
pub fn termination_requested() -> bool {
    TERMINATION.load(Ordering::Acquire)
}

/// Consume a pending SIGINT.
pub(crate) fn take_interrupt() -> bool {
    INTERRUPT.swap(false, Ordering::AcqRel)
}

/// What a wait should report after the signal state was checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SignalState {
    None,
    Interrupt,
    TerminationRequest,
}

/// Check for signals relevant under `mode`.
pub(crate) fn check(mode: SignalHandlingMode) -> SignalState {
    if mode == SignalHandlingMode::Disabled {
        return SignalState::None;
    }
    if termination_requested() {
        SignalState::TerminationRequest
    } else if take_interrupt() {
        SignalState::Interrupt
    } else {
        SignalState::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_mode_ignores_flags() {
        assert_eq!(check(SignalHandlingMode::Disabled), SignalState::None);
    }

    #[test]
    fn default_mode_handles_signals() {
        assert_eq!(
            SignalHandlingMode::default(),
            SignalHandlingMode::HandleTerminationRequests
        );
    }
}
