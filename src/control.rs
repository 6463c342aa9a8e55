// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Thread-safe control surface.
//!
//! Exactly four fields are shared between the dataflow thread and the
//! control (UI) thread: `state`, `monitor`, `secret`, `seqno`. They are
//! guarded by a single [`parking_lot::Mutex`] rather than per-field
//! locks. Every critical section here is O(1): a field read/write plus
//! a precondition test, never a display call or an allocation.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::display::Display;
use crate::protocol::ProtocolState;

#[derive(Debug, Default)]
struct Shared {
    state: ProtocolState,
    monitor: bool,
    /// `None` is the "unset" sentinel; both fields must be set at least
    /// once before `start_status` may fire.
    secret: Option<u32>,
    seqno: Option<u32>,
}

/// A point-in-time read of the four shared fields, taken once per
/// [`crate::block::Block::tick`] invocation rather than per sample.
#[derive(Debug, Clone, Copy)]
pub struct ControlSnapshot {
    pub state: ProtocolState,
    pub monitor: bool,
}

/// The control surface shared between the dataflow thread and the UI
/// thread.
///
/// Cloning is cheap (an `Arc` to the mutex plus the display sink) and is
/// the intended way to hand a handle to a UI thread while [`crate::block::Block`]
/// keeps its own.
pub struct Control<D: Display> {
    shared: Arc<Mutex<Shared>>,
    display: Arc<D>,
}

impl<D: Display> Clone for Control<D> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            display: Arc::clone(&self.display),
        }
    }
}

impl<D: Display> Control<D> {
    #[must_use]
    pub fn new(display: Arc<D>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared::default())),
            display,
        }
    }

    /// Enable or disable continuous RX decoding while `IDLE`.
    pub fn set_monitor(&self, on: bool) {
        {
            let mut s = self.shared.lock();
            s.monitor = on;
        }
        self.display
            .display_status(if on { "Monitor enabled" } else { "Monitor disabled" });
    }

    #[must_use]
    pub fn get_monitor(&self) -> bool {
        self.shared.lock().monitor
    }

    /// Set the opaque 32-bit secret. Effective only while `IDLE`;
    /// silently ignored otherwise so an in-flight frame always
    /// references a consistent secret.
    pub fn set_secret(&self, secret: u32) {
        let mut s = self.shared.lock();
        if s.state == ProtocolState::Idle {
            s.secret = Some(secret);
        }
    }

    /// Set the sequence number. Effective only while `IDLE`.
    pub fn set_seqno(&self, seqno: u32) {
        let mut s = self.shared.lock();
        if s.state == ProtocolState::Idle {
            s.seqno = Some(seqno);
        }
    }

    #[must_use]
    pub fn get_state(&self) -> ProtocolState {
        self.shared.lock().state
    }

    /// Attempt the `IDLE -> STATUS` transition. Requires `secret` and
    /// `seqno` to each have been set at least once. Misuse (already
    /// non-`IDLE`, or unset fields) is surfaced via
    /// [`Display::display_status`] and otherwise ignored — this is the
    /// one transition the control thread is allowed to drive directly;
    /// the remaining transitions happen only inside the block's tick.
    pub fn start_status(&self) {
        let ready = {
            let mut s = self.shared.lock();
            if s.state == ProtocolState::Idle && s.secret.is_some() && s.seqno.is_some() {
                s.state = ProtocolState::Status;
                true
            } else {
                false
            }
        };
        if ready {
            self.display.display_status("Status protocol starting");
        } else {
            self.display
                .display_status("Transaction already in progress");
        }
    }

    /// Read state and monitor together under one lock acquisition.
    #[must_use]
    pub fn snapshot(&self) -> ControlSnapshot {
        let s = self.shared.lock();
        ControlSnapshot {
            state: s.state,
            monitor: s.monitor,
        }
    }

    /// Current secret, if set. Read by the block when entering `STATUS`
    /// to build the status-on packet.
    #[must_use]
    pub fn secret(&self) -> Option<u32> {
        self.shared.lock().secret
    }

    /// Write a new protocol state. Used only by [`crate::block::Block::tick`]
    /// for the `STATUS -> STATUS_ON_SENT` and `STATUS_ON_SENT -> IDLE`
    /// transitions; never called from the control thread.
    pub(crate) fn transition_to(&self, new_state: ProtocolState) {
        self.shared.lock().state = new_state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::NullDisplay;

    #[test]
    fn start_status_requires_secret_and_seqno() {
        let ctrl = Control::new(Arc::new(NullDisplay));
        ctrl.start_status();
        assert_eq!(ctrl.get_state(), ProtocolState::Idle, "unset fields must block the transition");

        ctrl.set_secret(1);
        ctrl.start_status();
        assert_eq!(ctrl.get_state(), ProtocolState::Idle, "seqno still unset");

        ctrl.set_seqno(7);
        ctrl.start_status();
        assert_eq!(ctrl.get_state(), ProtocolState::Status);
    }

    #[test]
    fn set_secret_ignored_once_non_idle() {
        let ctrl = Control::new(Arc::new(NullDisplay));
        ctrl.set_secret(42);
        ctrl.set_seqno(1);
        ctrl.start_status();
        assert_eq!(ctrl.get_state(), ProtocolState::Status);

        ctrl.set_secret(99);
        assert_eq!(
            ctrl.secret(),
            Some(42),
            "secret must not change once a transaction is in progress"
        );
    }

    #[test]
    fn start_status_twice_is_idempotent_no_op() {
        let ctrl = Control::new(Arc::new(NullDisplay));
        ctrl.set_secret(1);
        ctrl.set_seqno(1);
        ctrl.start_status();
        ctrl.start_status();
        assert_eq!(ctrl.get_state(), ProtocolState::Status);
    }

    #[test]
    fn monitor_toggle_independent_of_state() {
        let ctrl = Control::new(Arc::new(NullDisplay));
        assert!(!ctrl.get_monitor());
        ctrl.set_monitor(true);
        assert!(ctrl.get_monitor());
    }
}
