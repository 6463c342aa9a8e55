// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The external display surface: two callbacks the core invokes with
//! already-formatted text lines. The host UI (out of scope for this
//! crate) owns the concrete implementation — a terminal, a log file, a
//! GUI widget, or an embedded scripting console.
//!
//! If the concrete implementation is backed by an embedded scripting
//! host that requires its global interpreter lock to be held around
//! calls into it, that bracket belongs to the implementation, not to
//! this trait.

/// Formatted-line sink the core pushes decoded payloads and status
/// messages through.
///
/// Implementations must be safe to call from the dataflow thread; the
/// block never holds its own lock across a display call.
pub trait Display: Send + Sync {
    /// One decoded RX burst, already formatted as a decoded-payload
    /// line (interval, hex bytes, bit groups).
    fn display_data(&self, line: &str);

    /// A protocol or control-surface status line (state transitions,
    /// retransmit exhaustion, control-surface misuse).
    fn display_status(&self, line: &str);
}

/// A [`Display`] that discards every line. Useful where only the
/// decoded/derived state matters, such as tests and headless tooling.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDisplay;

impl Display for NullDisplay {
    fn display_data(&self, _line: &str) {}
    fn display_status(&self, _line: &str) {}
}

/// A [`Display`] that forwards both channels to the `log` facade
/// (`info!` for data, `warn!` for status) — a reasonable default for a
/// host that has no dedicated UI widget yet.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDisplay;

impl Display for LoggingDisplay {
    fn display_data(&self, line: &str) {
        log::info!(target: "omnipod_modem::rx", "{line}");
    }

    fn display_status(&self, line: &str) {
        log::warn!(target: "omnipod_modem::protocol", "{line}");
    }
}
