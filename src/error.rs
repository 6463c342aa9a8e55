// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error taxonomy for the modem's non-hot-path fallible operations.
//!
//! RX parsing is total — [`crate::decoder::decode`] never fails — and
//! protocol-state misuse is surfaced through the display surface rather
//! than `Result`. The only fallible operation in this crate is TX packet
//! synthesis, which can be refused if the host declines a buffer
//! allocation.

use std::fmt;

/// Errors raised by [`crate::tx::TxSynthesizer`].
#[derive(Debug)]
pub enum SynthesisError {
    /// The outgoing sample buffer could not be allocated. The synthesis
    /// attempt is abandoned and any previously pending TX state is left
    /// unchanged.
    BufferAllocationRefused {
        /// Number of complex samples that were requested.
        requested_samples: usize,
    },
}

impl fmt::Display for SynthesisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SynthesisError::BufferAllocationRefused { requested_samples } => write!(
                f,
                "TX buffer allocation refused for {requested_samples} samples"
            ),
        }
    }
}

impl std::error::Error for SynthesisError {}

/// Result alias for synthesis operations.
pub type SynthesisResult<T> = Result<T, SynthesisError>;
