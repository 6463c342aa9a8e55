// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Transmit-side synthesizer: converts an annotated packet into an I/Q
//! sample buffer using a fixed four-waveform palette, and owns the
//! retransmit schedule.

use crate::config::{ModemConfig, NEVER, RETRANSMIT_MAX, TX_AMPLITUDE};
use crate::decoder::{AnnotatedPacket, Annotation};
use crate::error::{SynthesisError, SynthesisResult};
use crate::sample::Sample;

/// The four precomputed waveforms a TX packet is assembled from, plus
/// silence.
struct Palette {
    zero: Vec<Sample>,
    one: Vec<Sample>,
    high_violation: Vec<Sample>,
    low_violation: Vec<Sample>,
    silence: Vec<Sample>,
}

impl Palette {
    fn build(cfg: ModemConfig) -> Self {
        let sps = cfg.sps() as usize;
        let half = sps / 2;
        let m = Sample::new(TX_AMPLITUDE, 0.0);
        let zero_c = Sample::new(0.0, 0.0);

        let mut zero = vec![m; sps];
        zero.resize(2 * sps, zero_c);

        let mut one = vec![zero_c; sps];
        one.resize(2 * sps, m);

        Palette {
            zero,
            one,
            high_violation: vec![m; half],
            low_violation: vec![zero_c; half],
            silence: vec![zero_c; 2 * sps],
        }
    }

    fn waveform(&self, annotation: Annotation) -> Option<&[Sample]> {
        match annotation {
            Annotation::Bit(false) => Some(&self.zero),
            Annotation::Bit(true) => Some(&self.one),
            Annotation::Violation(true) => Some(&self.high_violation),
            Annotation::Violation(false) => Some(&self.low_violation),
            Annotation::Silence => Some(&self.silence),
            Annotation::Ambiguous | Annotation::Impossible | Annotation::Unknown => None,
        }
    }
}

/// Outcome of draining one TX buffer to the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The buffer still has samples remaining after this drain.
    InProgress,
    /// The buffer was exhausted and rescheduled for retransmission.
    Rescheduled,
    /// The buffer was exhausted and the retransmit budget is spent; the
    /// caller should return the protocol engine to `IDLE`.
    Finished,
}

/// Owns the pending outgoing sample buffer and retransmit schedule.
pub struct TxSynthesizer {
    cfg: ModemConfig,
    palette: Palette,
    buffer: Option<Vec<Sample>>,
    cursor: usize,
    retransmit_num: u32,
    /// Sample index at which the pending buffer should next be drained,
    /// or [`NEVER`] if nothing is scheduled.
    tx_at: u64,
}

impl TxSynthesizer {
    #[must_use]
    pub fn new(cfg: ModemConfig) -> Self {
        Self {
            cfg,
            palette: Palette::build(cfg),
            buffer: None,
            cursor: 0,
            retransmit_num: 0,
            tx_at: NEVER,
        }
    }

    #[must_use]
    pub fn tx_at(&self) -> u64 {
        self.tx_at
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.buffer.is_some()
    }

    /// Synthesize a fresh outgoing buffer from an annotated packet,
    /// replacing any prior pending buffer and scheduling immediate send.
    ///
    /// Unrecognized annotations (`Ambiguous`/`Impossible`/`Unknown` —
    /// never emitted by [`crate::protocol::build_status_on_packet`], but
    /// guarded against regardless) are logged and skipped rather than
    /// aborting synthesis.
    pub fn synthesize(&mut self, annotated: &AnnotatedPacket) -> SynthesisResult<()> {
        let mut total = 0usize;
        for a in annotated.annotations() {
            if let Some(wave) = self.palette.waveform(*a) {
                total += wave.len();
            }
        }

        let mut buf = Vec::new();
        if buf.try_reserve_exact(total).is_err() {
            return Err(SynthesisError::BufferAllocationRefused {
                requested_samples: total,
            });
        }

        for a in annotated.annotations() {
            match self.palette.waveform(*a) {
                Some(wave) => buf.extend_from_slice(wave),
                None => log::warn!("TX synthesis: skipping unrecognized annotation {a:?}"),
            }
        }

        self.buffer = Some(buf);
        self.cursor = 0;
        self.retransmit_num = 0;
        self.tx_at = 0;
        Ok(())
    }

    /// Copy up to `out.len()` pending samples into `out`, returning the
    /// number of samples written.
    pub fn drain(&mut self, out: &mut [Sample], rx_sample_number: u64) -> (usize, DrainOutcome) {
        let Some(buf) = self.buffer.as_ref() else {
            return (0, DrainOutcome::Finished);
        };

        let remaining = buf.len() - self.cursor;
        let n = remaining.min(out.len());
        out[..n].copy_from_slice(&buf[self.cursor..self.cursor + n]);
        self.cursor += n;

        if self.cursor < buf.len() {
            return (n, DrainOutcome::InProgress);
        }

        self.retransmit_num += 1;
        if self.retransmit_num < RETRANSMIT_MAX {
            self.tx_at = rx_sample_number + self.cfg.retransmit_delay_samples();
            self.cursor = 0;
            (n, DrainOutcome::Rescheduled)
        } else {
            self.buffer = None;
            self.cursor = 0;
            self.tx_at = NEVER;
            (n, DrainOutcome::Finished)
        }
    }
}
