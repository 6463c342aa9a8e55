// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The scheduler adapter: the entry point a host dataflow framework
//! invokes with input/output sample batches. Drives [`RxPipeline`] once
//! per sample, runs the protocol engine's pending transitions, feeds
//! [`TxSynthesizer`] output into the outgoing batch, and fills idle
//! samples with silence so the output stream stays sample-aligned with
//! the input.
//!
//! The host dataflow framework itself, buffer allocation, and signature
//! negotiation are out of scope — [`Block`] only implements the
//! per-call contract a host would drive.

use std::sync::Arc;

use crate::control::Control;
use crate::decoder::Annotation;
use crate::display::Display;
use crate::protocol::{self, ProtocolState};
use crate::rx::{DecodedBurst, RxPipeline};
use crate::sample::{magnitude, Sample};
use crate::tx::{DrainOutcome, TxSynthesizer};
use crate::ModemConfig;

/// One processing block instance: owns the dataflow-exclusive RX/TX
/// state and a [`Control`] handle shared with the UI thread.
pub struct Block<D: Display> {
    cfg: ModemConfig,
    rx: RxPipeline,
    tx: TxSynthesizer,
    control: Control<D>,
    display: Arc<D>,
    tx_sample_number: u64,
}

impl<D: Display> Block<D> {
    #[must_use]
    pub fn new(cfg: ModemConfig, display: Arc<D>) -> Self {
        Self {
            cfg,
            rx: RxPipeline::new(cfg),
            tx: TxSynthesizer::new(cfg),
            control: Control::new(Arc::clone(&display)),
            display,
            tx_sample_number: 0,
        }
    }

    /// A handle to the control surface, for handing to a UI thread.
    #[must_use]
    pub fn control(&self) -> Control<D> {
        self.control.clone()
    }

    /// Minimum input samples the host must supply per call.
    #[must_use]
    pub fn input_rate(&self) -> u32 {
        self.cfg.input_rate()
    }

    /// Past samples the host must preserve across calls.
    #[must_use]
    pub fn history_requirement(&self) -> u32 {
        self.cfg.history()
    }

    /// Process one batch. Returns `(consumed, produced)`: the number of
    /// leading `input` samples consumed and the number of `output`
    /// samples written, both starting at index 0.
    pub fn tick(&mut self, input: &[Sample], output: &mut [Sample]) -> (usize, usize) {
        let avg_len = self.cfg.avg_len() as usize;

        if !self.rx.is_primed() {
            if input.len() < 2 * avg_len + 1 {
                return (0, 0);
            }
            let warm: Vec<f64> = input[..=2 * avg_len].iter().map(|s| magnitude(*s)).collect();
            self.rx.prime(&warm);
        }

        let mut r = 0usize;
        let mut w = 0usize;

        while r + 2 * avg_len + 1 < input.len() {
            let snapshot = self.control.snapshot();
            let mag = magnitude(input[r + 2 * avg_len + 1]);

            let demodulate = snapshot.state != ProtocolState::Idle || snapshot.monitor;
            self.rx.step(mag, demodulate);
            // Bursts are classified whenever a protocol exchange is in
            // flight (so the pipeline stays warm), but only surfaced to
            // the display when monitor mode is on; decoded bursts outside
            // monitor mode are simply discarded.
            let decoded = self.rx.take_decoded();
            if snapshot.monitor {
                for burst in decoded {
                    self.emit_decoded(burst);
                }
            }

            if snapshot.state != ProtocolState::Idle {
                self.run_protocol_transitions(snapshot.state);
                if self.tx.tx_at() <= self.tx_sample_number && w < output.len() {
                    let (n, outcome) =
                        self.tx.drain(&mut output[w..], self.rx.rx_sample_number());
                    w += n;
                    self.tx_sample_number += n as u64;
                    self.handle_drain_outcome(outcome);
                }
            }

            r += 1;
        }

        // Underflow filler: keep the output stream sample-aligned with
        // rx_sample_number even when no TX burst is in flight.
        while self.tx_sample_number < self.rx.rx_sample_number() && w < output.len() {
            output[w] = Sample::new(0.0, 0.0);
            w += 1;
            self.tx_sample_number += 1;
        }

        (r, w)
    }

    /// Execute the `STATUS -> STATUS_ON_SENT` transition if pending.
    /// `STATUS_ON_SENT -> IDLE` is handled by
    /// [`Self::handle_drain_outcome`] once the retransmit budget is
    /// exhausted.
    fn run_protocol_transitions(&mut self, state: ProtocolState) {
        if state != ProtocolState::Status {
            return;
        }
        let Some(secret) = self.control.secret() else {
            // Precondition already checked by `Control::start_status`;
            // nothing to do if it raced away, the tick stays idempotent.
            return;
        };
        let (packet, truncated) = protocol::build_status_on_packet(secret, self.cfg.silence_tokens());
        if truncated {
            self.display
                .display_status("status-on packet truncated to the 1024-byte cap");
        }
        match self.tx.synthesize(&packet) {
            Ok(()) => {
                self.control.transition_to(ProtocolState::StatusOnSent);
            }
            Err(err) => {
                log::error!("status-on synthesis failed: {err}");
                self.display.display_status("Status-on packet synthesis failed");
            }
        }
    }

    fn handle_drain_outcome(&mut self, outcome: DrainOutcome) {
        if outcome == DrainOutcome::Finished && self.control.get_state() == ProtocolState::StatusOnSent
        {
            self.control.transition_to(ProtocolState::Idle);
            self.display
                .display_status("Retransmit finished / Exceeded retries");
        }
    }

    fn emit_decoded(&mut self, decoded: DecodedBurst) {
        let line = format_decoded_line(&decoded, self.cfg.sample_rate_hz());
        self.display.display_data(&line);
    }
}

/// Render one decoded burst as a decoded-payload line:
///
/// ```text
/// <interval_ms>:<TAB><hex bytes, 4-byte groups separated by space>
///                     <any non-hex chip appears verbatim as " <char> ">
///              : <bit groups of 4, non-bit chips surrounded by spaces>
/// ```
fn format_decoded_line(decoded: &DecodedBurst, sample_rate_hz: u32) -> String {
    let interval_ms = if decoded.prev_started_at == 0 && decoded.started_at == 0 {
        0.0
    } else {
        1000.0 * (decoded.started_at.saturating_sub(decoded.prev_started_at)) as f64
            / f64::from(sample_rate_hz)
    };

    let hex_line = render_hex_line(decoded.packet.annotations());
    let bit_line = render_bit_line(decoded.packet.annotations());

    format!("{interval_ms:6.1}:\t{hex_line}\n             : {bit_line}")
}

fn render_hex_line(annotations: &[Annotation]) -> String {
    let mut out = String::new();
    let mut partial: u8 = 0;
    let mut nbits = 0u32;
    let mut bytes_in_group = 0u32;

    fn push_byte(out: &mut String, byte: u8, bytes_in_group: &mut u32) {
        out.push_str(&format!("{byte:02x}"));
        *bytes_in_group += 1;
        if *bytes_in_group == 4 {
            out.push(' ');
            *bytes_in_group = 0;
        }
    }

    for a in annotations {
        match a {
            Annotation::Bit(bit) => {
                partial = (partial << 1) | u8::from(*bit);
                nbits += 1;
                if nbits == 8 {
                    push_byte(&mut out, partial, &mut bytes_in_group);
                    partial = 0;
                    nbits = 0;
                }
            }
            other => {
                // Any non-hex chip flushes the current partial byte,
                // right-padded with zeros.
                if nbits > 0 {
                    push_byte(&mut out, partial << (8 - nbits), &mut bytes_in_group);
                    partial = 0;
                    nbits = 0;
                }
                out.push(' ');
                out.push(other.to_ascii() as char);
                out.push(' ');
            }
        }
    }
    if nbits > 0 {
        push_byte(&mut out, partial << (8 - nbits), &mut bytes_in_group);
    }
    out.trim_end().to_string()
}

fn render_bit_line(annotations: &[Annotation]) -> String {
    let mut out = String::new();
    let mut group = 0u32;
    for a in annotations {
        match a {
            Annotation::Bit(bit) => {
                out.push(if *bit { '1' } else { '0' });
                group += 1;
                if group == 4 {
                    out.push(' ');
                    group = 0;
                }
            }
            other => {
                out.push(' ');
                out.push(other.to_ascii() as char);
                out.push(' ');
                group = 0;
            }
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip::ChipClass;
    use crate::decoder::{self, AnnotatedPacket};
    use crate::display::NullDisplay;

    fn cfg() -> ModemConfig {
        ModemConfig::new(40_000) // SPS = 10
    }

    #[test]
    fn tick_reports_host_contract_sizes() {
        let block = Block::new(cfg(), Arc::new(NullDisplay));
        assert_eq!(block.input_rate(), 2 * cfg().avg_len() + 2);
        assert_eq!(block.history_requirement(), 2 * cfg().avg_len() + 1);
    }

    #[test]
    fn tick_primes_and_respects_consumed_bound() {
        let mut block = Block::new(cfg(), Arc::new(NullDisplay));
        let n = block.input_rate() as usize * 3;
        let input = vec![Sample::new(0.0, 0.0); n];
        let mut output = vec![Sample::new(0.0, 0.0); n];
        let (consumed, produced) = block.tick(&input, &mut output);
        assert!(consumed + 2 * cfg().avg_len() as usize + 1 < n + 1);
        assert!(produced <= output.len());
    }

    #[test]
    fn idle_without_monitor_still_fills_silence() {
        // The sliding averages advance every sample regardless of
        // monitor/protocol state (so enabling monitor mid-stream sees
        // a warm pipeline); the underflow filler therefore still keeps
        // output sample-aligned with input even while fully idle.
        let mut block = Block::new(cfg(), Arc::new(NullDisplay));
        let n = block.input_rate() as usize * 2;
        let input = vec![Sample::new(0.0, 0.0); n];
        let mut output = vec![Sample::new(1.0, 1.0); n];
        let (_consumed, produced) = block.tick(&input, &mut output);
        assert!(produced > 0);
        assert!(output[..produced].iter().all(|s| *s == Sample::new(0.0, 0.0)));
    }

    #[test]
    fn monitor_mode_drives_underflow_filler() {
        let mut block = Block::new(cfg(), Arc::new(NullDisplay));
        block.control().set_monitor(true);
        let n = block.input_rate() as usize * 2;
        let input = vec![Sample::new(0.0, 0.0); n];
        let mut output = vec![Sample::new(-1.0, -1.0); n];
        let (_consumed, produced) = block.tick(&input, &mut output);
        assert!(produced > 0, "monitor mode must advance tx_sample_number via filler");
        assert!(output[..produced].iter().all(|s| *s == Sample::new(0.0, 0.0)));
    }

    #[test]
    fn render_hex_line_packs_msb_first() {
        let packet = decoder::decode(&mut [
            ChipClass::Low,
            ChipClass::High,
            ChipClass::Low,
            ChipClass::High,
            ChipClass::Low,
            ChipClass::High,
            ChipClass::Low,
            ChipClass::High,
            ChipClass::Low,
            ChipClass::High,
            ChipClass::Low,
            ChipClass::High,
            ChipClass::Low,
            ChipClass::High,
            ChipClass::Low,
            ChipClass::High,
        ]);
        // 8 "Low,High" pairs decode to 8 '0' bits -> one 0x00 byte.
        let line = render_hex_line(packet.annotations());
        assert_eq!(line, "00");
    }

    #[test]
    fn render_hex_line_flushes_partial_byte_on_non_bit() {
        let mut anns = vec![Annotation::Bit(true), Annotation::Bit(true), Annotation::Violation(false)];
        anns.truncate(3);
        let packet = AnnotatedPacket::from_annotations(anns);
        // "11" right-padded to "11000000" = 0xc0, then " v ".
        let line = render_hex_line(packet.annotations());
        assert_eq!(line, "c0 v");
    }
}
