// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Protocol state machine and status-on packet builder.
//!
//! [`ProtocolState`] itself is one of the four fields guarded by
//! [`crate::control::Control`]'s mutex; this module supplies the pure
//! packet-construction logic and the transition table's *actions* (log
//! lines, packet synthesis), which [`crate::block::Block::tick`] invokes
//! while holding a snapshot of the shared state.

use crate::config::STATUS_PACKET_CAP;
use crate::decoder::{AnnotatedPacket, Annotation};

/// The protocol's finite states.
///
/// `On` is reserved: no transition in this state machine ever enters
/// or leaves it. It is kept as a named variant rather than removed so
/// the state set stays a faithful four-state enumeration of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    Idle,
    On,
    Status,
    StatusOnSent,
}

impl Default for ProtocolState {
    fn default() -> Self {
        ProtocolState::Idle
    }
}

const START: &str = "1110101011";
const AB: &str = "10101011";
const THREE: &str = "0011";
const SEVEN: &str = "0111";
const TOKEN_B: &str = "1011";
const TOKEN_F: &str = "1111";

const OUTER_FRAMES: usize = 10;
const INNER_REPEATS: usize = 17;

fn push_bits(out: &mut Vec<Annotation>, bits: &str) {
    out.extend(bits.bytes().map(|c| Annotation::Bit(c == b'1')));
}

fn push_byte_bits(out: &mut Vec<Annotation>, byte: u8) {
    out.extend((0..8).rev().map(|i| Annotation::Bit((byte >> i) & 1 == 1)));
}

/// `"v" + bits(byte) + token + AB`, one quarter of an inner repeat.
fn push_subframe(out: &mut Vec<Annotation>, byte: u8, token: &str) {
    out.push(Annotation::Violation(false));
    push_byte_bits(out, byte);
    push_bits(out, token);
    push_bits(out, AB);
}

/// Build the status-on packet body for the given 32-bit secret.
///
/// The byte order consumed per inner repeat is `b[1], b[0], b[3], b[2]`,
/// where `b[0]` is the most-significant byte of `secret`. The nominal
/// composition (10 outer frames × (10 + 17×84) chars) vastly exceeds
/// [`STATUS_PACKET_CAP`]; truncation is expected and intentional — the
/// caller is told whether truncation occurred so it can surface a
/// warning.
#[must_use]
pub fn build_status_on_packet(secret: u32, silence_tokens: u32) -> (AnnotatedPacket, bool) {
    let b = secret.to_be_bytes();
    let mut out = Vec::new();

    'outer: for _ in 0..OUTER_FRAMES {
        push_bits(&mut out, START);
        for _ in 0..INNER_REPEATS {
            push_subframe(&mut out, b[1], THREE);
            push_subframe(&mut out, b[0], SEVEN);
            push_subframe(&mut out, b[3], TOKEN_B);
            push_subframe(&mut out, b[2], TOKEN_F);
        }
        for _ in 0..silence_tokens {
            out.push(Annotation::Silence);
        }
        if out.len() > STATUS_PACKET_CAP {
            break 'outer;
        }
    }

    let mut packet = AnnotatedPacket::from_annotations(out);
    let truncated = packet.truncate(STATUS_PACKET_CAP);
    (packet, truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_idle() {
        assert_eq!(ProtocolState::default(), ProtocolState::Idle);
    }

    #[test]
    fn scenario_e_byte_order_and_leading_bits() {
        let (packet, truncated) = build_status_on_packet(0x0102_0304, 0);
        assert!(truncated, "nominal composition must exceed the cap");
        assert_eq!(packet.len(), STATUS_PACKET_CAP);

        // First frame: START (10 bits) then "v" + bits(b[1]=0x02).
        let anns = packet.annotations();
        assert_eq!(anns[10], Annotation::Violation(false));
        let bits02: Vec<bool> = anns[11..19]
            .iter()
            .map(|a| matches!(a, Annotation::Bit(true)))
            .collect();
        assert_eq!(
            bits02,
            vec![false, false, false, false, false, false, true, false],
            "bits(0x02) must be 00000010"
        );
    }

    #[test]
    fn builder_never_exceeds_cap() {
        for secret in [0u32, 0xFFFF_FFFF, 0x1234_5678, 0xDEAD_BEEF] {
            let (packet, _) = build_status_on_packet(secret, 0);
            assert!(packet.len() <= STATUS_PACKET_CAP);
        }
    }

    #[test]
    fn truncation_point_is_deterministic() {
        let (a, _) = build_status_on_packet(42, 0);
        let (b, _) = build_status_on_packet(42, 0);
        assert_eq!(a.annotations(), b.annotations());
    }
}
