// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Table-driven translator from a [`ChipBurst`](crate::chip::ChipBurst) of
//! [`ChipClass`] values into an annotated bit string.
//!
//! Stateless between invocations — all the state this component needs is
//! the input buffer itself, which it may rewrite in place at `i+1` during
//! the two documented merge cases (`TwoAndHalfLow` → `Low`,
//! `TwoAndHalfHigh` → `High`).

use crate::chip::ChipClass;
use ChipClass::*;

/// One annotation in a decoded packet. Tagged variants are the internal
/// representation; the ASCII alphabet `{0,1,v,^,*,#,X,S}` is produced
/// only at the display/TX boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Annotation {
    /// A decoded Manchester bit.
    Bit(bool),
    /// An emitted protocol violation. `true` = high-side, `false` = low-side.
    Violation(bool),
    /// An ambiguous-width heuristic guess.
    Ambiguous,
    /// An impossible chip-pair sequence.
    Impossible,
    /// An unrecognized chip.
    Unknown,
    /// Transmit-only silence (never produced by the decoder; see
    /// [`crate::tx::TxSynthesizer`]).
    Silence,
}

impl Annotation {
    /// ASCII encoding used for logging, display, and TX dispatch.
    #[must_use]
    pub fn to_ascii(self) -> u8 {
        match self {
            Annotation::Bit(false) => b'0',
            Annotation::Bit(true) => b'1',
            Annotation::Violation(false) => b'v',
            Annotation::Violation(true) => b'^',
            Annotation::Ambiguous => b'*',
            Annotation::Impossible => b'#',
            Annotation::Unknown => b'X',
            Annotation::Silence => b'S',
        }
    }
}

/// An annotated packet: a sequence of [`Annotation`]s decoded from one
/// chip burst.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotatedPacket(Vec<Annotation>);

impl AnnotatedPacket {
    /// Wrap an already-built annotation sequence (used by
    /// [`crate::protocol`] when assembling the status-on packet).
    #[must_use]
    pub fn from_annotations(annotations: Vec<Annotation>) -> Self {
        Self(annotations)
    }

    #[must_use]
    pub fn annotations(&self) -> &[Annotation] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Truncate to at most `cap` annotations, returning whether
    /// truncation occurred.
    pub fn truncate(&mut self, cap: usize) -> bool {
        let truncated = self.0.len() > cap;
        self.0.truncate(cap);
        truncated
    }

    /// Render as the `{0,1,v,^,*,#,X,S}` ASCII alphabet, terminated by
    /// a null byte.
    #[must_use]
    pub fn to_ascii_nul_terminated(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len() + 1);
        out.extend(self.0.iter().map(|a| a.to_ascii()));
        out.push(0);
        out
    }

    fn push(&mut self, a: Annotation) {
        self.0.push(a);
    }

    fn extend(&mut self, it: impl IntoIterator<Item = Annotation>) {
        self.0.extend(it);
    }
}

/// Decode a chip burst into an [`AnnotatedPacket`].
///
/// `chips` must have length ≥ 2; bursts shorter than that are never handed
/// to the decoder by [`crate::rx::RxPipeline`]. May mutate `chips[i+1]`
/// in place for the two documented merge cases. Never fails: every chip
/// pair maps to some annotation.
///
/// Output length is bounded at `4*N + 1` annotations; the longest
/// individual emission is 4 annotations (`v0^` plus one rewritten
/// trailing chip consumed on the next iteration), which can happen at most
/// `N/2` times, with rows 2/3 contributing one annotation per remaining
/// chip in the worst case.
pub fn decode(chips: &mut [ChipClass]) -> AnnotatedPacket {
    debug_assert!(chips.len() >= 2, "decode requires at least 2 chips");
    let mut out = AnnotatedPacket::default();
    let mut i = 0usize;
    let n = chips.len();

    // A trailing chip with no lookahead partner is left unconsumed rather
    // than guessed at: a pass over `[Low, High, HalfHigh]` terminates at
    // "0", not "0^", and a pass over `[Low, HalfLow]` terminates at "#",
    // with the lone `HalfLow` never visited at all.
    while i + 1 < n {
        let cur = chips[i];
        let next = chips[i + 1];

        match cur {
            // Rows 2/3: unconditional single-chip emissions, no lookahead consumed.
            HalfLow => {
                out.push(Annotation::Violation(false));
                i += 1;
            }
            HalfHigh => {
                out.push(Annotation::Violation(true));
                i += 1;
            }
            _ => {
                i = step(&mut out, chips, i, cur, next);
            }
        }
    }

    out
}

/// Apply one row of the 8×8 lookup table at cursor `i`, returning the
/// new cursor.
fn step(
    out: &mut AnnotatedPacket,
    chips: &mut [ChipClass],
    i: usize,
    cur: ChipClass,
    next: ChipClass,
) -> usize {
    match (cur, next) {
        // Row 0: cur = Low
        (Low, Low) => {
            out.push(Annotation::Ambiguous);
            i + 1
        }
        (Low, High) => {
            out.push(Annotation::Bit(false));
            i + 2
        }
        (Low, HalfLow) => {
            out.push(Annotation::Impossible);
            i + 1
        }
        (Low, HalfHigh) => {
            out.push(Annotation::Ambiguous);
            i + 1
        }
        (Low, OneAndHalfLow) => {
            out.push(Annotation::Impossible);
            i + 1
        }
        (Low, OneAndHalfHigh) => {
            out.extend([Annotation::Bit(false), Annotation::Violation(true)]);
            i + 2
        }
        (Low, TwoAndHalfLow) => {
            out.push(Annotation::Impossible);
            i + 1
        }
        (Low, TwoAndHalfHigh) => {
            out.extend([Annotation::Bit(false), Annotation::Violation(true)]);
            chips[i + 1] = High;
            i + 1
        }

        // Row 1: cur = High
        (High, Low) => {
            out.push(Annotation::Bit(true));
            i + 2
        }
        (High, High) => {
            out.push(Annotation::Ambiguous);
            i + 1
        }
        (High, HalfLow) => {
            out.push(Annotation::Ambiguous);
            i + 1
        }
        (High, HalfHigh) => {
            out.push(Annotation::Impossible);
            i + 1
        }
        (High, OneAndHalfLow) => {
            out.extend([Annotation::Bit(true), Annotation::Violation(false)]);
            i + 2
        }
        (High, OneAndHalfHigh) => {
            out.push(Annotation::Impossible);
            i + 1
        }
        (High, TwoAndHalfLow) => {
            out.extend([Annotation::Bit(true), Annotation::Violation(false)]);
            chips[i + 1] = Low;
            i + 1
        }
        (High, TwoAndHalfHigh) => {
            out.push(Annotation::Impossible);
            i + 1
        }

        // Row 4: cur = OneAndHalfLow ("v0...")
        (OneAndHalfLow, Low) => {
            out.push(Annotation::Impossible);
            i + 1
        }
        (OneAndHalfLow, High) => {
            out.extend([Annotation::Violation(false), Annotation::Bit(false)]);
            i + 2
        }
        (OneAndHalfLow, HalfLow) => {
            out.push(Annotation::Impossible);
            i + 1
        }
        (OneAndHalfLow, HalfHigh) => {
            out.extend([Annotation::Violation(false), Annotation::Ambiguous]);
            i + 1
        }
        (OneAndHalfLow, OneAndHalfLow) => {
            out.push(Annotation::Impossible);
            i + 1
        }
        (OneAndHalfLow, OneAndHalfHigh) => {
            out.extend([
                Annotation::Violation(false),
                Annotation::Bit(false),
                Annotation::Violation(true),
            ]);
            i + 2
        }
        (OneAndHalfLow, TwoAndHalfLow) => {
            out.push(Annotation::Impossible);
            i + 1
        }
        (OneAndHalfLow, TwoAndHalfHigh) => {
            out.extend([
                Annotation::Violation(false),
                Annotation::Bit(false),
                Annotation::Violation(true),
            ]);
            chips[i + 1] = High;
            i + 1
        }

        // Row 5: cur = OneAndHalfHigh ("^1...")
        (OneAndHalfHigh, Low) => {
            out.extend([Annotation::Violation(true), Annotation::Bit(true)]);
            i + 2
        }
        (OneAndHalfHigh, High) => {
            out.push(Annotation::Impossible);
            i + 1
        }
        (OneAndHalfHigh, HalfLow) => {
            out.extend([Annotation::Violation(true), Annotation::Ambiguous]);
            i + 1
        }
        (OneAndHalfHigh, HalfHigh) => {
            out.push(Annotation::Impossible);
            i + 1
        }
        (OneAndHalfHigh, OneAndHalfLow) => {
            out.extend([
                Annotation::Violation(true),
                Annotation::Bit(true),
                Annotation::Violation(false),
            ]);
            i + 2
        }
        (OneAndHalfHigh, OneAndHalfHigh) => {
            out.push(Annotation::Impossible);
            i + 1
        }
        (OneAndHalfHigh, TwoAndHalfLow) => {
            out.extend([
                Annotation::Violation(true),
                Annotation::Bit(true),
                Annotation::Violation(false),
            ]);
            chips[i + 1] = Low;
            i + 1
        }
        (OneAndHalfHigh, TwoAndHalfHigh) => {
            out.push(Annotation::Impossible);
            i + 1
        }

        // Row 6: cur = TwoAndHalfLow ("*v0...")
        (TwoAndHalfLow, Low) => {
            out.push(Annotation::Impossible);
            i + 1
        }
        (TwoAndHalfLow, High) => {
            out.extend([
                Annotation::Ambiguous,
                Annotation::Violation(false),
                Annotation::Bit(false),
            ]);
            i + 2
        }
        (TwoAndHalfLow, HalfLow) => {
            out.push(Annotation::Impossible);
            i + 1
        }
        (TwoAndHalfLow, HalfHigh) => {
            out.push(Annotation::Ambiguous);
            i + 1
        }
        (TwoAndHalfLow, OneAndHalfLow) => {
            out.push(Annotation::Impossible);
            i + 1
        }
        (TwoAndHalfLow, OneAndHalfHigh) => {
            out.extend([
                Annotation::Ambiguous,
                Annotation::Violation(false),
                Annotation::Bit(false),
                Annotation::Violation(false),
            ]);
            i + 2
        }
        (TwoAndHalfLow, TwoAndHalfLow) => {
            out.push(Annotation::Impossible);
            i + 1
        }
        (TwoAndHalfLow, TwoAndHalfHigh) => {
            out.extend([
                Annotation::Ambiguous,
                Annotation::Violation(false),
                Annotation::Bit(false),
                Annotation::Violation(true),
            ]);
            chips[i + 1] = High;
            i + 1
        }

        // Row 7: cur = TwoAndHalfHigh ("*^1...")
        (TwoAndHalfHigh, Low) => {
            out.extend([
                Annotation::Ambiguous,
                Annotation::Violation(true),
                Annotation::Bit(true),
            ]);
            i + 2
        }
        (TwoAndHalfHigh, High) => {
            out.push(Annotation::Impossible);
            i + 1
        }
        (TwoAndHalfHigh, HalfLow) => {
            out.push(Annotation::Ambiguous);
            i + 1
        }
        (TwoAndHalfHigh, HalfHigh) => {
            out.push(Annotation::Impossible);
            i + 1
        }
        (TwoAndHalfHigh, OneAndHalfLow) => {
            out.extend([
                Annotation::Ambiguous,
                Annotation::Violation(true),
                Annotation::Bit(true),
                Annotation::Violation(false),
            ]);
            i + 2
        }
        (TwoAndHalfHigh, OneAndHalfHigh) => {
            out.push(Annotation::Impossible);
            i + 1
        }
        (TwoAndHalfHigh, TwoAndHalfLow) => {
            out.extend([
                Annotation::Ambiguous,
                Annotation::Violation(true),
                Annotation::Bit(true),
                Annotation::Violation(false),
            ]);
            chips[i + 1] = Low;
            i + 1
        }
        (TwoAndHalfHigh, TwoAndHalfHigh) => {
            out.push(Annotation::Impossible);
            i + 1
        }

        // Rows 2/3 (HalfLow/HalfHigh) as `cur` are handled by the caller
        // before `step` is invoked; unreachable here.
        (HalfLow | HalfHigh, _) => unreachable!("half-violation rows handled by caller"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ascii(chips: &mut [ChipClass]) -> String {
        let packet = decode(chips);
        packet
            .annotations()
            .iter()
            .map(|a| a.to_ascii() as char)
            .collect()
    }

    #[test]
    fn scenario_b_alternating_chips() {
        assert_eq!(ascii(&mut [Low, High, Low, High]), "00");
        assert_eq!(ascii(&mut [High, Low, High, Low]), "11");
    }

    #[test]
    fn scenario_b_leading_violation() {
        assert_eq!(ascii(&mut [HalfLow, Low, High]), "v0");
    }

    #[test]
    fn scenario_c_embedded_violation_single_pass() {
        let mut chips = [Low, High, HalfHigh, High];
        let packet = decode(&mut chips);
        let rendered: String = packet.annotations().iter().map(|a| a.to_ascii() as char).collect();
        assert_eq!(rendered, "0^");
        assert_eq!(packet.annotations().len(), 2);
    }

    #[test]
    fn scenario_d_ambiguous_and_impossible() {
        assert_eq!(ascii(&mut [Low, Low]), "*");
        // The trailing `HalfLow` has no lookahead partner, so it is left
        // unconsumed rather than decoded standalone.
        assert_eq!(ascii(&mut [Low, HalfLow]), "#");
    }

    #[test]
    fn merge_case_two_and_half_low_rewrites_next_chip() {
        let mut chips = [High, TwoAndHalfLow, High, Low];
        let out = decode(&mut chips);
        assert_eq!(chips[1], Low, "TwoAndHalfLow must rewrite to Low at i+1");
        assert!(!out.annotations().is_empty());
    }

    #[test]
    fn merge_case_two_and_half_high_rewrites_next_chip() {
        let mut chips = [Low, TwoAndHalfHigh, Low, High];
        decode(&mut chips);
        assert_eq!(chips[1], High, "TwoAndHalfHigh must rewrite to High at i+1");
    }

    #[test]
    fn terminates_and_stays_within_bound_for_random_sequences() {
        // Deterministic xorshift PRNG — no external `rand` dependency needed
        // for this bulk invariant check.
        let mut state: u32 = 0x1234_5678;
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state
        };

        for _ in 0..2000 {
            let n = 2 + (next() % 64) as usize;
            let mut chips: Vec<ChipClass> = (0..n)
                .map(|_| match next() % 8 {
                    0 => Low,
                    1 => High,
                    2 => HalfLow,
                    3 => HalfHigh,
                    4 => OneAndHalfLow,
                    5 => OneAndHalfHigh,
                    6 => TwoAndHalfLow,
                    _ => TwoAndHalfHigh,
                })
                .collect();
            let packet = decode(&mut chips);
            assert!(
                packet.annotations().len() <= 4 * n + 1,
                "decoder output exceeded 4N+1 bound: n={n} len={}",
                packet.annotations().len()
            );
            let ascii = packet.to_ascii_nul_terminated();
            assert_eq!(*ascii.last().unwrap(), 0, "output must be null-terminated");
        }
    }
}
