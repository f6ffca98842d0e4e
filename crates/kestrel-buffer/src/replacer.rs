//! Page replacement policies for the buffer pool.

use crate::frame::FrameId;
use kestrel_common::{KestrelError, Result};
use parking_lot::Mutex;

/// What the pool sees when the clock hand stops on a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidate {
    /// The frame holds no page; take it as-is.
    Empty,
    /// The frame was referenced since the hand last passed; the caller has
    /// cleared its reference bit and the frame gets a second chance.
    Referenced,
    /// The frame is pinned and cannot be reclaimed right now.
    Pinned,
    /// Unpinned, unreferenced; eligible for eviction.
    Evictable,
}

/// Trait for page replacement algorithms.
///
/// The replacer owns only its sweep state; frame inspection goes through
/// the classification closure so the pool keeps ownership of frame
/// metadata. Write-back and index maintenance for the selected victim are
/// the caller's job.
pub trait Replacer: Send + Sync {
    /// Selects a victim frame for eviction.
    ///
    /// `classify` reports the state of the frame under the hand; returning
    /// [`Candidate::Referenced`] must also clear that frame's reference
    /// bit, or the sweep will not terminate.
    ///
    /// Fails with `BufferPoolFull` when an entire sweep observes every
    /// frame pinned.
    fn select_victim(&self, classify: &mut dyn FnMut(FrameId) -> Candidate) -> Result<FrameId>;

    /// Returns the number of frames covered by this replacer.
    fn capacity(&self) -> usize;
}

/// Clock (second-chance) replacement.
///
/// A single hand rotates over the frame array. Invalid frames are taken
/// immediately; referenced frames lose their bit and are passed over once;
/// pinned frames are skipped and counted. The pinned count restarts each
/// time the hand completes a full sweep past its origin, so a frame
/// unpinned while the hand is elsewhere is revisited within the same call.
/// Selection fails only when one entire sweep saw every frame pinned.
pub struct ClockReplacer {
    /// Number of frames.
    num_frames: usize,
    /// Current clock hand position.
    hand: Mutex<usize>,
}

impl ClockReplacer {
    /// Creates a new clock replacer with the given number of frames.
    ///
    /// The hand starts on the last frame so the first advance lands on
    /// frame 0.
    pub fn new(num_frames: usize) -> Self {
        Self {
            num_frames,
            hand: Mutex::new(num_frames.saturating_sub(1)),
        }
    }
}

impl Replacer for ClockReplacer {
    fn select_victim(&self, classify: &mut dyn FnMut(FrameId) -> Candidate) -> Result<FrameId> {
        let n = self.num_frames;
        if n == 0 {
            return Err(KestrelError::BufferPoolFull);
        }

        let mut hand = self.hand.lock();
        let origin = *hand;
        let mut pinned_seen = 0;

        loop {
            *hand = (*hand + 1) % n;
            let frame_id = FrameId(*hand as u32);

            match classify(frame_id) {
                Candidate::Empty | Candidate::Evictable => return Ok(frame_id),
                Candidate::Referenced => {}
                Candidate::Pinned => {
                    pinned_seen += 1;
                    if pinned_seen >= n {
                        return Err(KestrelError::BufferPoolFull);
                    }
                }
            }

            // Full sweep completed without the pool being exhausted: pins
            // may have been released behind the hand, so start counting
            // afresh rather than accumulating stale observations.
            if *hand == origin {
                pinned_seen = 0;
            }
        }
    }

    fn capacity(&self) -> usize {
        self.num_frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Drives select_victim over a mutable state array, modeling what the
    // pool's classification closure does: report state, clear ref bits.
    fn select(replacer: &ClockReplacer, states: &mut [Candidate]) -> Result<FrameId> {
        replacer.select_victim(&mut |frame_id| {
            let idx = frame_id.0 as usize;
            let state = states[idx];
            if state == Candidate::Referenced {
                states[idx] = Candidate::Evictable;
            }
            state
        })
    }

    #[test]
    fn test_clock_replacer_capacity() {
        let replacer = ClockReplacer::new(10);
        assert_eq!(replacer.capacity(), 10);
    }

    #[test]
    fn test_first_selection_lands_on_frame_zero() {
        let replacer = ClockReplacer::new(5);
        let mut states = [Candidate::Empty; 5];

        assert_eq!(select(&replacer, &mut states).unwrap(), FrameId(0));
    }

    #[test]
    fn test_hand_persists_across_calls() {
        let replacer = ClockReplacer::new(3);
        let mut states = [Candidate::Empty; 3];

        assert_eq!(select(&replacer, &mut states).unwrap(), FrameId(0));
        assert_eq!(select(&replacer, &mut states).unwrap(), FrameId(1));
        assert_eq!(select(&replacer, &mut states).unwrap(), FrameId(2));
        assert_eq!(select(&replacer, &mut states).unwrap(), FrameId(0));
    }

    #[test]
    fn test_referenced_frames_get_second_chance() {
        let replacer = ClockReplacer::new(3);
        let mut states = [
            Candidate::Referenced,
            Candidate::Evictable,
            Candidate::Evictable,
        ];

        // Frame 0 is passed over once; frame 1 is taken.
        assert_eq!(select(&replacer, &mut states).unwrap(), FrameId(1));
        // Frame 0 lost its reference bit during the previous sweep.
        assert_eq!(states[0], Candidate::Evictable);
    }

    #[test]
    fn test_all_referenced_selects_after_one_sweep() {
        let replacer = ClockReplacer::new(3);
        let mut states = [Candidate::Referenced; 3];

        // First sweep clears every bit; the second advance takes frame 0.
        assert_eq!(select(&replacer, &mut states).unwrap(), FrameId(0));
    }

    #[test]
    fn test_pinned_frames_skipped() {
        let replacer = ClockReplacer::new(3);
        let mut states = [
            Candidate::Pinned,
            Candidate::Pinned,
            Candidate::Evictable,
        ];

        assert_eq!(select(&replacer, &mut states).unwrap(), FrameId(2));
    }

    #[test]
    fn test_empty_frame_selected_over_later_evictable() {
        let replacer = ClockReplacer::new(3);
        let mut states = [
            Candidate::Empty,
            Candidate::Evictable,
            Candidate::Evictable,
        ];

        assert_eq!(select(&replacer, &mut states).unwrap(), FrameId(0));
    }

    #[test]
    fn test_all_pinned_fails() {
        let replacer = ClockReplacer::new(3);
        let mut states = [Candidate::Pinned; 3];

        let err = select(&replacer, &mut states).unwrap_err();
        assert!(matches!(err, KestrelError::BufferPoolFull));
    }

    #[test]
    fn test_pinned_and_referenced_mix_fails_only_when_truly_exhausted() {
        let replacer = ClockReplacer::new(3);
        // One referenced frame among pinned ones: the first sweep spends
        // its second chance, the next sweep takes it.
        let mut states = [
            Candidate::Pinned,
            Candidate::Referenced,
            Candidate::Pinned,
        ];

        assert_eq!(select(&replacer, &mut states).unwrap(), FrameId(1));
    }

    #[test]
    fn test_unpinned_mid_sweep_is_revisited() {
        let replacer = ClockReplacer::new(3);

        // Frames 0 and 1 pinned, frame 2 referenced. After the first full
        // sweep the pinned counter restarts; by then the caller has
        // released frame 0, so the same call selects it instead of
        // reporting exhaustion.
        let mut states = [
            Candidate::Pinned,
            Candidate::Pinned,
            Candidate::Referenced,
        ];
        let mut sweeps = 0;
        let victim = replacer
            .select_victim(&mut |frame_id| {
                let idx = frame_id.0 as usize;
                if idx == 2 {
                    sweeps += 1;
                    if sweeps == 1 {
                        states[0] = Candidate::Evictable;
                        states[2] = Candidate::Evictable;
                        return Candidate::Referenced;
                    }
                }
                states[idx]
            })
            .unwrap();

        assert_eq!(victim, FrameId(0));
    }

    #[test]
    fn test_zero_frames_fails_immediately() {
        let replacer = ClockReplacer::new(0);
        let err = replacer
            .select_victim(&mut |_| Candidate::Empty)
            .unwrap_err();
        assert!(matches!(err, KestrelError::BufferPoolFull));
    }
}
