//! Reassembly of state frames from BLE notification chunks.
//!
//! The device pushes its 100-byte state frame as a series of notifications
//! whose size depends on the negotiated MTU. [`FrameAssembler`] accumulates
//! those chunks and yields a [`Frame`] once enough bytes have arrived.

use bytes::{Bytes, BytesMut};

use crate::command::COMMAND_PREFIX;
use crate::error::ParseResult;
use crate::state::{DeviceState, STATE_FRAME_LEN};

/// One complete state frame, exactly [`STATE_FRAME_LEN`] bytes long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Bytes);

impl Frame {
    /// Raw frame bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Decode the frame into a state snapshot.
    pub fn decode(&self) -> ParseResult<DeviceState> {
        DeviceState::from_bytes(&self.0)
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// What happened to a chunk fed into a [`FrameAssembler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Empty chunk, nothing to do.
    Empty,
    /// Stray chunk that cannot start a frame; dropped.
    Discarded,
    /// The buffered bytes no longer start with the prefix; buffer cleared.
    Desynchronized,
    /// Chunk appended, frame not complete yet.
    Buffered(usize),
    /// A frame was completed.
    Complete(Frame),
}

/// Accumulates notification chunks into state frames.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buffer: BytesMut,
}

impl FrameAssembler {
    /// Create an empty assembler.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(STATE_FRAME_LEN),
        }
    }

    /// Feed one chunk.
    ///
    /// Surplus bytes beyond a completed frame are dropped so they cannot
    /// corrupt the next frame.
    pub fn push(&mut self, chunk: &[u8]) -> ChunkOutcome {
        let Some(&first) = chunk.first() else {
            return ChunkOutcome::Empty;
        };

        if self.buffer.is_empty() && first != COMMAND_PREFIX[0] {
            return ChunkOutcome::Discarded;
        }

        self.buffer.extend_from_slice(chunk);

        if self.buffer.len() >= COMMAND_PREFIX.len()
            && self.buffer[..COMMAND_PREFIX.len()] != COMMAND_PREFIX
        {
            self.buffer.clear();
            return ChunkOutcome::Desynchronized;
        }

        if self.buffer.len() >= STATE_FRAME_LEN {
            let frame = self.buffer.split_to(STATE_FRAME_LEN).freeze();
            self.buffer.clear();
            return ChunkOutcome::Complete(Frame(frame));
        }

        ChunkOutcome::Buffered(self.buffer.len())
    }

    /// Drop any partially assembled frame.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::offset;
    use proptest::prelude::*;

    fn sample_frame() -> Vec<u8> {
        let mut frame = vec![0u8; STATE_FRAME_LEN];
        frame[..2].copy_from_slice(&COMMAND_PREFIX);
        frame[offset::POWER] = 1;
        frame[offset::SPEED_IN] = 40;
        frame[offset::SPEED_OUT] = 60;
        frame[offset::BRIGHTNESS] = 0x08;
        frame[offset::HUMIDITY] = 0xA0;
        frame[offset::TEMP_IN..offset::TEMP_IN + 2].copy_from_slice(&[0x00, 0xC8]);
        frame[offset::DISPLAY] = 0x5;
        frame
    }

    fn feed_all(assembler: &mut FrameAssembler, chunks: &[&[u8]]) -> Vec<Frame> {
        chunks
            .iter()
            .filter_map(|chunk| match assembler.push(chunk) {
                ChunkOutcome::Complete(frame) => Some(frame),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_single_chunk() {
        let data = sample_frame();
        let mut assembler = FrameAssembler::new();
        let frames = feed_all(&mut assembler, &[&data]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_bytes(), &data[..]);
        assert_eq!(assembler.buffered(), 0);
    }

    #[test]
    fn test_split_in_half() {
        let data = sample_frame();
        let mut assembler = FrameAssembler::new();
        assert_eq!(assembler.push(&data[..50]), ChunkOutcome::Buffered(50));
        let frames = feed_all(&mut assembler, &[&data[50..]]);
        assert_eq!(frames.len(), 1);
        assert_eq!(
            frames[0].decode().unwrap(),
            DeviceState::from_bytes(&data).unwrap()
        );
    }

    #[test]
    fn test_one_byte_chunks() {
        let data = sample_frame();
        let mut assembler = FrameAssembler::new();
        let chunks: Vec<&[u8]> = data.chunks(1).collect();
        let frames = feed_all(&mut assembler, &chunks);
        assert_eq!(frames.len(), 1);

        let state = frames[0].decode().unwrap();
        assert_eq!(state.brightness, 4);
        assert_eq!(state.humidity, 32);
        assert_eq!(state.speed, 6);
        assert!((state.temp_in - 20.0).abs() < 0.001);
    }

    #[test]
    fn test_empty_chunk_ignored() {
        let mut assembler = FrameAssembler::new();
        assert_eq!(assembler.push(&[]), ChunkOutcome::Empty);
        assert_eq!(assembler.buffered(), 0);
    }

    #[test]
    fn test_stray_chunk_discarded() {
        let data = sample_frame();
        let mut assembler = FrameAssembler::new();
        assert_eq!(assembler.push(&[0x01, 0x02, 0x03]), ChunkOutcome::Discarded);
        assert_eq!(assembler.buffered(), 0);

        let frames = feed_all(&mut assembler, &[&data[..20], &data[20..]]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_bytes(), &data[..]);
    }

    #[test]
    fn test_prefix_mismatch_resets() {
        let data = sample_frame();
        let mut assembler = FrameAssembler::new();
        assert_eq!(assembler.push(&[0xBE]), ChunkOutcome::Buffered(1));
        assert_eq!(assembler.push(&[0x00, 0x11]), ChunkOutcome::Desynchronized);
        assert_eq!(assembler.buffered(), 0);

        let frames = feed_all(&mut assembler, &[&data]);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_surplus_bytes_dropped() {
        let mut data = sample_frame();
        data.extend_from_slice(&[0xBE, 0xEF, 0x00]);
        let mut assembler = FrameAssembler::new();
        let frames = feed_all(&mut assembler, &[&data]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_bytes().len(), STATE_FRAME_LEN);
        assert_eq!(assembler.buffered(), 0);

        // The next frame assembles cleanly.
        let next = sample_frame();
        assert_eq!(feed_all(&mut assembler, &[&next]).len(), 1);
    }

    #[test]
    fn test_reset_drops_partial_frame() {
        let data = sample_frame();
        let mut assembler = FrameAssembler::new();
        assembler.push(&data[..30]);
        assembler.reset();
        assert_eq!(assembler.buffered(), 0);
        assert!(feed_all(&mut assembler, &[&data[30..]]).is_empty());
    }

    proptest! {
        /// Any chunking of a valid frame decodes to the same state as the whole frame.
        #[test]
        fn arbitrary_splits_yield_same_state(cuts in proptest::collection::vec(1usize..STATE_FRAME_LEN, 0..12)) {
            let data = sample_frame();
            let mut cuts = cuts;
            cuts.sort_unstable();
            cuts.dedup();

            let mut chunks: Vec<&[u8]> = Vec::new();
            let mut start = 0;
            for cut in cuts {
                chunks.push(&data[start..cut]);
                start = cut;
            }
            chunks.push(&data[start..]);

            let mut assembler = FrameAssembler::new();
            let frames = feed_all(&mut assembler, &chunks);
            prop_assert_eq!(frames.len(), 1);
            prop_assert_eq!(frames[0].decode().unwrap(), DeviceState::from_bytes(&data).unwrap());
        }

        /// Leading garbage that never starts with the prefix byte does not disturb reassembly.
        #[test]
        fn leading_garbage_is_discarded(garbage in proptest::collection::vec(0u8..0xBE, 1..8)) {
            let data = sample_frame();
            let mut assembler = FrameAssembler::new();
            for byte in &garbage {
                prop_assert_eq!(assembler.push(&[*byte]), ChunkOutcome::Discarded);
            }
            let frames = feed_all(&mut assembler, &[&data[..7], &data[7..]]);
            prop_assert_eq!(frames.len(), 1);
            prop_assert_eq!(frames[0].as_bytes(), &data[..]);
        }

        /// Feeding random bytes never panics.
        #[test]
        fn random_chunks_never_panic(chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..40), 0..10)) {
            let mut assembler = FrameAssembler::new();
            for chunk in &chunks {
                let _ = assembler.push(chunk);
                prop_assert!(assembler.buffered() < STATE_FRAME_LEN);
            }
        }
    }
}
