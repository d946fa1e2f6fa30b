//! Placement of clips inside a sprite.
//!
//! Every clip is decoded to the same PCM shape (s16le, 44.1 kHz, stereo), so
//! positions are tracked in frames and only converted to milliseconds at the
//! end. Clips sit back-to-back in request order with `gap_ms` of silence
//! after every clip but the last. Millisecond offsets are floored, which
//! keeps `end_i <= start_(i+1)` for any gap, including zero.

pub const SAMPLE_RATE: u64 = 44_100;
pub const CHANNELS: u64 = 2;
pub const BYTES_PER_SAMPLE: u64 = 2;
pub const FRAME_BYTES: u64 = CHANNELS * BYTES_PER_SAMPLE;

/// Shortest clip whose floored offsets still satisfy `start < end`.
pub const MIN_CLIP_FRAMES: u64 = SAMPLE_RATE / 1000 + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start_frame: u64,
    pub frames: u64,
}

impl Segment {
    pub fn end_frame(&self) -> u64 {
        self.start_frame + self.frames
    }

    pub fn offsets_ms(&self) -> [u64; 2] {
        [frames_to_ms(self.start_frame), frames_to_ms(self.end_frame())]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteLayout {
    pub segments: Vec<Segment>,
    pub gap_frames: u64,
}

impl SpriteLayout {
    /// Lay out clips of the given lengths (in frames).
    ///
    /// Returns the index of the first clip that is too short to address.
    pub fn plan(clip_frames: &[u64], gap_ms: u64) -> Result<Self, usize> {
        let gap_frames = ms_to_frames(gap_ms);
        let mut segments = Vec::with_capacity(clip_frames.len());
        let mut cursor = 0u64;
        for (index, &frames) in clip_frames.iter().enumerate() {
            if frames < MIN_CLIP_FRAMES {
                return Err(index);
            }
            if index > 0 {
                cursor += gap_frames;
            }
            segments.push(Segment {
                start_frame: cursor,
                frames,
            });
            cursor += frames;
        }
        Ok(Self {
            segments,
            gap_frames,
        })
    }

    pub fn offsets(&self) -> Vec<[u64; 2]> {
        self.segments.iter().map(Segment::offsets_ms).collect()
    }

    pub fn total_frames(&self) -> u64 {
        self.segments.last().map(Segment::end_frame).unwrap_or(0)
    }

    pub fn gap_bytes(&self) -> u64 {
        self.gap_frames * FRAME_BYTES
    }
}

pub fn frames_to_ms(frames: u64) -> u64 {
    frames * 1000 / SAMPLE_RATE
}

pub fn ms_to_frames(ms: u64) -> u64 {
    ms * SAMPLE_RATE / 1000
}

/// Whole frames contained in a PCM buffer of `bytes` length.
pub fn frames_in(bytes: u64) -> u64 {
    bytes / FRAME_BYTES
}
