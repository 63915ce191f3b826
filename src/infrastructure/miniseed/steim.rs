// Steim1 / Steim2 differenced integer decoding
use super::RecordError;
use super::header::{ByteOrder, FieldReader};

pub const FRAME_LEN: usize = 64;
const WORDS_PER_FRAME: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SteimLevel {
    One,
    Two,
}

/// Decode `count` samples from Steim frames.
pub fn decode_steim(
    payload: &[u8],
    count: usize,
    order: ByteOrder,
    level: SteimLevel,
) -> Result<Vec<i32>, RecordError> {
    if count == 0 {
        return Ok(Vec::new());
    }

    let reader = FieldReader::new(payload, order);
    let frame_count = payload.len() / FRAME_LEN;
    if frame_count == 0 {
        return Err(RecordError::TruncatedPayload {
            declared: count,
            available: 0,
        });
    }

    let first = reader.i32(4).unwrap_or(0);
    let last = reader.i32(8).unwrap_or(0);
    let mut diffs: Vec<i32> = Vec::with_capacity(count);

    'frames: for frame in 0..frame_count {
        let base = frame * FRAME_LEN;
        let control = reader.u32(base).unwrap_or(0);

        for slot in 1..WORDS_PER_FRAME {
            // frame 0 words 1 and 2 are the integration constants
            if frame == 0 && slot < 3 {
                continue;
            }
            let code = (control >> (30 - 2 * slot)) & 0b11;
            let word = reader.u32(base + slot * 4).unwrap_or(0);
            unpack_word(word, code, level, &mut diffs)?;
            if diffs.len() >= count {
                break 'frames;
            }
        }
    }

    if diffs.len() < count {
        return Err(RecordError::TruncatedPayload {
            declared: count,
            available: diffs.len(),
        });
    }

    let mut samples = Vec::with_capacity(count);
    samples.push(first);
    for diff in &diffs[1..count] {
        let previous = samples[samples.len() - 1];
        samples.push(previous.wrapping_add(*diff));
    }

    if samples[count - 1] != last {
        tracing::warn!(
            "Steim reverse integration constant mismatch: last sample {}, expected {}",
            samples[count - 1],
            last
        );
    }

    Ok(samples)
}

fn unpack_word(
    word: u32,
    code: u32,
    level: SteimLevel,
    diffs: &mut Vec<i32>,
) -> Result<(), RecordError> {
    match (level, code) {
        (_, 0) => {}
        (_, 1) => push_packed(word, 8, 4, diffs),
        (SteimLevel::One, 2) => push_packed(word, 16, 2, diffs),
        (SteimLevel::One, 3) => diffs.push(word as i32),
        (SteimLevel::Two, 2) => match word >> 30 {
            0b01 => push_packed(word, 30, 1, diffs),
            0b10 => push_packed(word, 15, 2, diffs),
            0b11 => push_packed(word, 10, 3, diffs),
            _ => return Err(corrupt(code, word)),
        },
        (SteimLevel::Two, 3) => match word >> 30 {
            0b00 => push_packed(word, 6, 5, diffs),
            0b01 => push_packed(word, 5, 6, diffs),
            0b10 => push_packed(word, 4, 7, diffs),
            _ => return Err(corrupt(code, word)),
        },
        _ => return Err(corrupt(code, word)),
    }
    Ok(())
}

/// Push `count` signed `bits`-wide values, most significant first, right-aligned in `word`.
fn push_packed(word: u32, bits: u32, count: u32, diffs: &mut Vec<i32>) {
    for i in 0..count {
        let shift = bits * (count - 1 - i);
        let raw = (word >> shift) & mask(bits);
        diffs.push(sign_extend(raw, bits));
    }
}

fn mask(bits: u32) -> u32 {
    if bits >= 32 { u32::MAX } else { (1 << bits) - 1 }
}

fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

fn corrupt(code: u32, word: u32) -> RecordError {
    RecordError::CorruptPayload(format!(
        "invalid Steim nibble {} for word 0x{:08x}",
        code, word
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::miniseed::fixtures::{steim1_frames, steim2_frames};

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend(0b1111, 4), -1);
        assert_eq!(sign_extend(0b0111, 4), 7);
        assert_eq!(sign_extend(0x20, 6), -32);
        assert_eq!(sign_extend(0x3FFF_FFFF, 30), -1);
    }

    #[test]
    fn test_steim1_mixed_widths() {
        let samples = vec![10, 12, 9, 9, 300, -40_000, 70_000, 70_001, 69_990];
        let frames = steim1_frames(&samples, 1, ByteOrder::Big);
        let decoded = decode_steim(&frames, samples.len(), ByteOrder::Big, SteimLevel::One).unwrap();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn test_steim2_mixed_widths() {
        let samples: Vec<i32> = vec![0, 1, -1, 2, 3, 5, 4, 20, -15, 100, 600, -600, 20_000, -300_000, 3, 3];
        let frames = steim2_frames(&samples, 1, ByteOrder::Big);
        let decoded = decode_steim(&frames, samples.len(), ByteOrder::Big, SteimLevel::Two).unwrap();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn test_steim_spanning_frames_little_endian() {
        let samples: Vec<i32> = (0..150).map(|i| (i * i) % 977 - 400).collect();
        let frames = steim1_frames(&samples, 1, ByteOrder::Little);
        assert!(frames.len() > FRAME_LEN);
        let decoded = decode_steim(&frames, samples.len(), ByteOrder::Little, SteimLevel::One).unwrap();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn test_steim_truncated() {
        let samples: Vec<i32> = (0..20).collect();
        let frames = steim2_frames(&samples, 1, ByteOrder::Big);
        let err = decode_steim(&frames, 500, ByteOrder::Big, SteimLevel::Two).unwrap_err();
        assert!(matches!(
            err,
            RecordError::TruncatedPayload { declared: 500, .. }
        ));
    }

    #[test]
    fn test_steim2_invalid_nibble() {
        let mut frames = vec![0u8; FRAME_LEN];
        // slot 3 uses code 3 with dnib 11
        frames[0..4].copy_from_slice(&(0b11u32 << 24).to_be_bytes());
        frames[12..16].copy_from_slice(&0xC000_0000u32.to_be_bytes());
        let err = decode_steim(&frames, 4, ByteOrder::Big, SteimLevel::Two).unwrap_err();
        assert!(matches!(err, RecordError::CorruptPayload(_)));
    }
}
