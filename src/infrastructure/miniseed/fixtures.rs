// Test-only miniSEED record writer
use super::header::ByteOrder;
use super::steim::FRAME_LEN;
use bytes::BufMut;
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};

const FIXED_HEADER_AND_BLOCKETTES: usize = 64;
const WITH_RATE_BLOCKETTE: usize = 128;

pub struct RecordBuilder {
    network: String,
    station: String,
    location: String,
    channel: String,
    start: DateTime<Utc>,
    sample_rate: f64,
    actual_rate: Option<f32>,
    order: ByteOrder,
    record_length: usize,
    encoding: u8,
    payload: Vec<u8>,
    sample_count: usize,
    frame_count: u8,
    declared_count: Option<usize>,
    sequence: u32,
}

impl RecordBuilder {
    /// `channel_id` is `NET.STA.LOC.CHA`.
    pub fn new(channel_id: &str, sample_rate: f64) -> Self {
        let parts: Vec<&str> = channel_id.split('.').collect();
        assert_eq!(parts.len(), 4, "channel id needs four parts");
        Self {
            network: parts[0].to_string(),
            station: parts[1].to_string(),
            location: parts[2].to_string(),
            channel: parts[3].to_string(),
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            sample_rate,
            actual_rate: None,
            order: ByteOrder::Big,
            record_length: 512,
            encoding: 3,
            payload: Vec::new(),
            sample_count: 0,
            frame_count: 0,
            declared_count: None,
            sequence: 1,
        }
    }

    pub fn starting_at(mut self, start: DateTime<Utc>) -> Self {
        self.start = start;
        self
    }

    pub fn little_endian(mut self) -> Self {
        self.order = ByteOrder::Little;
        self
    }

    pub fn record_length(mut self, length: usize) -> Self {
        assert!(length.is_power_of_two());
        self.record_length = length;
        self
    }

    pub fn actual_rate(mut self, rate: f32) -> Self {
        self.actual_rate = Some(rate);
        self
    }

    pub fn sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }

    /// Header sample count that disagrees with the payload.
    pub fn declared_count(mut self, count: usize) -> Self {
        self.declared_count = Some(count);
        self
    }

    pub fn encoding_tag(mut self, tag: u8) -> Self {
        self.encoding = tag;
        self
    }

    pub fn int16(mut self, samples: &[i16]) -> Self {
        self.encoding = 1;
        self.sample_count = samples.len();
        self.payload.clear();
        for s in samples {
            put_u16(&mut self.payload, *s as u16, self.order);
        }
        self
    }

    pub fn int32(mut self, samples: &[i32]) -> Self {
        self.encoding = 3;
        self.sample_count = samples.len();
        self.payload.clear();
        for s in samples {
            put_u32(&mut self.payload, *s as u32, self.order);
        }
        self
    }

    pub fn float32(mut self, samples: &[f32]) -> Self {
        self.encoding = 4;
        self.sample_count = samples.len();
        self.payload.clear();
        for s in samples {
            put_u32(&mut self.payload, s.to_bits(), self.order);
        }
        self
    }

    pub fn float64(mut self, samples: &[f64]) -> Self {
        self.encoding = 5;
        self.sample_count = samples.len();
        self.payload.clear();
        for s in samples {
            match self.order {
                ByteOrder::Big => self.payload.put_f64(*s),
                ByteOrder::Little => self.payload.put_f64_le(*s),
            }
        }
        self
    }

    pub fn steim1(mut self, samples: &[i32]) -> Self {
        self.encoding = 10;
        self.sample_count = samples.len();
        self.payload = steim1_frames(samples, 1, self.order);
        self.frame_count = (self.payload.len() / FRAME_LEN) as u8;
        self
    }

    pub fn steim2(mut self, samples: &[i32]) -> Self {
        self.encoding = 11;
        self.sample_count = samples.len();
        self.payload = steim2_frames(samples, 1, self.order);
        self.frame_count = (self.payload.len() / FRAME_LEN) as u8;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let data_offset = if self.actual_rate.is_some() {
            WITH_RATE_BLOCKETTE
        } else {
            FIXED_HEADER_AND_BLOCKETTES
        };
        assert!(
            data_offset + self.payload.len() <= self.record_length,
            "payload does not fit the record"
        );

        let order = self.order;
        let mut out: Vec<u8> = Vec::with_capacity(self.record_length);
        out.put_slice(format!("{:06}", self.sequence % 1_000_000).as_bytes());
        out.put_u8(b'D');
        out.put_u8(b' ');
        out.put_slice(padded(&self.station, 5).as_bytes());
        out.put_slice(padded(&self.location, 2).as_bytes());
        out.put_slice(padded(&self.channel, 3).as_bytes());
        out.put_slice(padded(&self.network, 2).as_bytes());

        let nanos = self.start.nanosecond();
        put_u16(&mut out, self.start.year() as u16, order);
        put_u16(&mut out, self.start.ordinal() as u16, order);
        out.put_u8(self.start.hour() as u8);
        out.put_u8(self.start.minute() as u8);
        out.put_u8(self.start.second() as u8);
        out.put_u8(0);
        put_u16(&mut out, (nanos / 100_000) as u16, order);

        let (factor, multiplier) = rate_factor(self.sample_rate);
        put_u16(&mut out, self.declared_count.unwrap_or(self.sample_count) as u16, order);
        put_u16(&mut out, factor as u16, order);
        put_u16(&mut out, multiplier as u16, order);
        out.put_u8(0);
        out.put_u8(0);
        out.put_u8(0);
        out.put_u8(if self.actual_rate.is_some() { 3 } else { 2 });
        put_u32(&mut out, 0, order);
        put_u16(&mut out, data_offset as u16, order);
        put_u16(&mut out, 48, order);

        // Blockette 1000
        put_u16(&mut out, 1000, order);
        put_u16(&mut out, 56, order);
        out.put_u8(self.encoding);
        out.put_u8(if order == ByteOrder::Big { 1 } else { 0 });
        out.put_u8(self.record_length.trailing_zeros() as u8);
        out.put_u8(0);

        // Blockette 1001
        put_u16(&mut out, 1001, order);
        put_u16(&mut out, if self.actual_rate.is_some() { 64 } else { 0 }, order);
        out.put_u8(100);
        out.put_i8(((nanos / 1_000) % 100) as i8);
        out.put_u8(0);
        out.put_u8(self.frame_count);

        if let Some(rate) = self.actual_rate {
            put_u16(&mut out, 100, order);
            put_u16(&mut out, 0, order);
            put_u32(&mut out, rate.to_bits(), order);
            out.put_slice(&[0, 0, 0, 0]);
        }

        out.resize(data_offset, 0);
        out.put_slice(&self.payload);
        out.resize(self.record_length, 0);
        out
    }
}

pub fn steim1_frames(samples: &[i32], min_frames: usize, order: ByteOrder) -> Vec<u8> {
    let diffs = differences(samples);
    let mut words = Vec::new();
    let mut i = 0;
    while i < diffs.len() {
        let rest = &diffs[i..];
        if rest.len() >= 4 && rest[..4].iter().all(|d| fits(*d, 8)) {
            words.push((1, pack(&rest[..4], 8)));
            i += 4;
        } else if rest.len() >= 2 && rest[..2].iter().all(|d| fits(*d, 16)) {
            words.push((2, pack(&rest[..2], 16)));
            i += 2;
        } else {
            words.push((3, rest[0] as u32));
            i += 1;
        }
    }
    frames(samples, &words, min_frames, order)
}

pub fn steim2_frames(samples: &[i32], min_frames: usize, order: ByteOrder) -> Vec<u8> {
    // (bits, count, nibble, dnib)
    const LAYOUTS: [(u32, usize, u32, Option<u32>); 7] = [
        (4, 7, 3, Some(0b10)),
        (5, 6, 3, Some(0b01)),
        (6, 5, 3, Some(0b00)),
        (8, 4, 1, None),
        (10, 3, 2, Some(0b11)),
        (15, 2, 2, Some(0b10)),
        (30, 1, 2, Some(0b01)),
    ];

    let diffs = differences(samples);
    let mut words = Vec::new();
    let mut i = 0;
    while i < diffs.len() {
        let rest = &diffs[i..];
        let (bits, count, nibble, dnib) = LAYOUTS
            .iter()
            .copied()
            .find(|(bits, count, _, _)| {
                rest.len() >= *count && rest[..*count].iter().all(|d| fits(*d, *bits))
            })
            .expect("difference wider than 30 bits");
        let word = dnib.map(|d| d << 30).unwrap_or(0) | pack(&rest[..count], bits);
        words.push((nibble, word));
        i += count;
    }
    frames(samples, &words, min_frames, order)
}

fn frames(samples: &[i32], words: &[(u32, u32)], min_frames: usize, order: ByteOrder) -> Vec<u8> {
    let mut grid: Vec<[u32; 16]> = Vec::new();
    let mut frame = 0;
    let mut slot = 3;
    grid.push([0; 16]);
    for (nibble, word) in words {
        if slot == 16 {
            grid.push([0; 16]);
            frame += 1;
            slot = 1;
        }
        grid[frame][0] |= nibble << (30 - 2 * slot);
        grid[frame][slot] = *word;
        slot += 1;
    }
    while grid.len() < min_frames {
        grid.push([0; 16]);
    }
    grid[0][1] = samples.first().copied().unwrap_or(0) as u32;
    grid[0][2] = samples.last().copied().unwrap_or(0) as u32;

    let mut out = Vec::with_capacity(grid.len() * FRAME_LEN);
    for frame in &grid {
        for word in frame {
            put_u32(&mut out, *word, order);
        }
    }
    out
}

fn differences(samples: &[i32]) -> Vec<i32> {
    let mut previous = 0i32;
    samples
        .iter()
        .map(|s| {
            let diff = s.wrapping_sub(previous);
            previous = *s;
            diff
        })
        .collect()
}

fn fits(value: i32, bits: u32) -> bool {
    let limit = 1i64 << (bits - 1);
    (-limit..limit).contains(&i64::from(value))
}

fn pack(values: &[i32], bits: u32) -> u32 {
    let mask = if bits >= 32 { u32::MAX } else { (1u32 << bits) - 1 };
    values.iter().enumerate().fold(0u32, |word, (i, v)| {
        let shift = bits * (values.len() - 1 - i) as u32;
        word | ((*v as u32 & mask) << shift)
    })
}

fn padded(code: &str, width: usize) -> String {
    format!("{:<width$}", code, width = width)
}

fn rate_factor(rate: f64) -> (i16, i16) {
    if rate >= 1.0 && rate.fract() == 0.0 {
        (rate as i16, 1)
    } else if rate > 0.0 && rate < 1.0 {
        (-((1.0 / rate).round() as i16), 1)
    } else {
        ((rate * 100.0).round() as i16, -100)
    }
}

fn put_u16(out: &mut Vec<u8>, value: u16, order: ByteOrder) {
    match order {
        ByteOrder::Big => out.put_u16(value),
        ByteOrder::Little => out.put_u16_le(value),
    }
}

fn put_u32(out: &mut Vec<u8>, value: u32, order: ByteOrder) {
    match order {
        ByteOrder::Big => out.put_u32(value),
        ByteOrder::Little => out.put_u32_le(value),
    }
}
