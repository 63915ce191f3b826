// miniSEED 2.x fixed header and blockette parsing
use super::RecordError;
use bytes::Buf;
use chrono::{DateTime, Duration, NaiveDate, Utc};

pub const FIXED_HEADER_LEN: usize = 48;
pub const MIN_RECORD_LEN: usize = 1 << 7;
pub const MAX_RECORD_LEN: usize = 1 << 20;

const TIME_CORRECTION_APPLIED: u8 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Big,
    Little,
}

/// Reads fixed-width fields from a record in a given byte order.
#[derive(Clone, Copy)]
pub struct FieldReader<'a> {
    data: &'a [u8],
    order: ByteOrder,
}

impl<'a> FieldReader<'a> {
    pub fn new(data: &'a [u8], order: ByteOrder) -> Self {
        Self { data, order }
    }

    fn field<const N: usize>(&self, at: usize) -> Option<&'a [u8]> {
        self.data.get(at..at + N)
    }

    pub fn u8(&self, at: usize) -> Option<u8> {
        self.data.get(at).copied()
    }

    pub fn i8(&self, at: usize) -> Option<i8> {
        self.u8(at).map(|b| b as i8)
    }

    pub fn u16(&self, at: usize) -> Option<u16> {
        let mut bytes = self.field::<2>(at)?;
        Some(match self.order {
            ByteOrder::Big => bytes.get_u16(),
            ByteOrder::Little => bytes.get_u16_le(),
        })
    }

    pub fn i16(&self, at: usize) -> Option<i16> {
        self.u16(at).map(|v| v as i16)
    }

    pub fn u32(&self, at: usize) -> Option<u32> {
        let mut bytes = self.field::<4>(at)?;
        Some(match self.order {
            ByteOrder::Big => bytes.get_u32(),
            ByteOrder::Little => bytes.get_u32_le(),
        })
    }

    pub fn i32(&self, at: usize) -> Option<i32> {
        self.u32(at).map(|v| v as i32)
    }

    pub fn f32(&self, at: usize) -> Option<f32> {
        self.u32(at).map(f32::from_bits)
    }

    pub fn f64(&self, at: usize) -> Option<f64> {
        let mut bytes = self.field::<8>(at)?;
        Some(match self.order {
            ByteOrder::Big => bytes.get_f64(),
            ByteOrder::Little => bytes.get_f64_le(),
        })
    }
}

/// SEED BTIME: year, day of year, hour, minute, second, 0.0001 s ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BTime {
    pub year: u16,
    pub day: u16,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub ticks: u16,
}

impl BTime {
    fn read(reader: &FieldReader<'_>, at: usize) -> Option<Self> {
        Some(Self {
            year: reader.u16(at)?,
            day: reader.u16(at + 2)?,
            hour: reader.u8(at + 4)?,
            minute: reader.u8(at + 5)?,
            second: reader.u8(at + 6)?,
            ticks: reader.u16(at + 8)?,
        })
    }

    fn plausible_date(&self) -> bool {
        (1900..=2100).contains(&self.year) && (1..=366).contains(&self.day)
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        if self.hour > 23 || self.minute > 59 || self.second > 60 || self.ticks > 9999 {
            return None;
        }
        let date = NaiveDate::from_yo_opt(i32::from(self.year), u32::from(self.day))?;
        let midnight = date.and_hms_opt(0, 0, 0)?.and_utc();
        // Leap seconds (second == 60) roll into the next minute
        let seconds = i64::from(self.hour) * 3600 + i64::from(self.minute) * 60 + i64::from(self.second);
        Some(midnight + Duration::seconds(seconds) + Duration::microseconds(i64::from(self.ticks) * 100))
    }
}

#[derive(Debug, Clone)]
pub struct FixedHeader {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
    pub start: BTime,
    pub sample_count: u16,
    pub rate_factor: i16,
    pub rate_multiplier: i16,
    pub activity_flags: u8,
    pub blockette_count: u8,
    pub time_correction: i32,
    pub data_offset: u16,
    pub first_blockette: u16,
    pub byte_order: ByteOrder,
}

impl FixedHeader {
    pub fn parse(data: &[u8]) -> Result<Self, RecordError> {
        if data.len() < FIXED_HEADER_LEN {
            return Err(RecordError::MalformedHeader(format!(
                "{} bytes is shorter than the fixed header",
                data.len()
            )));
        }

        let sequence_ok = data[..6]
            .iter()
            .all(|b| b.is_ascii_digit() || *b == b' ' || *b == 0);
        if !sequence_ok {
            return Err(RecordError::MalformedHeader(
                "sequence number is not numeric".to_string(),
            ));
        }
        if !matches!(data[6], b'D' | b'R' | b'Q' | b'M') {
            return Err(RecordError::MalformedHeader(format!(
                "unknown quality indicator 0x{:02x}",
                data[6]
            )));
        }
        if !matches!(data[7], b' ' | 0) {
            return Err(RecordError::MalformedHeader(
                "reserved header byte is set".to_string(),
            ));
        }

        let byte_order = detect_byte_order(data).ok_or_else(|| {
            RecordError::MalformedHeader("start time is not a plausible BTIME".to_string())
        })?;
        let reader = FieldReader::new(data, byte_order);
        let truncated = || RecordError::MalformedHeader("fixed header ended early".to_string());

        let start = BTime::read(&reader, 20).ok_or_else(truncated)?;
        if start.to_datetime().is_none() {
            return Err(RecordError::MalformedHeader(format!(
                "invalid start time {:?}",
                start
            )));
        }

        Ok(Self {
            station: ascii_code(&data[8..13]),
            location: ascii_code(&data[13..15]),
            channel: ascii_code(&data[15..18]),
            network: ascii_code(&data[18..20]),
            start,
            sample_count: reader.u16(30).ok_or_else(truncated)?,
            rate_factor: reader.i16(32).ok_or_else(truncated)?,
            rate_multiplier: reader.i16(34).ok_or_else(truncated)?,
            activity_flags: reader.u8(36).ok_or_else(truncated)?,
            blockette_count: reader.u8(39).ok_or_else(truncated)?,
            time_correction: reader.i32(40).ok_or_else(truncated)?,
            data_offset: reader.u16(44).ok_or_else(truncated)?,
            first_blockette: reader.u16(46).ok_or_else(truncated)?,
            byte_order,
        })
    }

    pub fn channel_id(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.network, self.station, self.location, self.channel
        )
    }

    /// Nominal rate from the factor/multiplier pair.
    pub fn nominal_sample_rate(&self) -> f64 {
        let factor = f64::from(self.rate_factor);
        let multiplier = f64::from(self.rate_multiplier);

        let mut rate = 0.0;
        if self.rate_factor > 0 {
            rate = factor;
        } else if self.rate_factor < 0 {
            rate = -1.0 / factor;
        }
        if self.rate_multiplier > 0 {
            rate *= multiplier;
        } else if self.rate_multiplier < 0 {
            rate = -rate / multiplier;
        }
        rate
    }

    /// Start of the first sample including the header time correction.
    pub fn start_time(&self, microseconds: i8) -> Option<DateTime<Utc>> {
        let mut start = self.start.to_datetime()?;
        if self.activity_flags & TIME_CORRECTION_APPLIED == 0 {
            start += Duration::microseconds(i64::from(self.time_correction) * 100);
        }
        Some(start + Duration::microseconds(i64::from(microseconds)))
    }
}

/// Fields gathered from the blockette chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Blockettes {
    pub encoding: Option<u8>,
    pub word_order: Option<ByteOrder>,
    pub record_length: Option<usize>,
    pub microseconds: i8,
    pub actual_sample_rate: Option<f32>,
}

impl Blockettes {
    /// Walk the chain starting at `header.first_blockette`. `data` starts at the record.
    pub fn parse(data: &[u8], header: &FixedHeader) -> Result<Self, RecordError> {
        let reader = FieldReader::new(data, header.byte_order);
        let mut found = Blockettes::default();
        let mut offset = usize::from(header.first_blockette);
        let mut visited = 0u8;

        while offset != 0 && visited < header.blockette_count.max(1) {
            if offset < FIXED_HEADER_LEN {
                return Err(RecordError::MalformedHeader(format!(
                    "blockette offset {} points into the fixed header",
                    offset
                )));
            }
            let (Some(kind), Some(next)) = (reader.u16(offset), reader.u16(offset + 2)) else {
                return Err(RecordError::MalformedHeader(format!(
                    "blockette at {} runs past the buffer",
                    offset
                )));
            };

            match kind {
                1000 => {
                    found.encoding = reader.u8(offset + 4);
                    found.word_order = reader.u8(offset + 5).map(|order| {
                        if order == 0 {
                            ByteOrder::Little
                        } else {
                            ByteOrder::Big
                        }
                    });
                    if let Some(exponent) = reader.u8(offset + 6) {
                        let length = 1usize.checked_shl(u32::from(exponent)).unwrap_or(0);
                        if !(MIN_RECORD_LEN..=MAX_RECORD_LEN).contains(&length) {
                            return Err(RecordError::MalformedHeader(format!(
                                "record length exponent {} out of range",
                                exponent
                            )));
                        }
                        found.record_length = Some(length);
                    }
                }
                1001 => {
                    found.microseconds = reader.i8(offset + 5).unwrap_or(0);
                }
                100 => {
                    found.actual_sample_rate = reader.f32(offset + 4);
                }
                _ => {}
            }

            visited += 1;
            let next = usize::from(next);
            if next != 0 && next <= offset {
                return Err(RecordError::MalformedHeader(format!(
                    "blockette chain loops back from {} to {}",
                    offset, next
                )));
            }
            offset = next;
        }

        Ok(found)
    }
}

fn detect_byte_order(data: &[u8]) -> Option<ByteOrder> {
    [ByteOrder::Big, ByteOrder::Little].into_iter().find(|order| {
        BTime::read(&FieldReader::new(data, *order), 20)
            .map(|time| time.plausible_date())
            .unwrap_or(false)
    })
}

fn ascii_code(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_matches(|c: char| c == ' ' || c == '\0')
        .to_string()
}
