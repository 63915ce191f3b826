// miniSEED 2.x record decoder
pub mod header;
pub mod steim;

#[cfg(test)]
pub mod fixtures;

use crate::domain::waveform::{Encoding, RawRecord};
use bytes::Bytes;
use header::{Blockettes, ByteOrder, FieldReader, FixedHeader, FIXED_HEADER_LEN, MIN_RECORD_LEN};
use steim::{decode_steim, SteimLevel};
use thiserror::Error;

/// Why a single record was skipped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("malformed header: {0}")]
    MalformedHeader(String),
    #[error("unsupported encoding {0}")]
    UnsupportedEncoding(u8),
    #[error("truncated payload: {declared} samples declared, {available} present")]
    TruncatedPayload { declared: usize, available: usize },
    #[error("corrupt payload: {0}")]
    CorruptPayload(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordRejection {
    pub offset: usize,
    pub error: RecordError,
}

#[derive(Debug, Default)]
pub struct DecodeReport {
    pub records: Vec<RawRecord>,
    pub rejected: Vec<RecordRejection>,
}

impl DecodeReport {
    /// Every record in the buffer was rejected.
    pub fn is_undecodable(&self) -> bool {
        self.records.is_empty() && !self.rejected.is_empty()
    }
}

struct Rejected {
    error: RecordError,
    /// Bytes to skip; `None` when the record length itself is unknown.
    skip: Option<usize>,
}

impl Rejected {
    fn resync(error: RecordError) -> Self {
        Self { error, skip: None }
    }
}

/// Decode every record in `buffer`, skipping the ones that cannot be read.
pub fn decode_records(buffer: &Bytes) -> DecodeReport {
    let mut report = DecodeReport::default();
    let mut offset = 0;
    let mut resyncing = false;

    while offset + FIXED_HEADER_LEN <= buffer.len() {
        match decode_record(buffer, offset) {
            Ok((record, length)) => {
                resyncing = false;
                report.records.push(record);
                offset += length;
            }
            Err(rejected) => {
                // A run of unreadable headers counts as one rejection
                if !(resyncing && rejected.skip.is_none()) {
                    tracing::warn!("Skipping record at byte {}: {}", offset, rejected.error);
                    report.rejected.push(RecordRejection {
                        offset,
                        error: rejected.error,
                    });
                }
                resyncing = rejected.skip.is_none();
                offset += rejected.skip.unwrap_or(MIN_RECORD_LEN);
            }
        }
    }

    if offset < buffer.len() {
        tracing::debug!("Ignoring {} trailing bytes", buffer.len() - offset);
    }

    tracing::debug!(
        "Decoded {} records, rejected {} from {} bytes",
        report.records.len(),
        report.rejected.len(),
        buffer.len()
    );
    report
}

fn decode_record(buffer: &Bytes, offset: usize) -> Result<(RawRecord, usize), Rejected> {
    let available = &buffer[offset..];
    let header = FixedHeader::parse(available).map_err(Rejected::resync)?;
    let blockettes = Blockettes::parse(available, &header).map_err(Rejected::resync)?;

    let length = blockettes.record_length.ok_or_else(|| {
        Rejected::resync(RecordError::MalformedHeader(
            "missing blockette 1000".to_string(),
        ))
    })?;
    let sample_count = usize::from(header.sample_count);

    if length > available.len() {
        return Err(Rejected {
            error: RecordError::TruncatedPayload {
                declared: sample_count,
                available: 0,
            },
            skip: Some(available.len()),
        });
    }
    let skip = |error: RecordError| Rejected {
        error,
        skip: Some(length),
    };

    let tag = blockettes.encoding.unwrap_or(0);
    let encoding = Encoding::from_tag(tag).ok_or_else(|| skip(RecordError::UnsupportedEncoding(tag)))?;

    let sample_rate = blockettes
        .actual_sample_rate
        .map(f64::from)
        .filter(|rate| *rate > 0.0)
        .unwrap_or_else(|| header.nominal_sample_rate());
    if sample_count > 0 && !(sample_rate.is_finite() && sample_rate > 0.0) {
        return Err(skip(RecordError::MalformedHeader(format!(
            "sample rate {} for {} samples",
            sample_rate, sample_count
        ))));
    }

    let data_offset = usize::from(header.data_offset);
    if sample_count > 0 && (data_offset < FIXED_HEADER_LEN || data_offset >= length) {
        return Err(skip(RecordError::MalformedHeader(format!(
            "data offset {} outside record of {} bytes",
            data_offset, length
        ))));
    }

    let start_time = header
        .start_time(blockettes.microseconds)
        .ok_or_else(|| skip(RecordError::MalformedHeader("invalid start time".to_string())))?;

    let record = buffer.slice(offset..offset + length);
    let payload = if sample_count > 0 {
        record.slice(data_offset..)
    } else {
        Bytes::new()
    };
    let word_order = blockettes.word_order.unwrap_or(header.byte_order);
    let samples = decode_samples(&payload, sample_count, encoding, word_order).map_err(skip)?;

    Ok((
        RawRecord {
            channel_id: header.channel_id(),
            start_time,
            sample_rate,
            sample_count,
            encoding,
            payload,
            samples,
        },
        length,
    ))
}

/// Decode `count` samples of `encoding` from a record payload.
pub fn decode_samples(
    payload: &[u8],
    count: usize,
    encoding: Encoding,
    order: ByteOrder,
) -> Result<Vec<f64>, RecordError> {
    let reader = FieldReader::new(payload, order);
    let fixed = |width: usize| -> Result<(), RecordError> {
        if count * width > payload.len() {
            Err(RecordError::TruncatedPayload {
                declared: count,
                available: payload.len() / width,
            })
        } else {
            Ok(())
        }
    };

    let samples = match encoding {
        Encoding::Int16 => {
            fixed(2)?;
            (0..count)
                .filter_map(|i| reader.i16(i * 2))
                .map(f64::from)
                .collect()
        }
        Encoding::Int32 => {
            fixed(4)?;
            (0..count)
                .filter_map(|i| reader.i32(i * 4))
                .map(f64::from)
                .collect()
        }
        Encoding::Float32 => {
            fixed(4)?;
            (0..count)
                .filter_map(|i| reader.f32(i * 4))
                .map(f64::from)
                .collect()
        }
        Encoding::Float64 => {
            fixed(8)?;
            (0..count).filter_map(|i| reader.f64(i * 8)).collect()
        }
        Encoding::Steim1 => decode_steim(payload, count, order, SteimLevel::One)?
            .into_iter()
            .map(f64::from)
            .collect(),
        Encoding::Steim2 => decode_steim(payload, count, order, SteimLevel::Two)?
            .into_iter()
            .map(f64::from)
            .collect(),
    };

    Ok(samples)
}
