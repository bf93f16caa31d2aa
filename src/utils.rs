//! Utility functions for UTF-16 string and timestamp conversion.

use chrono::{DateTime, TimeZone, Utc};
use encoding_rs::UTF_16LE;

/// FILETIME ticks (100ns) between 1601-01-01 and 1970-01-01.
pub const EPOCH_AS_FILETIME: u64 = 116_444_736_000_000_000;

/// FILETIME ticks per second.
pub const FILETIME_TICKS_PER_SECOND: u64 = 10_000_000;

/// Decodes UTF-16LE bytes, replacing invalid sequences.
///
/// A trailing odd byte is ignored. Registry data is not guaranteed to be
/// well formed, so decoding never fails.
pub fn decode_utf16_lossy(data: &[u8]) -> String {
    let even = &data[..data.len() - data.len() % 2];
    let (decoded, _had_errors) = UTF_16LE.decode_without_bom_handling(even);
    decoded.into_owned()
}

/// Reads a null-terminated UTF-16LE string, stopping at the first null.
///
/// Data without a terminator is read to the end.
pub fn read_utf16_string(data: &[u8]) -> String {
    let decoded = decode_utf16_lossy(data);
    match decoded.find('\0') {
        Some(end) => decoded[..end].to_string(),
        None => decoded,
    }
}

/// Encodes a string as a null-terminated UTF-16 buffer for Win32 calls.
pub fn to_wide_null(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Encodes a string as null-terminated UTF-16LE bytes.
pub fn utf16_bytes_with_null(s: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity((s.len() + 1) * 2);
    for unit in s.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    bytes.extend_from_slice(&[0, 0]);
    bytes
}

/// Converts a Windows FILETIME to a UTC timestamp.
///
/// Times before the Unix epoch are clamped to it.
pub fn filetime_to_datetime(filetime: u64) -> DateTime<Utc> {
    let since_epoch = filetime.saturating_sub(EPOCH_AS_FILETIME);
    let secs = (since_epoch / FILETIME_TICKS_PER_SECOND) as i64;
    let nanos = ((since_epoch % FILETIME_TICKS_PER_SECOND) * 100) as u32;
    Utc.timestamp_opt(secs, nanos)
        .single()
        .unwrap_or_default()
}

/// Converts a UTC timestamp to a Windows FILETIME.
pub fn datetime_to_filetime(time: DateTime<Utc>) -> u64 {
    let secs = time.timestamp().max(0) as u64;
    let ticks = u64::from(time.timestamp_subsec_nanos()) / 100;
    EPOCH_AS_FILETIME + secs * FILETIME_TICKS_PER_SECOND + ticks
}
