// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The DateTime type, 100 nanosecond ticks since 1601-01-01 00:00:00 UTC.

use std::{
    fmt,
    io::{Read, Write},
    ops::{Add, Sub},
};

use chrono::{Duration, TimeZone, Timelike, Utc};

use crate::encoding::{
    read_i64, write_i64, BinaryDecodable, BinaryEncodable, DecodingOptions, EncodingResult,
};

const TICKS_PER_SECOND: i64 = 10_000_000;
const NANOS_PER_TICK: i64 = 100;

/// Maximum tick value on the wire, corresponding to the end of year 9999. Larger
/// values are clamped by servers and clients alike.
pub const MAX_TICKS: i64 = 2_650_467_743_990_000_000;

/// An OPC UA timestamp. Stored as a chrono UTC time, encoded as ticks.
#[derive(PartialEq, PartialOrd, Eq, Ord, Clone, Copy, Hash)]
pub struct DateTime {
    date_time: chrono::DateTime<Utc>,
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.date_time.to_rfc3339())
    }
}

impl fmt::Debug for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl Default for DateTime {
    fn default() -> Self {
        DateTime::null()
    }
}

impl BinaryEncodable for DateTime {
    fn byte_len(&self) -> usize {
        8
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        write_i64(stream, self.checked_ticks())
    }
}

impl BinaryDecodable for DateTime {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let ticks = read_i64(stream)?;
        Ok(DateTime::from_ticks(ticks) + options.client_offset)
    }
}

impl Add<Duration> for DateTime {
    type Output = DateTime;

    fn add(self, rhs: Duration) -> Self::Output {
        DateTime::from(self.date_time + rhs)
    }
}

impl Sub<Duration> for DateTime {
    type Output = DateTime;

    fn sub(self, rhs: Duration) -> Self::Output {
        DateTime::from(self.date_time - rhs)
    }
}

impl Sub<DateTime> for DateTime {
    type Output = Duration;

    fn sub(self, rhs: DateTime) -> Self::Output {
        self.date_time - rhs.date_time
    }
}

impl From<chrono::DateTime<Utc>> for DateTime {
    fn from(date_time: chrono::DateTime<Utc>) -> Self {
        // Truncate to tick accuracy so equality survives a round trip
        let nanos = (date_time.nanosecond() as i64 / NANOS_PER_TICK) * NANOS_PER_TICK;
        let date_time = date_time.with_nanosecond(nanos as u32).unwrap_or(date_time);
        DateTime { date_time }
    }
}

impl DateTime {
    /// The current time with tick accuracy.
    pub fn now() -> DateTime {
        DateTime::from(Utc::now())
    }

    /// The null time, i.e. the epoch 1601-01-01 00:00:00, encoded as 0 ticks.
    pub fn null() -> DateTime {
        DateTime {
            date_time: epoch(),
        }
    }

    /// Returns `true` for the null time.
    pub fn is_null(&self) -> bool {
        self.ticks() == 0
    }

    /// Construct from ticks since the OPC UA epoch. Out of range values clamp.
    pub fn from_ticks(ticks: i64) -> DateTime {
        let ticks = ticks.clamp(0, MAX_TICKS);
        let secs = ticks / TICKS_PER_SECOND;
        let nanos = (ticks % TICKS_PER_SECOND) * NANOS_PER_TICK;
        DateTime {
            date_time: epoch() + Duration::seconds(secs) + Duration::nanoseconds(nanos),
        }
    }

    /// Ticks since the OPC UA epoch. May be out of the encodable range for
    /// extreme chrono values; use [`Self::checked_ticks`] when encoding.
    pub fn ticks(&self) -> i64 {
        let delta = self.date_time - epoch();
        delta.num_seconds() * TICKS_PER_SECOND + delta.subsec_nanos() as i64 / NANOS_PER_TICK
    }

    /// Ticks clamped to the encodable range.
    pub fn checked_ticks(&self) -> i64 {
        self.ticks().clamp(0, MAX_TICKS)
    }

    /// The underlying chrono value.
    pub fn as_chrono(&self) -> chrono::DateTime<Utc> {
        self.date_time
    }
}

fn epoch() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(1601, 1, 1, 0, 0, 0).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn epoch_is_zero_ticks() {
        assert_eq!(DateTime::null().ticks(), 0);
        assert!(DateTime::null().is_null());
    }

    #[test]
    fn round_trip() {
        let now = DateTime::now();
        let mut stream = Cursor::new(now.encode_to_vec());
        let decoded = DateTime::decode(&mut stream, &DecodingOptions::default()).unwrap();
        assert_eq!(decoded, now);
    }

    #[test]
    fn ticks_round_trip() {
        let ticks = 131_573_161_320_000_000; // some time in 2017
        assert_eq!(DateTime::from_ticks(ticks).ticks(), ticks);
    }

    #[test]
    fn out_of_range_clamps() {
        assert_eq!(DateTime::from_ticks(-5).ticks(), 0);
        assert_eq!(DateTime::from_ticks(i64::MAX).ticks(), MAX_TICKS);
    }
}
