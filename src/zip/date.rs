//! MS-DOS date and time fields as stored in ZIP headers.
//!
//! `time = hour << 11 | minute << 5 | second / 2`
//! `date = (year - 1980) << 9 | month << 5 | day`

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, Timelike};
use std::time::SystemTime;

const EPOCH_YEAR: i32 = 1980;
const LAST_YEAR: i32 = EPOCH_YEAR + 0x7F;

/// A packed DOS timestamp with two-second resolution.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DosDateTime {
    pub date: u16,
    pub time: u16,
}

impl DosDateTime {
    /// 1980-01-01 00:00:00, the earliest representable moment.
    pub const MIN: DosDateTime = DosDateTime {
        date: (1 << 5) | 1,
        time: 0,
    };

    /// 2107-12-31 23:59:58, the latest representable moment.
    pub const MAX: DosDateTime = DosDateTime {
        date: (0x7F << 9) | (12 << 5) | 31,
        time: (23 << 11) | (59 << 5) | 29,
    };

    pub fn new(date: u16, time: u16) -> Self {
        Self { date, time }
    }

    /// Pack a calendar timestamp. Moments outside 1980..=2107 clamp to
    /// [`MIN`](Self::MIN) or [`MAX`](Self::MAX).
    pub fn from_datetime(dt: &NaiveDateTime) -> Self {
        if dt.year() < EPOCH_YEAR {
            return Self::MIN;
        }
        if dt.year() > LAST_YEAR {
            return Self::MAX;
        }

        let year = (dt.year() - EPOCH_YEAR) as u16;
        let date = (year << 9) | ((dt.month() as u16) << 5) | dt.day() as u16;
        let time =
            ((dt.hour() as u16) << 11) | ((dt.minute() as u16) << 5) | (dt.second() as u16 / 2);
        Self { date, time }
    }

    /// Unpack into a calendar timestamp, or `None` when the fields do not
    /// name a real date and time (e.g. month 0).
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year(), self.month(), self.day())?.and_hms_opt(
            self.hour(),
            self.minute(),
            self.second(),
        )
    }

    pub fn year(&self) -> i32 {
        i32::from(self.date >> 9) + EPOCH_YEAR
    }

    pub fn month(&self) -> u32 {
        u32::from((self.date >> 5) & 0x0F)
    }

    pub fn day(&self) -> u32 {
        u32::from(self.date & 0x1F)
    }

    pub fn hour(&self) -> u32 {
        u32::from(self.time >> 11)
    }

    pub fn minute(&self) -> u32 {
        u32::from((self.time >> 5) & 0x3F)
    }

    pub fn second(&self) -> u32 {
        u32::from(self.time & 0x1F) * 2
    }
}

impl From<SystemTime> for DosDateTime {
    /// Converts using the local timezone, as DOS timestamps carry none.
    fn from(value: SystemTime) -> Self {
        let local: DateTime<Local> = value.into();
        Self::from_datetime(&local.naive_local())
    }
}
