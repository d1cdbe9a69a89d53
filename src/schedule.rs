/*!
 # Schedule model for grow lights

 This module holds the per-channel start/end times and intensities and the
 set of weekdays a schedule applies to.
*/

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveTime, Weekday};
use tracing::{debug, trace};

use crate::{Error, Result};

/// Lighting channels of the grow light
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Red light channel
    RedLight,
    /// Sunlight (full spectrum) channel
    Sunlight,
}

impl Channel {
    /// All channels in wire order
    pub const ALL: [Channel; 2] = [Channel::RedLight, Channel::Sunlight];

    /// Payload key for the start time
    pub const fn start_key(self) -> &'static str {
        match self {
            Channel::RedLight => "redLightStart",
            Channel::Sunlight => "sunlightStart",
        }
    }

    /// Payload key for the end time
    pub const fn end_key(self) -> &'static str {
        match self {
            Channel::RedLight => "redLightEnd",
            Channel::Sunlight => "sunlightEnd",
        }
    }

    /// Payload key for the intensity.
    ///
    /// The firmware reads `sunLightIntensity` with a capital `L`.
    pub const fn intensity_key(self) -> &'static str {
        match self {
            Channel::RedLight => "redLightIntensity",
            Channel::Sunlight => "sunLightIntensity",
        }
    }
}

/// Light intensity in percent (0-100)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Intensity(u8);

impl Intensity {
    pub const MIN: Intensity = Intensity(0);
    pub const MAX: Intensity = Intensity(100);

    /// Creates an intensity, rejecting values above 100
    pub fn new(value: u8) -> Result<Self> {
        if value > Self::MAX.0 {
            return Err(Error::ValueOutOfRange(value as u32, 0, 100));
        }
        Ok(Self(value))
    }

    /// Creates an intensity, limiting the value to 0-100 the way a slider does
    pub fn saturating(value: i64) -> Self {
        Self(value.clamp(0, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Intensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Wall-clock time of day with minute resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    /// Creates a time of day from hour (0-23) and minute (0-59)
    pub fn from_hm(hour: u8, minute: u8) -> Result<Self> {
        NaiveTime::from_hms_opt(hour as u32, minute as u32, 0)
            .map(Self)
            .ok_or_else(|| Error::InvalidTime(format!("{hour}:{minute}")))
    }
}

impl FromStr for TimeOfDay {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        NaiveTime::parse_from_str(s.trim(), "%H:%M")
            .map(Self)
            .map_err(|_| Error::InvalidTime(s.to_string()))
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

/// Start time, end time and intensity of a single channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleEntry {
    /// Time the channel switches on, unset when `None`
    pub start: Option<TimeOfDay>,
    /// Time the channel switches off, unset when `None`
    pub end: Option<TimeOfDay>,
    /// Intensity while the channel is on
    pub intensity: Intensity,
}

impl ScheduleEntry {
    pub fn with_intensity(intensity: Intensity) -> Self {
        Self {
            intensity,
            ..Self::default()
        }
    }
}

/// Represents days of the week for scheduling
#[derive(Debug, Clone, Copy)]
pub struct Days {
    /// Monday (0x01)
    pub monday: u8,
    /// Tuesday (0x02)
    pub tuesday: u8,
    /// Wednesday (0x04)
    pub wednesday: u8,
    /// Thursday (0x08)
    pub thursday: u8,
    /// Friday (0x10)
    pub friday: u8,
    /// Saturday (0x20)
    pub saturday: u8,
    /// Sunday (0x40)
    pub sunday: u8,
    /// All days (0x7F)
    pub all: u8,
    /// Week days (Monday-Friday, 0x1F)
    pub week_days: u8,
    /// Weekend days (Saturday-Sunday, 0x60)
    pub weekend_days: u8,
    /// No days (0x00)
    pub none: u8,
}

/// Predefined day masks
pub const WEEK_DAYS: Days = Days {
    monday: 0x01,
    tuesday: 0x02,
    wednesday: 0x04,
    thursday: 0x08,
    friday: 0x10,
    saturday: 0x20,
    sunday: 0x40,
    all: 0x01 + 0x02 + 0x04 + 0x08 + 0x10 + 0x20 + 0x40,
    week_days: 0x01 + 0x02 + 0x04 + 0x08 + 0x10,
    weekend_days: 0x20 + 0x40,
    none: 0x00,
};

const ORDERED_DAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Set of weekdays a schedule is assigned to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DaySelection(u8);

impl DaySelection {
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & WEEK_DAYS.all)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    fn mask(day: Weekday) -> u8 {
        match day {
            Weekday::Mon => WEEK_DAYS.monday,
            Weekday::Tue => WEEK_DAYS.tuesday,
            Weekday::Wed => WEEK_DAYS.wednesday,
            Weekday::Thu => WEEK_DAYS.thursday,
            Weekday::Fri => WEEK_DAYS.friday,
            Weekday::Sat => WEEK_DAYS.saturday,
            Weekday::Sun => WEEK_DAYS.sunday,
        }
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & Self::mask(day) != 0
    }

    pub fn set(&mut self, day: Weekday, enabled: bool) {
        if enabled {
            self.0 |= Self::mask(day);
        } else {
            self.0 &= !Self::mask(day);
        }
    }

    /// Flips a single day, like tapping its switch
    pub fn toggle(&mut self, day: Weekday) {
        self.0 ^= Self::mask(day);
    }

    /// All seven weekdays with their enabled flag, Monday first
    pub fn iter(self) -> impl Iterator<Item = (Weekday, bool)> {
        ORDERED_DAYS.into_iter().map(move |day| (day, self.contains(day)))
    }

    /// English name used as the payload key
    pub const fn day_name(day: Weekday) -> &'static str {
        match day {
            Weekday::Mon => "Monday",
            Weekday::Tue => "Tuesday",
            Weekday::Wed => "Wednesday",
            Weekday::Thu => "Thursday",
            Weekday::Fri => "Friday",
            Weekday::Sat => "Saturday",
            Weekday::Sun => "Sunday",
        }
    }

    fn parse_single(day: &str) -> Option<u8> {
        let bits = match day.trim().to_lowercase().as_str() {
            "mon" | "monday" => WEEK_DAYS.monday,
            "tue" | "tuesday" => WEEK_DAYS.tuesday,
            "wed" | "wednesday" => WEEK_DAYS.wednesday,
            "thu" | "thursday" => WEEK_DAYS.thursday,
            "fri" | "friday" => WEEK_DAYS.friday,
            "sat" | "saturday" => WEEK_DAYS.saturday,
            "sun" | "sunday" => WEEK_DAYS.sunday,
            "all" => WEEK_DAYS.all,
            "weekdays" => WEEK_DAYS.week_days,
            "weekend" => WEEK_DAYS.weekend_days,
            "none" | "" => WEEK_DAYS.none,
            _ => return None,
        };
        Some(bits)
    }
}

impl FromStr for DaySelection {
    type Err = Error;

    /// Parses `mon`, `monday`, `weekdays`, `weekend`, `all`, `none`
    /// or a comma separated combination of them
    fn from_str(days: &str) -> Result<Self> {
        debug!("Parsing days string: {}", days);
        let mut combined = 0;
        for day in days.split(',') {
            let day_value =
                Self::parse_single(day).ok_or_else(|| Error::InvalidDays(day.to_string()))?;
            trace!("  Day '{}' = {:#04x}", day, day_value);
            combined |= day_value;
        }
        Ok(Self(combined))
    }
}

/// Complete schedule for both channels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Schedule {
    pub red_light: ScheduleEntry,
    pub sunlight: ScheduleEntry,
    pub days: DaySelection,
}

impl Schedule {
    /// Fresh schedule carrying over the live intensities; times and days start unset
    pub fn seeded(red_light: Intensity, sunlight: Intensity) -> Self {
        Self {
            red_light: ScheduleEntry::with_intensity(red_light),
            sunlight: ScheduleEntry::with_intensity(sunlight),
            days: DaySelection::default(),
        }
    }

    pub fn entry(&self, channel: Channel) -> &ScheduleEntry {
        match channel {
            Channel::RedLight => &self.red_light,
            Channel::Sunlight => &self.sunlight,
        }
    }

    pub fn entry_mut(&mut self, channel: Channel) -> &mut ScheduleEntry {
        match channel {
            Channel::RedLight => &mut self.red_light,
            Channel::Sunlight => &mut self.sunlight,
        }
    }
}
