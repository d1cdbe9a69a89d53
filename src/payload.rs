/*!
 # Schedule payload encoding

 Flattens a [`Schedule`] into the JSON record the grow light firmware reads.
 The firmware looks fields up by key name, so the key set is fixed by
 [`PAYLOAD_FIELDS`] and shared by the encoder and [`decode`].
*/

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::schedule::{Channel, DaySelection, Schedule};
use crate::{Error, Result};

/// Every key of the wire payload, in serialization order
pub const PAYLOAD_FIELDS: [&str; 16] = [
    Channel::RedLight.start_key(),
    Channel::RedLight.end_key(),
    Channel::RedLight.intensity_key(),
    Channel::Sunlight.start_key(),
    Channel::Sunlight.end_key(),
    Channel::Sunlight.intensity_key(),
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
    "timeNow",
    "daylightSavingsTime",
    "timeZoneOffsetHrs",
];

/// Clock reading taken when a payload is built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSnapshot {
    /// Unix epoch seconds
    pub time_now: i64,
    /// UTC minus local time in minutes (positive west of Greenwich)
    pub offset_minutes: i32,
}

impl ClockSnapshot {
    /// Reads the system clock and the local UTC offset
    pub fn now() -> Self {
        let now = Local::now();
        Self {
            time_now: now.timestamp(),
            offset_minutes: -now.offset().local_minus_utc() / 60,
        }
    }

    /// 1 when the local offset is ahead of UTC, else 0
    pub fn daylight_savings_time(&self) -> u8 {
        u8::from(self.offset_minutes < 0)
    }

    /// Offset from UTC in whole hours, truncated toward zero
    pub fn time_zone_offset_hrs(&self) -> i32 {
        -self.offset_minutes / 60
    }
}

/// Wire form of a schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulePayload {
    #[serde(rename = "redLightStart")]
    pub red_light_start: Option<String>,
    #[serde(rename = "redLightEnd")]
    pub red_light_end: Option<String>,
    #[serde(rename = "redLightIntensity")]
    pub red_light_intensity: u8,
    #[serde(rename = "sunlightStart")]
    pub sunlight_start: Option<String>,
    #[serde(rename = "sunlightEnd")]
    pub sunlight_end: Option<String>,
    #[serde(rename = "sunLightIntensity")]
    pub sun_light_intensity: u8,
    #[serde(rename = "Monday")]
    pub monday: bool,
    #[serde(rename = "Tuesday")]
    pub tuesday: bool,
    #[serde(rename = "Wednesday")]
    pub wednesday: bool,
    #[serde(rename = "Thursday")]
    pub thursday: bool,
    #[serde(rename = "Friday")]
    pub friday: bool,
    #[serde(rename = "Saturday")]
    pub saturday: bool,
    #[serde(rename = "Sunday")]
    pub sunday: bool,
    #[serde(rename = "timeNow")]
    pub time_now: i64,
    #[serde(rename = "daylightSavingsTime")]
    pub daylight_savings_time: u8,
    #[serde(rename = "timeZoneOffsetHrs")]
    pub time_zone_offset_hrs: i32,
}

impl SchedulePayload {
    /// Flattens a schedule and clock reading. Partial schedules pass through unchecked.
    pub fn new(schedule: &Schedule, clock: ClockSnapshot) -> Self {
        let time = |t: Option<crate::TimeOfDay>| t.map(|t| t.to_string());
        let day = |d| schedule.days.contains(d);
        use chrono::Weekday::*;

        Self {
            red_light_start: time(schedule.red_light.start),
            red_light_end: time(schedule.red_light.end),
            red_light_intensity: schedule.red_light.intensity.value(),
            sunlight_start: time(schedule.sunlight.start),
            sunlight_end: time(schedule.sunlight.end),
            sun_light_intensity: schedule.sunlight.intensity.value(),
            monday: day(Mon),
            tuesday: day(Tue),
            wednesday: day(Wed),
            thursday: day(Thu),
            friday: day(Fri),
            saturday: day(Sat),
            sunday: day(Sun),
            time_now: clock.time_now,
            daylight_savings_time: clock.daylight_savings_time(),
            time_zone_offset_hrs: clock.time_zone_offset_hrs(),
        }
    }

    /// Selected weekdays as a [`DaySelection`]
    pub fn days(&self) -> DaySelection {
        use chrono::Weekday::*;

        let mut days = DaySelection::default();
        for (day, enabled) in [
            (Mon, self.monday),
            (Tue, self.tuesday),
            (Wed, self.wednesday),
            (Thu, self.thursday),
            (Fri, self.friday),
            (Sat, self.saturday),
            (Sun, self.sunday),
        ] {
            days.set(day, enabled);
        }
        days
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Encodes a schedule with a fresh clock reading
#[instrument(skip(schedule))]
pub fn encode(schedule: &Schedule) -> Result<String> {
    let payload = SchedulePayload::new(schedule, ClockSnapshot::now()).to_json()?;
    debug!("Payload: {}", payload);
    Ok(payload)
}

/// Decodes a payload, requiring exactly the keys in [`PAYLOAD_FIELDS`]
pub fn decode(payload: &str) -> Result<SchedulePayload> {
    let map: Map<String, Value> = serde_json::from_str(payload)?;

    if let Some(missing) = PAYLOAD_FIELDS.iter().find(|k| !map.contains_key(**k)) {
        return Err(Error::Schema(format!("missing key {missing}")));
    }
    if let Some(extra) = map.keys().find(|k| !PAYLOAD_FIELDS.contains(&k.as_str())) {
        return Err(Error::Schema(format!("unexpected key {extra}")));
    }

    Ok(serde_json::from_value(Value::Object(map))?)
}

/// Base64 of the UTF-8 payload, as written on the native path
pub fn to_base64(payload: &str) -> String {
    STANDARD.encode(payload.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{Intensity, TimeOfDay};
    use chrono::Weekday;

    const CLOCK: ClockSnapshot = ClockSnapshot {
        time_now: 1_700_000_000,
        offset_minutes: 0,
    };

    const WEEK_MASK: u8 = 0x7f;

    #[test]
    fn encodes_every_intensity_exactly() {
        for level in 0..=100u8 {
            let schedule = Schedule::seeded(Intensity::new(level).unwrap(), Intensity::MIN);
            let payload = SchedulePayload::new(&schedule, CLOCK);
            assert_eq!(payload.red_light_intensity, level);
            assert_eq!(payload.sun_light_intensity, 0);
        }
    }

    #[test]
    fn seven_weekday_keys_for_every_selection() {
        for bits in 0..=WEEK_MASK {
            let mut schedule = Schedule::default();
            schedule.days = DaySelection::from_bits(bits);
            let json = SchedulePayload::new(&schedule, CLOCK).to_json().unwrap();
            let value: Value = serde_json::from_str(&json).unwrap();

            for (day, enabled) in schedule.days.iter() {
                assert_eq!(value[DaySelection::day_name(day)], Value::Bool(enabled));
            }
            assert_eq!(decode(&json).unwrap().days().bits(), bits);
        }
    }

    #[test]
    fn timezone_fields_follow_offset_minutes() {
        let cases = [(0, 0, 0), (-60, 1, 1), (300, 0, -5), (-330, 1, 5), (-345, 1, 5)];
        for (offset_minutes, dst, hours) in cases {
            let clock = ClockSnapshot {
                time_now: 0,
                offset_minutes,
            };
            assert_eq!(clock.daylight_savings_time(), dst, "offset {offset_minutes}");
            assert_eq!(clock.time_zone_offset_hrs(), hours, "offset {offset_minutes}");
        }
    }

    #[test]
    fn now_uses_utc_minus_local_convention() {
        let local_minus_utc = Local::now().offset().local_minus_utc();
        let clock = ClockSnapshot::now();

        assert_eq!(clock.offset_minutes, -local_minus_utc / 60);
        assert_eq!(clock.time_zone_offset_hrs(), local_minus_utc / 3600);
        assert_eq!(clock.daylight_savings_time(), u8::from(local_minus_utc > 0));
        assert!((clock.time_now - chrono::Utc::now().timestamp()).abs() <= 1);
    }

    #[test]
    fn serializes_keys_in_schema_order() {
        let json = SchedulePayload::new(&Schedule::default(), CLOCK)
            .to_json()
            .unwrap();
        let positions: Vec<usize> = PAYLOAD_FIELDS
            .iter()
            .map(|key| json.find(&format!("\"{key}\":")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{json}");
    }

    #[test]
    fn red_forty_monday_wednesday_scenario() {
        let mut schedule = Schedule::seeded(Intensity::saturating(40), Intensity::MIN);
        schedule.days.set(Weekday::Mon, true);
        schedule.days.set(Weekday::Wed, true);

        let json = encode(&schedule).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["redLightIntensity"], 40);
        assert_eq!(value["sunLightIntensity"], 0);
        assert_eq!(value["Monday"], true);
        assert_eq!(value["Wednesday"], true);
        for day in ["Tuesday", "Thursday", "Friday", "Saturday", "Sunday"] {
            assert_eq!(value[day], false, "{day}");
        }
        for key in ["redLightStart", "redLightEnd", "sunlightStart", "sunlightEnd"] {
            assert!(value[key].is_null(), "{key}");
        }
        assert!(value["timeNow"].as_i64().unwrap() > 0);
        assert!(value["daylightSavingsTime"].is_u64());
        assert!(value["timeZoneOffsetHrs"].is_i64());
    }

    #[test]
    fn partial_schedule_is_not_rejected() {
        let mut schedule = Schedule::default();
        schedule.sunlight.start = Some(TimeOfDay::from_hm(6, 30).unwrap());

        let payload = decode(&encode(&schedule).unwrap()).unwrap();
        assert_eq!(payload.sunlight_start.as_deref(), Some("06:30"));
        assert_eq!(payload.sunlight_end, None);
    }

    #[test]
    fn decode_rejects_missing_and_extra_keys() {
        let json = SchedulePayload::new(&Schedule::default(), CLOCK)
            .to_json()
            .unwrap();

        let mut value: Value = serde_json::from_str(&json).unwrap();
        value.as_object_mut().unwrap().remove("timeNow");
        assert!(matches!(decode(&value.to_string()), Err(Error::Schema(m)) if m.contains("timeNow")));

        let mut value: Value = serde_json::from_str(&json).unwrap();
        value["colour"] = Value::from("red");
        assert!(matches!(decode(&value.to_string()), Err(Error::Schema(m)) if m.contains("colour")));
    }

    #[test]
    fn base64_wraps_utf8_bytes() {
        assert_eq!(to_base64("{\"a\":1}"), "eyJhIjoxfQ==");
    }
}
