/*!
 # Weekly schedules

 The unit stores its heating and hot water tank programs as a compact string:
 a fixed `$NULL|1|` header followed by 42 `;`-separated slots, six per weekday
 starting on Monday. A slot is either `HHMM,VALUE` or the empty slot `,`.

 ```text
 $NULL|1|0000,180;0450,200;2300,180;,;,;,;0000,180;...
         '------------- Mo ---------------''--- Tu ...
 ```

 [`decode`] and [`encode`] convert between that string and a [`WeekSchedule`].
 The value domain is chosen by the caller: heating programs carry
 temperatures in tenths of a degree, tank programs carry a [`TankState`] code.
*/

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, trace};

use crate::{Error, Result};

/// Header in front of every schedule string
pub const WIRE_PREFIX: &str = "$NULL|1|";
/// Slots the unit keeps for each day
pub const SLOTS_PER_DAY: usize = 6;
/// Slots in a complete schedule string
pub const WIRE_SLOTS: usize = SLOTS_PER_DAY * 7;

const EMPTY_SLOT: &str = ",";

/// Days of the week, in the order the unit lays them out
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Weekday {
    Mo,
    Tu,
    We,
    Th,
    Fr,
    Sa,
    Su,
}

impl Weekday {
    /// All days, Monday first
    pub const ALL: [Weekday; 7] = [
        Weekday::Mo,
        Weekday::Tu,
        Weekday::We,
        Weekday::Th,
        Weekday::Fr,
        Weekday::Sa,
        Weekday::Su,
    ];

    /// Position of the day in the week, Monday being 0
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Weekday::Mo => "Mo",
            Weekday::Tu => "Tu",
            Weekday::We => "We",
            Weekday::Th => "Th",
            Weekday::Fr => "Fr",
            Weekday::Sa => "Sa",
            Weekday::Su => "Su",
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Weekday {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Weekday::ALL
            .into_iter()
            .find(|day| day.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::Format(format!("unknown weekday {s:?}")))
    }
}

impl<'de> Deserialize<'de> for Weekday {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        // Same rules as `FromStr`, case-insensitive
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Operating mode of the hot water tank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TankState {
    Off,
    Comfort,
    Eco,
}

impl TankState {
    /// Parses the raw code found in tank schedules (`2` off, `1` comfort, `0` eco)
    pub fn from_code(raw: &str) -> Result<Self> {
        match raw {
            "2" => Ok(TankState::Off),
            "1" => Ok(TankState::Comfort),
            "0" => Ok(TankState::Eco),
            other => Err(Error::UnknownCode(other.to_string())),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            TankState::Off => 2,
            TankState::Comfort => 1,
            TankState::Eco => 0,
        }
    }
}

impl fmt::Display for TankState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TankState::Off => write!(f, "off"),
            TankState::Comfort => write!(f, "comfort"),
            TankState::Eco => write!(f, "eco"),
        }
    }
}

/// Parses a heating slot value, given in tenths of a degree, into °C
pub fn parse_temperature(raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .map(|tenths| tenths / 10.0)
        .map_err(|_| Error::InvalidValue(raw.to_string()))
}

/// A value that can be written into a schedule slot
pub trait WireValue {
    /// Integer written after the time in a slot
    fn to_wire(&self) -> Result<i64>;
}

impl WireValue for f64 {
    fn to_wire(&self) -> Result<i64> {
        let tenths = self * 10.0;
        // `as` saturates, NaN would go out as 0
        if !tenths.is_finite() || tenths.abs() >= i64::MAX as f64 {
            return Err(Error::InvalidValue(self.to_string()));
        }
        // Truncates toward zero (20.19 -> 201) instead of rounding. Kept for
        // wire compatibility, probably an upstream bug.
        Ok(tenths as i64)
    }
}

impl WireValue for TankState {
    fn to_wire(&self) -> Result<i64> {
        Ok(self.code() as i64)
    }
}

/// A time of day as the unit writes it, `HHMM`. Kept verbatim.
pub type TimeOfDay = String;

/// Entries of a single day, ordered by time
pub type DaySlots<V> = BTreeMap<TimeOfDay, V>;

/// One week of schedule entries, every day present
#[derive(Debug, Clone, PartialEq)]
pub struct WeekSchedule<V> {
    days: [DaySlots<V>; 7],
}

/// Heating program, values in °C
pub type HeatingSchedule = WeekSchedule<f64>;
/// Hot water tank program
pub type TankSchedule = WeekSchedule<TankState>;

impl<V> WeekSchedule<V> {
    /// Creates a week with no entries
    pub fn new() -> Self {
        Self {
            days: std::array::from_fn(|_| DaySlots::new()),
        }
    }

    pub fn day(&self, day: Weekday) -> &DaySlots<V> {
        &self.days[day.index()]
    }

    pub fn day_mut(&mut self, day: Weekday) -> &mut DaySlots<V> {
        &mut self.days[day.index()]
    }

    /// Sets the value starting at `time` on `day`, returning the value it replaced
    pub fn insert(&mut self, day: Weekday, time: impl Into<TimeOfDay>, value: V) -> Option<V> {
        self.day_mut(day).insert(time.into(), value)
    }

    /// Iterates over all seven days, Monday first
    pub fn iter(&self) -> impl Iterator<Item = (Weekday, &DaySlots<V>)> {
        Weekday::ALL.into_iter().zip(self.days.iter())
    }

    /// Whether no day has any entry
    pub fn is_empty(&self) -> bool {
        self.days.iter().all(BTreeMap::is_empty)
    }
}

impl<V> Default for WeekSchedule<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> FromIterator<(Weekday, DaySlots<V>)> for WeekSchedule<V> {
    fn from_iter<I: IntoIterator<Item = (Weekday, DaySlots<V>)>>(iter: I) -> Self {
        let mut schedule = Self::new();
        for (day, slots) in iter {
            *schedule.day_mut(day) = slots;
        }
        schedule
    }
}

impl<V: Serialize> Serialize for WeekSchedule<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.days.len()))?;
        for (day, slots) in self.iter() {
            map.serialize_entry(&day, slots)?;
        }
        map.end()
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for WeekSchedule<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        // Missing days are empty
        let days = BTreeMap::<Weekday, DaySlots<V>>::deserialize(deserializer)?;
        Ok(days.into_iter().collect())
    }
}

/// Decodes a schedule string, using `value_parser` to convert each raw slot value.
///
/// Slots without a time, and slots with a time but no value, are skipped. When a
/// time shows up twice on the same day the later slot wins.
///
/// # Errors
///
/// [`Error::Format`] if the string has fewer than three `|` segments, fewer than
/// 42 slots, or a slot that is not `time,value`. Errors from `value_parser` are
/// passed through.
pub fn decode<V, F>(wire: &str, value_parser: F) -> Result<WeekSchedule<V>>
where
    F: Fn(&str) -> Result<V>,
{
    let segment = wire
        .split('|')
        .nth(2)
        .ok_or_else(|| Error::Format(format!("expected 3 '|' separated segments in {wire:?}")))?;

    let slots: Vec<&str> = segment.split(';').collect();
    if slots.len() < WIRE_SLOTS {
        return Err(Error::Format(format!(
            "expected {WIRE_SLOTS} slots, found {}",
            slots.len()
        )));
    }
    if slots.len() > WIRE_SLOTS {
        debug!("Ignoring {} trailing slots", slots.len() - WIRE_SLOTS);
    }

    let mut schedule = WeekSchedule::new();
    for (index, slot) in slots.iter().take(WIRE_SLOTS).enumerate() {
        let day = Weekday::ALL[index / SLOTS_PER_DAY];
        let (time, raw) = split_slot(slot)?;
        if time.is_empty() {
            continue;
        }
        if raw.is_empty() {
            // The unit sometimes declares a time without a value
            trace!("Skipping slot {} on {} without a value", time, day);
            continue;
        }

        let value = value_parser(raw)?;
        if schedule.insert(day, time, value).is_some() {
            debug!("Duplicate slot {} on {}, keeping the later one", time, day);
        }
    }

    Ok(schedule)
}

fn split_slot(slot: &str) -> Result<(&str, &str)> {
    match slot.split_once(',') {
        Some((time, raw)) if !raw.contains(',') => Ok((time, raw)),
        _ => Err(Error::Format(format!("malformed slot {slot:?}"))),
    }
}

/// Encodes a schedule into the unit's string form.
///
/// Entries are written in ascending time order and every day is padded to six
/// slots with empty ones.
///
/// # Errors
///
/// [`Error::CapacityExceeded`] if a day has more than six entries,
/// [`Error::Format`] if a time is not four digits and [`Error::InvalidValue`]
/// if a value cannot be written, e.g. a NaN temperature.
pub fn encode<V: WireValue>(schedule: &WeekSchedule<V>) -> Result<String> {
    let mut slots: [String; WIRE_SLOTS] = std::array::from_fn(|_| EMPTY_SLOT.to_string());

    for (day, entries) in schedule.iter() {
        if entries.len() > SLOTS_PER_DAY {
            return Err(Error::CapacityExceeded {
                day,
                entries: entries.len(),
            });
        }

        let first = day.index() * SLOTS_PER_DAY;
        for (offset, (time, value)) in entries.iter().enumerate() {
            check_time(time)?;
            slots[first + offset] = format!("{time},{}", value.to_wire()?);
        }
    }

    Ok(format!("{WIRE_PREFIX}{}", slots.join(";")))
}

/// Times go on the wire verbatim, anything but `HHMM` would break the slot layout
fn check_time(time: &str) -> Result<()> {
    if time.len() == 4 && time.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(Error::Format(format!("invalid time {time:?}, expected HHMM")))
    }
}

/// Schedule list as carried in the `con` field of schedule resources
#[derive(Debug, Serialize, Deserialize)]
struct ScheduleList {
    data: Vec<String>,
}

/// Decodes every schedule of a `{"data": [...]}` list
pub fn decode_list<V, F>(con: &str, value_parser: F) -> Result<Vec<WeekSchedule<V>>>
where
    F: Fn(&str) -> Result<V>,
{
    let list: ScheduleList = serde_json::from_str(con)?;
    list.data
        .iter()
        .map(|wire| decode(wire, &value_parser))
        .collect()
}

/// Wraps one encoded schedule into a `{"data": [...]}` list
pub fn encode_list<V: WireValue>(schedule: &WeekSchedule<V>) -> Result<String> {
    let list = ScheduleList {
        data: vec![encode(schedule)?],
    };
    Ok(serde_json::to_string(&list)?)
}
