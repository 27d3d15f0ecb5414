//! The record, the basic telemetry data type.

use std::sync::Arc;

/// Wall-clock instant of a measurement, split into seconds and microseconds.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Timestamp {
    pub seconds: u64,
    pub micros: u32,
}

impl Timestamp {
    /// The zero instant, conventionally meaning "time not synchronized yet".
    pub const ZERO: Self = Self { seconds: 0, micros: 0 };

    pub fn new(seconds: u64, micros: u32) -> Self {
        Self { seconds, micros }
    }

    /// Seconds since the epoch as a double, the SenML time representation.
    pub fn as_secs_f64(self) -> f64 {
        self.seconds as f64 + f64::from(self.micros) * 1e-6
    }
}

/// Measurement unit, taken from the SenML unit table.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Unit {
    /// No unit; nothing is emitted into the encoding.
    #[default]
    None,
    Meter,
    Kilogram,
    Gram,
    Second,
    Ampere,
    Kelvin,
    Candela,
    Mole,
    Hertz,
    Radian,
    Steradian,
    Newton,
    Pascal,
    Joule,
    Watt,
    Coulomb,
    Volt,
    Farad,
    Ohm,
    Siemens,
    Weber,
    Tesla,
    Henry,
    Celsius,
    Lumen,
    Lux,
    Becquerel,
    Gray,
    Sievert,
    Katal,
    SquareMeter,
    CubicMeter,
    Liter,
    MeterPerSecond,
    MeterPerSecondSquared,
    CubicMeterPerSecond,
    LiterPerSecond,
    WattPerSquareMeter,
    CandelaPerSquareMeter,
    Bit,
    BitPerSecond,
    Latitude,
    Longitude,
    Ph,
    Decibel,
    DecibelWatt,
    BelSoundPressure,
    Count,
    Ratio,
    Percent,
    RelativeHumidity,
    RemainingBatteryPercent,
    RemainingBatterySeconds,
    EventsPerSecond,
    EventsPerMinute,
    BeatsPerMinute,
    Beats,
    SiemensPerMeter,
}

impl Unit {
    /// The SenML unit symbol, or `None` for [`Unit::None`].
    pub fn symbol(self) -> Option<&'static str> {
        use Unit::*;
        Some(match self {
            None => return Option::None,
            Meter => "m",
            Kilogram => "kg",
            Gram => "g",
            Second => "s",
            Ampere => "A",
            Kelvin => "K",
            Candela => "cd",
            Mole => "mol",
            Hertz => "Hz",
            Radian => "rad",
            Steradian => "sr",
            Newton => "N",
            Pascal => "Pa",
            Joule => "J",
            Watt => "W",
            Coulomb => "C",
            Volt => "V",
            Farad => "F",
            Ohm => "Ohm",
            Siemens => "S",
            Weber => "Wb",
            Tesla => "T",
            Henry => "H",
            Celsius => "Cel",
            Lumen => "lm",
            Lux => "lx",
            Becquerel => "Bq",
            Gray => "Gy",
            Sievert => "Sv",
            Katal => "kat",
            SquareMeter => "m2",
            CubicMeter => "m3",
            Liter => "l",
            MeterPerSecond => "m/s",
            MeterPerSecondSquared => "m/s2",
            CubicMeterPerSecond => "m3/s",
            LiterPerSecond => "l/s",
            WattPerSquareMeter => "W/m2",
            CandelaPerSquareMeter => "cd/m2",
            Bit => "bit",
            BitPerSecond => "bit/s",
            Latitude => "lat",
            Longitude => "lon",
            Ph => "pH",
            Decibel => "dB",
            DecibelWatt => "dBW",
            BelSoundPressure => "Bspl",
            Count => "count",
            Ratio => "/",
            Percent => "%",
            RelativeHumidity => "%RH",
            RemainingBatteryPercent => "%EL",
            RemainingBatterySeconds => "EL",
            EventsPerSecond => "1/s",
            EventsPerMinute => "1/min",
            BeatsPerMinute => "beat/min",
            Beats => "beats",
            SiemensPerMeter => "S/m",
        })
    }
}

/// The measured value.
///
/// A string payload is owned by whoever currently holds the record: moving
/// the record moves the string, cloning deep-copies it, and dropping the
/// record releases it.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    /// No value. Cannot be encoded; puts fail with
    /// [`Invalid`](crate::error::Error::Invalid).
    #[default]
    Empty,
    U32(u32),
    I32(i32),
    Str(String),
}

/// A named, timestamped, typed telemetry sample.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    /// Name of the measurement (and/or the node it came from).
    ///
    /// Names are expected to be long-lived and referenced by many records,
    /// while records themselves are created and dropped very often. The
    /// shared string makes cloning a record cheap on the name side: only the
    /// string payload of [`Value::Str`] is ever deep-copied.
    pub name: Arc<str>,
    pub timestamp: Timestamp,
    pub unit: Unit,
    pub value: Value,
}

impl Record {
    pub fn new(name: impl Into<Arc<str>>, timestamp: Timestamp, unit: Unit, value: Value) -> Self {
        Self {
            name: name.into(),
            timestamp,
            unit,
            value,
        }
    }
}

/// Header applied once per encoded envelope.
///
/// The base name is a prefix which decoders prepend to every record name in
/// the envelope. For a backend named `swp` and a sensor `cdf1`, a base name
/// of `"swp:cdf1:"` resolves a record named `"light"` to `"swp:cdf1:light"`,
/// so the prefix travels only once per envelope.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordBase {
    /// Leave `None` if not used.
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_as_senml_seconds() {
        assert_eq!(100.0, Timestamp::new(100, 0).as_secs_f64());
        assert_eq!(1.5, Timestamp::new(1, 500_000).as_secs_f64());
        assert_eq!(0.0, Timestamp::ZERO.as_secs_f64());
    }

    #[test]
    fn clone_deep_copies_string_payload() {
        let rec = Record::new(
            "diag",
            Timestamp::new(7, 0),
            Unit::None,
            Value::Str("battery low".into()),
        );
        let copy = rec.clone();

        assert_eq!(rec, copy);
        // The name is shared, not copied.
        assert!(Arc::ptr_eq(&rec.name, &copy.name));
        match (&rec.value, &copy.value) {
            (Value::Str(a), Value::Str(b)) => assert_ne!(a.as_ptr(), b.as_ptr()),
            _ => unreachable!(),
        }
    }

    #[test]
    fn percent_symbol() {
        assert_eq!(Some("%"), Unit::Percent.symbol());
        assert_eq!(None, Unit::None.symbol());
    }
}
