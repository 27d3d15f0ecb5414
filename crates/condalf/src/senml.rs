//! SenML/CBOR envelope encoder.
//!
//! An envelope is one top-level CBOR array: an optional base map carrying the
//! base name, followed by one map per record. The encoder is stateful and
//! append-only; it writes through a [`minicbor::encode::Write`]
//! implementation, which is where the two operating modes come from:
//!
//! * **real mode** writes into a caller-supplied byte buffer through
//!   [`SliceWriter`], failing with [`Error::NoSpace`] when the buffer is
//!   exhausted;
//! * **simulation mode** accounts the bytes that *would* be written through
//!   [`ByteBudget`] and produces no output. This is how the record
//!   serializer proves that a record fits before committing to anything.

use minicbor::encode::{Error as EncodeError, Write};

use crate::error::Error;
use crate::record::{Record, RecordBase, Value};

/// SenML map labels (RFC 8428, CBOR representation).
const KEY_BASE_NAME: i8 = -2;
const KEY_NAME: u8 = 0;
const KEY_UNIT: u8 = 1;
const KEY_VALUE: u8 = 2;
const KEY_TIME: u8 = 6;

/// Upper bound in bytes for closing the envelope array.
pub const ENVELOPE_CLOSE_RESERVE: usize = 4;

/// The writer ran out of buffer (or budget) space.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct OutOfSpace;

/// Writes into a fixed byte slice.
pub(crate) struct SliceWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> SliceWriter<'a> {
    pub(crate) fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Total bytes written so far.
    pub(crate) fn written(&self) -> usize {
        self.pos
    }
}

impl Write for SliceWriter<'_> {
    type Error = OutOfSpace;

    fn write_all(&mut self, src: &[u8]) -> Result<(), Self::Error> {
        let end = self.pos.checked_add(src.len()).ok_or(OutOfSpace)?;
        if end > self.buf.len() {
            return Err(OutOfSpace);
        }
        self.buf[self.pos..end].copy_from_slice(src);
        self.pos = end;
        Ok(())
    }
}

/// Counts would-be output against a budget, retaining nothing.
#[derive(Debug)]
pub(crate) struct ByteBudget {
    written: usize,
    limit: usize,
}

impl ByteBudget {
    pub(crate) fn new(limit: usize) -> Self {
        Self { written: 0, limit }
    }

    /// Total bytes that would have been written so far.
    pub(crate) fn would_write(&self) -> usize {
        self.written
    }
}

impl Write for ByteBudget {
    type Error = OutOfSpace;

    fn write_all(&mut self, src: &[u8]) -> Result<(), Self::Error> {
        self.written = self.written.saturating_add(src.len());
        if self.written > self.limit {
            return Err(OutOfSpace);
        }
        Ok(())
    }
}

/// Stateful SenML/CBOR encoder over a writer.
pub(crate) struct Encoder<W> {
    cbor: minicbor::Encoder<W>,
}

impl<W: Write> Encoder<W> {
    /// Open the envelope array and, if a base name is present, write the
    /// base map.
    pub(crate) fn new(writer: W, base: &RecordBase) -> Result<Self, Error> {
        let mut cbor = minicbor::Encoder::new(writer);
        cbor.begin_array().map_err(no_space)?;

        if let Some(name) = base.name.as_deref() {
            cbor.map(1)
                .and_then(|e| e.i8(KEY_BASE_NAME))
                .and_then(|e| e.str(name))
                .map_err(no_space)?;
        }

        Ok(Self { cbor })
    }

    /// Append one record as a map of tagged entries.
    ///
    /// Fails with [`Error::NoSpace`] when the envelope would exceed the
    /// writer's space, and with [`Error::Invalid`] for [`Value::Empty`]. An
    /// empty value is rejected before any bytes are written, so it never
    /// pollutes the running envelope.
    pub(crate) fn put(&mut self, rec: &Record) -> Result<(), Error> {
        if matches!(rec.value, Value::Empty) {
            log::error!("cannot encode an empty record");
            return Err(Error::Invalid);
        }

        let entries = 3 + u64::from(rec.unit.symbol().is_some());
        self.cbor.map(entries).map_err(no_space)?;

        self.cbor
            .u8(KEY_NAME)
            .and_then(|e| e.str(&rec.name))
            .map_err(no_space)?;
        self.cbor
            .u8(KEY_TIME)
            .and_then(|e| e.f64(rec.timestamp.as_secs_f64()))
            .map_err(no_space)?;
        if let Some(symbol) = rec.unit.symbol() {
            self.cbor
                .u8(KEY_UNIT)
                .and_then(|e| e.str(symbol))
                .map_err(no_space)?;
        }

        self.cbor.u8(KEY_VALUE).map_err(no_space)?;
        match &rec.value {
            Value::U32(v) => self.cbor.u32(*v).map_err(no_space)?,
            Value::I32(v) => self.cbor.i32(*v).map_err(no_space)?,
            Value::Str(s) => self.cbor.str(s).map_err(no_space)?,
            Value::Empty => unreachable!("rejected above"),
        };

        Ok(())
    }

    /// Close the envelope array and hand the writer back, from which the
    /// total encoded (or would-be) length can be read.
    pub(crate) fn close(mut self) -> Result<W, Error> {
        self.cbor.end().map_err(no_space)?;
        Ok(self.cbor.into_writer())
    }
}

// The only failure our writers know is running out of space; message errors
// cannot occur for the fixed shape of data encoded here.
fn no_space<E>(_: EncodeError<E>) -> Error {
    Error::NoSpace
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::record::{Timestamp, Unit};
    use crate::tests::helpers::{decode_envelope, DecodedValue};

    fn sample(name: &str, v: u32) -> Record {
        Record::new(name, Timestamp::new(100, 0), Unit::Percent, Value::U32(v))
    }

    fn encode_all(records: &[Record], base: &RecordBase, size: usize) -> Vec<u8> {
        let mut buf = vec![0; size];
        let mut enc = Encoder::new(SliceWriter::new(&mut buf), base).unwrap();
        for rec in records {
            enc.put(rec).unwrap();
        }
        let n = enc.close().unwrap().written();
        buf.truncate(n);
        buf
    }

    #[test]
    fn envelope_shape() {
        let base = RecordBase {
            name: Some("a:b:".into()),
        };
        let records = [sample("light", 42), sample("light", 43)];
        let bytes = encode_all(&records, &base, 256);

        let (base_name, decoded) = decode_envelope(&bytes);
        assert_eq!(Some("a:b:".to_owned()), base_name);
        assert_eq!(2, decoded.len());
        assert_eq!("light", decoded[0].name);
        assert_eq!(100.0, decoded[0].time);
        assert_eq!(Some("%".to_owned()), decoded[0].unit);
        assert_eq!(DecodedValue::U64(42), decoded[0].value);
        assert_eq!(DecodedValue::U64(43), decoded[1].value);
    }

    #[test]
    fn no_base_no_unit() {
        let rec = Record::new("t", Timestamp::new(1, 500_000), Unit::None, Value::I32(-5));
        let bytes = encode_all(std::slice::from_ref(&rec), &RecordBase::default(), 128);

        let (base_name, decoded) = decode_envelope(&bytes);
        assert_eq!(None, base_name);
        assert_eq!(None, decoded[0].unit);
        assert_eq!(1.5, decoded[0].time);
        assert_eq!(DecodedValue::I64(-5), decoded[0].value);
    }

    #[test]
    fn string_value() {
        let rec = Record::new(
            "ERR",
            Timestamp::new(3, 0),
            Unit::None,
            Value::Str("sensor offline".into()),
        );
        let bytes = encode_all(std::slice::from_ref(&rec), &RecordBase::default(), 128);

        let (_, decoded) = decode_envelope(&bytes);
        assert_eq!(DecodedValue::Str("sensor offline".into()), decoded[0].value);
    }

    #[test]
    fn empty_value_is_invalid() {
        let mut buf = [0; 64];
        let mut enc = Encoder::new(SliceWriter::new(&mut buf), &RecordBase::default()).unwrap();
        let rec = Record::new("x", Timestamp::ZERO, Unit::None, Value::Empty);
        assert!(matches!(enc.put(&rec), Err(Error::Invalid)));
        // The running envelope is untouched and can still be closed.
        let n = enc.close().unwrap().written();
        assert_eq!(2, n); // array open + break
    }

    #[test]
    fn slice_writer_runs_out() {
        let mut buf = [0; 8];
        let mut enc = Encoder::new(SliceWriter::new(&mut buf), &RecordBase::default()).unwrap();
        let rec = sample("a-rather-long-name", 1);
        assert!(matches!(enc.put(&rec), Err(Error::NoSpace)));
    }

    #[test]
    fn budget_runs_out_without_output() {
        let mut enc = Encoder::new(ByteBudget::new(8), &RecordBase::default()).unwrap();
        let rec = sample("a-rather-long-name", 1);
        assert!(matches!(enc.put(&rec), Err(Error::NoSpace)));
    }

    fn arb_record() -> impl Strategy<Value = Record> {
        let value = prop_oneof![
            any::<u32>().prop_map(Value::U32),
            any::<i32>().prop_map(Value::I32),
            "[a-zA-Z0-9 ]{0,24}".prop_map(Value::Str),
        ];
        let unit = prop_oneof![
            Just(Unit::None),
            Just(Unit::Percent),
            Just(Unit::Celsius),
            Just(Unit::MeterPerSecond),
        ];
        ("[a-z:/]{1,16}", any::<u32>(), 0u32..1_000_000, unit, value).prop_map(
            |(name, secs, micros, unit, value)| {
                Record::new(name, Timestamp::new(u64::from(secs), micros), unit, value)
            },
        )
    }

    proptest! {
        /// Simulation accounts exactly the bytes real encoding produces.
        #[test]
        fn simulated_length_matches_real(records in proptest::collection::vec(arb_record(), 0..16)) {
            let base = RecordBase { name: Some("sim:".into()) };

            let mut sim = Encoder::new(ByteBudget::new(usize::MAX), &base).unwrap();
            for rec in &records {
                sim.put(rec).unwrap();
            }
            let would = sim.close().unwrap().would_write();

            let mut buf = vec![0; would];
            let mut real = Encoder::new(SliceWriter::new(&mut buf), &base).unwrap();
            for rec in &records {
                real.put(rec).unwrap();
            }
            let written = real.close().unwrap().written();

            prop_assert_eq!(would, written);
        }
    }
}
