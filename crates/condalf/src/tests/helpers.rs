use std::io::{Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use minicbor::data::Type;
use minicbor::Decoder;

use crate::driver::{TransferDriver, TransferJob};
use crate::error::{Error, Rejected};
use crate::vstorage::FileIo;

/// Spin until `cond` holds, panicking after a generous deadline. The
/// publication chain and the worker mailboxes are asynchronous; tests
/// observe them through state that converges.
pub fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while !cond() {
        assert!(
            std::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
}

pub fn enable_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Trace)
        .format_timestamp(None)
        .is_test(true)
        .try_init();
}

#[derive(Clone, Debug, PartialEq)]
pub enum DecodedValue {
    U64(u64),
    I64(i64),
    Str(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct DecodedRecord {
    pub name: String,
    pub time: f64,
    pub unit: Option<String>,
    pub value: DecodedValue,
}

/// Decode one envelope into its base name and records. Panics on anything
/// that is not a well-formed envelope; tests feed it nothing else.
pub fn decode_envelope(bytes: &[u8]) -> (Option<String>, Vec<DecodedRecord>) {
    let mut d = Decoder::new(bytes);
    assert!(
        d.array().unwrap().is_none(),
        "envelope must be an indefinite-length array"
    );

    let mut base = None;
    let mut records = Vec::new();

    while d.datatype().unwrap() != Type::Break {
        let entries = d.map().unwrap().expect("record maps are definite-length");

        let mut name = None;
        let mut time = None;
        let mut unit = None;
        let mut value = None;
        for _ in 0..entries {
            match d.i64().unwrap() {
                -2 => base = Some(d.str().unwrap().to_owned()),
                0 => name = Some(d.str().unwrap().to_owned()),
                6 => time = Some(d.f64().unwrap()),
                1 => unit = Some(d.str().unwrap().to_owned()),
                2 => {
                    value = Some(match d.datatype().unwrap() {
                        Type::U8 | Type::U16 | Type::U32 | Type::U64 => {
                            DecodedValue::U64(d.u64().unwrap())
                        }
                        Type::I8 | Type::I16 | Type::I32 | Type::I64 => {
                            DecodedValue::I64(d.i64().unwrap())
                        }
                        Type::String => DecodedValue::Str(d.str().unwrap().to_owned()),
                        t => panic!("unexpected value type {t:?}"),
                    })
                }
                k => panic!("unexpected map key {k}"),
            }
        }

        match (name, time, value) {
            // The base map carries no record fields.
            (None, None, None) => {}
            (Some(name), Some(time), Some(value)) => records.push(DecodedRecord {
                name,
                time,
                unit,
                value,
            }),
            other => panic!("half-formed record map: {other:?}"),
        }
    }

    (base, records)
}

/// Decode a concatenation of envelopes in submission order.
pub fn decode_envelopes(envelopes: &[Vec<u8>]) -> Vec<DecodedRecord> {
    envelopes
        .iter()
        .flat_map(|e| decode_envelope(e).1)
        .collect()
}

pub fn read_back(file: &mut dyn FileIo) -> Vec<u8> {
    file.seek(SeekFrom::Start(0)).unwrap();
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).unwrap();
    buf
}

/// A transfer driver that collects every envelope it accepts, and can be
/// switched into refusing jobs to exercise back-pressure paths.
#[derive(Default)]
pub struct CollectingDriver {
    envelopes: Mutex<Vec<Vec<u8>>>,
    rejecting: AtomicBool,
}

impl CollectingDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    pub fn envelopes(&self) -> Vec<Vec<u8>> {
        self.envelopes.lock().unwrap().clone()
    }
}

impl TransferDriver for CollectingDriver {
    fn try_send(&self, mut job: TransferJob) -> Result<(), Rejected> {
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(Rejected::new(job, Error::WouldBlock));
        }
        let bytes = read_back(job.file_mut());
        self.envelopes.lock().unwrap().push(bytes);
        job.finish(Ok(()));
        Ok(())
    }

    fn send(&self, file: &mut dyn FileIo) -> Result<(), Error> {
        self.envelopes.lock().unwrap().push(read_back(file));
        Ok(())
    }
}
