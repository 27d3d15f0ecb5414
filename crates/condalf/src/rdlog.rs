//! Remote diagnostics: level-based log lines shipped as records.
//!
//! Each call formats a bounded message, wraps it in a string-typed record
//! named after the level, and submits it to an internal logger, so that
//! diagnostics ride the same pipeline as sensor data. Messages additionally
//! go to the local [`log`] facade, whether or not remote shipping is
//! enabled.

use std::fmt;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::driver::TransferDriver;
use crate::error::Error;
use crate::logger::{Logger, LoggerOptions};
use crate::record::{Record, Timestamp, Unit, Value};
use crate::stream::RecordStream;

/// Provides the timestamp for each shipped line. A result with a zero
/// seconds field means "time not synchronized"; such lines are dropped
/// rather than shipped with a bogus timestamp.
pub type TimeFn = Box<dyn Fn() -> Timestamp + Send>;

/// Maximum length in bytes of one formatted message.
pub const MESSAGE_MAX_LEN: usize = 64;

/// Record queue length of the internal logger.
const RDLOG_QUEUE_LEN: usize = 8;

/// Severity of a diagnostics line.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum Level {
    Err,
    Wrn,
    Inf,
    Dbg,
}

impl Level {
    /// The record name a line of this level is shipped under.
    fn record_name(self) -> &'static str {
        match self {
            Level::Err => "ERR",
            Level::Wrn => "WRN",
            Level::Inf => "INF",
            Level::Dbg => "DBG",
        }
    }

    fn local(self) -> log::Level {
        match self {
            Level::Err => log::Level::Error,
            Level::Wrn => log::Level::Warn,
            Level::Inf => log::Level::Info,
            Level::Dbg => log::Level::Debug,
        }
    }
}

#[derive(Default)]
struct Inner {
    stream: Option<Box<dyn RecordStream>>,
    timef: Option<TimeFn>,
}

/// See the [module documentation](self).
#[derive(Default)]
pub struct RemoteLog {
    inner: Mutex<Inner>,
}

impl RemoteLog {
    /// A disabled remote log; lines only go to the local facade until
    /// [`enable`](Self::enable) is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable remote shipping through `driver`. Can be called again to
    /// rebind; the previous internal logger is closed first.
    pub fn enable(
        &self,
        driver: Arc<dyn TransferDriver>,
        timef: TimeFn,
        base_name: Option<String>,
    ) -> Result<(), Error> {
        let logger = Logger::create(
            LoggerOptions {
                name: "RDLOG".into(),
                record_queue_size: RDLOG_QUEUE_LEN,
                encoding_buf_size: RDLOG_QUEUE_LEN * MESSAGE_MAX_LEN,
                base_name,
            },
            driver,
        )?;

        let mut inner = self.inner.lock().unwrap();
        if let Some(old) = inner.stream.replace(Box::new(logger)) {
            let _ = old.close();
        }
        inner.timef = Some(timef);
        Ok(())
    }

    /// Stop shipping; lines only go to the local facade from here on.
    pub fn disable(&self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(stream) = inner.stream.take() {
            let _ = stream.close();
        }
    }

    /// Push buffered lines towards the transport.
    pub fn flush(&self) {
        let inner = self.inner.lock().unwrap();
        if let Some(stream) = &inner.stream {
            let _ = stream.flush();
        }
    }

    /// Format and submit one line.
    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        let mut message = args.to_string();
        truncate_on_char_boundary(&mut message, MESSAGE_MAX_LEN);
        log::log!(level.local(), "{message}");

        let inner = self.inner.lock().unwrap();
        let Some(stream) = &inner.stream else {
            return;
        };
        let timestamp = inner.timef.as_ref().map(|f| f()).unwrap_or(Timestamp::ZERO);
        if timestamp.seconds == 0 {
            // Shipping a line stamped before time sync would only mislead
            // the backend.
            debug!("rdlog: time not synced, dropping line");
            return;
        }

        let record = Record::new(
            level.record_name(),
            timestamp,
            Unit::None,
            Value::Str(message),
        );
        let _ = stream.put(record);
    }

    pub fn err(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Err, args);
    }

    pub fn wrn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Wrn, args);
    }

    pub fn inf(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Inf, args);
    }

    pub fn dbg(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Dbg, args);
    }
}

fn truncate_on_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}
