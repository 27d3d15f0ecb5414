//! Debug sink rendering bytes as hex rows through the log facade.

use std::io;

use log::debug;

/// An `io::Write` that dumps everything as `0xNN, ` rows of 16, framed by
/// begin/end banners. Debug tooling: wire it up in place of a transport or a
/// pool file to eyeball an envelope.
pub struct HexOut {
    label: String,
    row: Vec<u8>,
}

impl HexOut {
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        debug!("======== {label} begin ========");
        Self {
            label,
            row: Vec::with_capacity(16),
        }
    }

    fn emit_row(&mut self) {
        let rendered: String = self.row.iter().map(|b| format!("{b:#04X}, ")).collect();
        debug!("{rendered}");
        self.row.clear();
    }
}

impl io::Write for HexOut {
    fn write(&mut self, src: &[u8]) -> io::Result<usize> {
        for &b in src {
            self.row.push(b);
            if self.row.len() == 16 {
                self.emit_row();
            }
        }
        Ok(src.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.row.is_empty() {
            self.emit_row();
        }
        Ok(())
    }
}

impl Drop for HexOut {
    fn drop(&mut self) {
        if !self.row.is_empty() {
            self.emit_row();
        }
        debug!("======== {} end ==========", self.label);
    }
}
