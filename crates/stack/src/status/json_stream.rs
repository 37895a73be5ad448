//! NDJSON (newline-delimited JSON) stream sink.
//!
//! Every row is flushed as soon as it is written: the reader on the other
//! end of the pipe waits for whole lines.
//!
//! ```ignore
//! let mut sink = JsonStreamSink::new(std::io::stdout());
//! sink.write_row(&status)?;
//! ```

use serde::Serialize;
use std::io::{self, BufWriter, Write};

pub struct JsonStreamSink<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> JsonStreamSink<W> {
    /// Create a sink wrapping any writer (file, Vec<u8>, etc.).
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(16 * 1024, writer),
        }
    }

    /// Serializes `row` straight into the buffer, then terminates and flushes the line.
    pub fn write_row<T: Serialize + ?Sized>(&mut self, row: &T) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, row).map_err(io::Error::other)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}
