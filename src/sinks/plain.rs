use std::io::Write;

use crate::error::Result;

/// Forwards bytes to the destination unchanged.
pub struct PlainSink<W: Write> {
    output: W,
}

impl<W: Write> PlainSink<W> {
    #[must_use]
    pub const fn new(output: W) -> Self {
        Self { output }
    }

    /// # Errors
    ///
    /// Returns an error if the destination rejects the write.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.output.write_all(bytes)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the destination cannot be flushed.
    pub fn finish(mut self) -> Result<W> {
        self.output.flush()?;
        Ok(self.output)
    }
}
