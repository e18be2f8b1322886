//! Renders single query rows into systrace text lines.

use itoa::Buffer as ItoaBuffer;

use crate::value::{Value, cell};

/// Initial capacity of a [`LineBuffer`].
pub const LINE_BUFFER_CAPACITY: usize = 2 * 1024;

/// How the document around the rows is framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// `TRACE:` banner followed by raw ftrace text.
    #[default]
    Plain,
    /// Ftrace text embedded as string values of a JSON document.
    Json,
}

/// Staging area for one formatted row.
pub struct LineBuffer {
    bytes: Vec<u8>,
    itoa: ItoaBuffer,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bytes: Vec::with_capacity(LINE_BUFFER_CAPACITY),
            itoa: ItoaBuffer::new(),
        }
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn push_str(&mut self, s: &str) {
        self.bytes.extend_from_slice(s.as_bytes());
    }

    fn push_int(&mut self, value: i64) {
        let s = self.itoa.format(value);
        self.bytes.extend_from_slice(s.as_bytes());
    }

    fn push_json_escaped(&mut self, s: &str) {
        for &byte in s.as_bytes() {
            match byte {
                b'\n' => self.bytes.extend_from_slice(b"\\n"),
                0x0c => self.bytes.extend_from_slice(b"\\f"),
                0x08 => self.bytes.extend_from_slice(b"\\b"),
                b'\r' => self.bytes.extend_from_slice(b"\\r"),
                b'\t' => self.bytes.extend_from_slice(b"\\t"),
                b'\\' => self.bytes.extend_from_slice(b"\\\\"),
                b'"' => self.bytes.extend_from_slice(b"\\\""),
                other => self.bytes.push(other),
            }
        }
    }

    fn push_name(&mut self, name: &str, framing: Framing) {
        match framing {
            Framing::Plain => self.push_str(name),
            Framing::Json => self.push_json_escaped(name),
        }
    }

    /// End-of-line marker: a real newline, or the two characters `\n` inside a
    /// JSON string.
    fn push_line_end(&mut self, framing: Framing) {
        match framing {
            Framing::Plain => self.bytes.push(b'\n'),
            Framing::Json => self.bytes.extend_from_slice(b"\\n"),
        }
    }
}

/// Signature shared by all row formatters.
pub type RowFormatter = fn(&[Value<'_>], Framing, &mut LineBuffer);

/// Formats a `(pid, ppid, name)` row as a `ps`-style dump line.
pub fn format_process(row: &[Value<'_>], framing: Framing, line: &mut LineBuffer) {
    let pid = cell(row, 0).as_i64();
    let ppid = cell(row, 1).as_i64();
    let name = cell(row, 2).as_text().unwrap_or("");

    line.push_str("root             ");
    line.push_int(pid);
    line.push_str("     ");
    line.push_int(ppid);
    line.push_str("   00000   000 null 0000000000 S ");
    line.push_name(name, framing);
    line.push_str("         null");
    line.push_line_end(framing);
}

/// Formats a `(tid, tgid, name)` row as a thread dump line.
pub fn format_thread(row: &[Value<'_>], framing: Framing, line: &mut LineBuffer) {
    let tid = cell(row, 0).as_i64();
    let tgid = cell(row, 1).as_i64();
    let name = cell(row, 2).as_text().unwrap_or("");

    line.push_str("root         ");
    line.push_int(tgid);
    line.push_str(" ");
    line.push_int(tid);
    line.push_str(" ");
    if name.is_empty() {
        line.push_str("<...>");
    } else {
        line.push_name(name, framing);
    }
    line.push_line_end(framing);
}

/// Formats a row holding one pre-rendered ftrace line.
pub fn format_raw_event(row: &[Value<'_>], framing: Framing, line: &mut LineBuffer) {
    let text = cell(row, 0).as_text().unwrap_or("");
    match framing {
        Framing::Plain => line.push_str(text),
        Framing::Json => line.push_json_escaped(text),
    }
    line.push_line_end(framing);
}
