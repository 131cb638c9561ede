//! Non-blocking line reader
//!
//! Pulls whatever bytes are ready from a stream and yields completed lines,
//! preserving a partial trailing line across calls. Readiness is tested
//! non-blockingly by the caller (typically via `set_nonblocking` on the
//! underlying fd); this module only does the framing.

const READ_CHUNK: usize = 1024 * 1024;

/// Per-stream carry-over buffer for lines that haven't seen a terminator
/// yet. One of these lives on each child record's stdout/stderr slot (see
/// `registry::ChildRecord`), not in a crate-global map.
#[derive(Debug, Default, Clone)]
pub struct LineBuffer {
    carry: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed newly-read bytes; returns the complete lines found, with
    /// terminators stripped. Any trailing partial line is retained for the
    /// next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.carry.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(pos) = memchr_newline(&self.carry[start..]) {
            let end = start + pos;
            let mut line_end = end;
            if line_end > start && self.carry[line_end - 1] == b'\r' {
                line_end -= 1;
            }
            lines.push(String::from_utf8_lossy(&self.carry[start..line_end]).into_owned());
            start = end + 1;
        }
        self.carry.drain(..start);
        lines
    }

    /// Flush whatever partial line remains (called on EOF). Returns it as a
    /// single element if non-empty, clearing the buffer either way.
    pub fn flush_on_eof(&mut self) -> Vec<String> {
        if self.carry.is_empty() {
            return Vec::new();
        }
        let line = String::from_utf8_lossy(&self.carry).into_owned();
        self.carry.clear();
        vec![line]
    }

    pub fn is_empty(&self) -> bool {
        self.carry.is_empty()
    }
}

fn memchr_newline(haystack: &[u8]) -> Option<usize> {
    haystack.iter().position(|&b| b == b'\n')
}

/// Read whatever is currently available from `stream` (a non-blocking
/// reader) into `buffer`, returning the completed lines. Returns an empty
/// vector both when the stream isn't ready (`WouldBlock`) and when there
/// happens to be no complete line yet.
pub fn read_available_lines<R: std::io::Read>(
    stream: &mut R,
    buffer: &mut LineBuffer,
) -> std::io::Result<Vec<String>> {
    let mut chunk = vec![0u8; READ_CHUNK];
    match stream.read(&mut chunk) {
        Ok(0) => Ok(buffer.flush_on_eof()),
        Ok(n) => Ok(buffer.feed(&chunk[..n])),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}
