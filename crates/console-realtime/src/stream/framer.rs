/// One blank-line delimited event, reduced to its `data:` payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFrame {
    /// Payloads of the frame's `data:` lines, in order of appearance.
    pub data: Vec<String>,
}

impl EventFrame {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Incremental event-stream framer.
///
/// Bytes are buffered raw and only decoded once a complete frame has been
/// split off, so a code point cut across two chunks is reassembled before
/// decoding. No I/O happens here.
#[derive(Debug, Default)]
pub struct Framer {
    buf: Vec<u8>,
    // Everything before this offset has already been searched for a delimiter.
    scanned: usize,
}

impl Framer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every frame completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<EventFrame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some((idx, delim_len)) = find_frame_delimiter(&self.buf, self.scanned) {
            let frame_bytes: Vec<u8> = self.buf.drain(..idx + delim_len).take(idx).collect();
            self.scanned = 0;
            if let Some(frame) = parse_frame(&frame_bytes) {
                frames.push(frame);
            }
        }
        // A delimiter can straddle the next chunk boundary by up to three bytes.
        self.scanned = self.buf.len().saturating_sub(3);
        frames
    }

    /// Drains whatever is left once the byte source has ended.
    ///
    /// The remainder has no trailing delimiter, so it is handled
    /// best-effort: a remainder with `data:` lines yields those payloads, any
    /// other non-blank remainder is passed through as a single bare payload.
    pub fn flush(&mut self) -> Vec<EventFrame> {
        let rest = std::mem::take(&mut self.buf);
        self.scanned = 0;
        let text = String::from_utf8_lossy(&rest);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        if let Some(frame) = parse_frame(trimmed.as_bytes()) {
            return vec![frame];
        }
        vec![EventFrame {
            data: vec![trimmed.to_string()],
        }]
    }

    /// Bytes currently waiting for a delimiter.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

fn find_frame_delimiter(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 1 < buf.len() {
        if buf[i] == b'\n' && buf[i + 1] == b'\n' {
            return Some((i, 2));
        }
        if i + 3 < buf.len()
            && buf[i] == b'\r'
            && buf[i + 1] == b'\n'
            && buf[i + 2] == b'\r'
            && buf[i + 3] == b'\n'
        {
            return Some((i, 4));
        }
        i += 1;
    }
    None
}

fn parse_frame(bytes: &[u8]) -> Option<EventFrame> {
    let text = String::from_utf8_lossy(bytes);
    let data: Vec<String> = text
        .split('\n')
        .map(str::trim)
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim_start)
        .filter(|payload| !payload.is_empty())
        .map(ToOwned::to_owned)
        .collect();
    if data.is_empty() {
        return None;
    }
    Some(EventFrame { data })
}
