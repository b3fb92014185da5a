use netpool::alloc::SlabBlock;
use netpool::buffer::ByteBuffer;
use netpool::recv::{ChunkStage, RecvBuffer};

use crate::error::HttpError;

const DEFAULT_INITIAL_CAPACITY: usize = 0x1000; // 4 KiB
const DEFAULT_MAX_CAPACITY: usize = 0x100_0000; // 16 MiB

/// Parser state. `Done` and `Bad` are terminal until the context is
/// re-initialised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpState {
    Uninit,
    Start,
    ReadHeader,
    ReadBody,
    ReadChunkHeader,
    ReadChunkBody,
    ReadChunkFooter,
    Done,
    Bad,
}

/// One recorded line: start offset into the merged buffer and its length
/// once the terminating CRLF has been seen.
#[derive(Debug, Clone)]
struct Line {
    start: usize,
    len: Option<usize>,
}

/// Incremental HTTP/1.1 message parser over a [`RecvBuffer`].
///
/// `analyse()` is restartable: each call advances from where the previous
/// one stopped, and calling it again without new bytes changes nothing.
pub struct HttpContext {
    recv: RecvBuffer,
    state: HttpState,
    analysis_cursor: usize,
    lines: Vec<Line>,
    header_size: usize,
    keep_alive: bool,
    chunked: bool,
    content_length: usize,
    chunk_size: usize,
    chunk_size_started: bool,
    chunk_size_done: bool,
    chunks: Vec<(usize, usize)>,
}

impl HttpContext {
    pub fn new() -> HttpContext {
        HttpContext::with_capacity(DEFAULT_INITIAL_CAPACITY, DEFAULT_MAX_CAPACITY)
    }

    pub fn with_capacity(initial: usize, max: usize) -> HttpContext {
        HttpContext {
            recv: RecvBuffer::new(initial, max),
            state: HttpState::Uninit,
            analysis_cursor: 0,
            lines: Vec::new(),
            header_size: 0,
            keep_alive: false,
            chunked: false,
            content_length: 0,
            chunk_size: 0,
            chunk_size_started: false,
            chunk_size_done: false,
            chunks: Vec::new(),
        }
    }

    fn init(&mut self) {
        self.state = HttpState::Start;
        self.analysis_cursor = 0;
        self.lines.clear();
        self.lines.reserve(16);
        self.header_size = 0;
        self.keep_alive = false;
        self.chunked = false;
        self.content_length = 0;
        self.chunk_size = 0;
        self.chunk_size_started = false;
        self.chunk_size_done = false;
        self.chunks.clear();
    }

    // ── Receive-buffer passthrough ──────────────────────────────────

    pub fn push_raw(&self, chunk: SlabBlock) {
        self.recv.push_raw(chunk);
    }

    pub fn merge(&mut self) {
        self.recv.merge();
    }

    pub fn merge_from(&mut self, stage: &ChunkStage) {
        self.recv.merge_from(stage);
    }

    pub fn buffer(&self) -> &RecvBuffer {
        &self.recv
    }

    // ── Analysis ────────────────────────────────────────────────────

    /// Advance the parse as far as the merged bytes allow. Returns true on
    /// a terminal state (`Done` or `Bad`), false for "need more input".
    pub fn analyse(&mut self) -> bool {
        if self.recv.overflow() {
            self.state = HttpState::Bad;
            return true;
        }
        if self.state == HttpState::Uninit {
            self.init();
        }
        loop {
            if matches!(self.state, HttpState::Done | HttpState::Bad) {
                return true;
            }
            let cursor = self.recv.cursor();
            if cursor <= self.analysis_cursor {
                return false;
            }
            match self.state {
                HttpState::Start => {
                    if self.analysis_cursor != 0 || self.recv.data()[0] == b'\n' {
                        self.state = HttpState::Bad;
                        return true;
                    }
                    self.state = HttpState::ReadHeader;
                    self.lines.push(Line {
                        start: 0,
                        len: None,
                    });
                }

                HttpState::ReadHeader => {
                    let mut header_done = false;
                    {
                        let data = self.recv.data();
                        while self.analysis_cursor < cursor {
                            if data[self.analysis_cursor] == b'\n' {
                                // The first byte is never '\n', so there is
                                // always a previous byte to look at.
                                if data[self.analysis_cursor - 1] != b'\r' {
                                    self.state = HttpState::Bad;
                                    return true;
                                }
                                let last = self.lines.last_mut().unwrap();
                                let len = self.analysis_cursor - 1 - last.start;
                                last.len = Some(len);
                                if len == 0 {
                                    self.lines.pop();
                                    self.analysis_cursor += 1;
                                    self.header_size = self.analysis_cursor;
                                    header_done = true;
                                    break;
                                }
                                self.lines.push(Line {
                                    start: self.analysis_cursor + 1,
                                    len: None,
                                });
                            }
                            self.analysis_cursor += 1;
                        }
                    }
                    if header_done {
                        self.decode_headers_and_switch();
                        continue;
                    }
                    return false;
                }

                HttpState::ReadBody => {
                    if cursor - self.analysis_cursor >= self.content_length {
                        self.chunks.push((self.analysis_cursor, self.content_length));
                        self.analysis_cursor += self.content_length;
                        self.state = HttpState::Done;
                        return true;
                    }
                    return false;
                }

                HttpState::ReadChunkHeader => {
                    let mut line_done = false;
                    {
                        let data = self.recv.data();
                        while self.analysis_cursor < cursor {
                            let ch = data[self.analysis_cursor];
                            if ch == b'\n' {
                                if data[self.analysis_cursor - 1] != b'\r' {
                                    self.state = HttpState::Bad;
                                    return true;
                                }
                                self.analysis_cursor += 1;
                                line_done = true;
                                break;
                            }
                            if !self.chunk_size_done {
                                let digit = match ch {
                                    b'0'..=b'9' => Some(ch - b'0'),
                                    b'a'..=b'f' => Some(ch - b'a' + 10),
                                    b'A'..=b'F' => Some(ch - b'A' + 10),
                                    _ => None,
                                };
                                match digit {
                                    Some(value) => {
                                        if self.chunk_size > usize::MAX >> 4 {
                                            self.state = HttpState::Bad;
                                            return true;
                                        }
                                        self.chunk_size =
                                            (self.chunk_size << 4) + value as usize;
                                        self.chunk_size_started = true;
                                    }
                                    None => {
                                        // Whitespace before the size is
                                        // allowed; anything else (e.g. a
                                        // chunk extension) ends the size.
                                        if self.chunk_size_started
                                            || !ch.is_ascii_whitespace()
                                        {
                                            self.chunk_size_done = true;
                                        }
                                    }
                                }
                            }
                            self.analysis_cursor += 1;
                        }
                    }
                    if line_done {
                        if self.chunk_size > 0 {
                            self.state = HttpState::ReadChunkBody;
                        } else {
                            self.state = HttpState::ReadChunkFooter;
                            self.lines.push(Line {
                                start: self.analysis_cursor,
                                len: None,
                            });
                        }
                        continue;
                    }
                    return false;
                }

                HttpState::ReadChunkBody => {
                    // Wait for the chunk body plus its trailing CRLF.
                    if cursor - self.analysis_cursor >= self.chunk_size + 2 {
                        self.chunks.push((self.analysis_cursor, self.chunk_size));
                        self.analysis_cursor += self.chunk_size + 2;
                        self.state = HttpState::ReadChunkHeader;
                        self.chunk_size = 0;
                        self.chunk_size_started = false;
                        self.chunk_size_done = false;
                        continue;
                    }
                    return false;
                }

                HttpState::ReadChunkFooter => {
                    let mut footer_done = false;
                    {
                        let data = self.recv.data();
                        while self.analysis_cursor < cursor {
                            if data[self.analysis_cursor] == b'\n' {
                                if data[self.analysis_cursor - 1] != b'\r' {
                                    self.state = HttpState::Bad;
                                    return true;
                                }
                                let last = self.lines.last_mut().unwrap();
                                let len = self.analysis_cursor - 1 - last.start;
                                last.len = Some(len);
                                if len == 0 {
                                    self.lines.pop();
                                    self.analysis_cursor += 1;
                                    footer_done = true;
                                    break;
                                }
                                self.lines.push(Line {
                                    start: self.analysis_cursor + 1,
                                    len: None,
                                });
                            }
                            self.analysis_cursor += 1;
                        }
                    }
                    if footer_done {
                        self.state = HttpState::Done;
                        return true;
                    }
                    return false;
                }

                HttpState::Uninit | HttpState::Done | HttpState::Bad => unreachable!(),
            }
        }
    }

    /// Decode the recognised headers and pick the body state.
    fn decode_headers_and_switch(&mut self) {
        let mut keep_alive = false;
        let mut chunked = false;
        let mut content_length = 0usize;
        {
            let data = self.recv.data();
            for line in &self.lines {
                if line.start > self.header_size {
                    break; // trailer lines are not message headers
                }
                let Some((name, value)) = split_header(data, line) else {
                    continue;
                };
                if name.eq_ignore_ascii_case(b"Connection") {
                    keep_alive = value.eq_ignore_ascii_case(b"Keep-Alive");
                } else if name.eq_ignore_ascii_case(b"Content-Length") {
                    content_length = parse_decimal_prefix(value);
                } else if name.eq_ignore_ascii_case(b"Transfer-Encoding") {
                    chunked = value.eq_ignore_ascii_case(b"chunked");
                }
            }
        }
        self.keep_alive = keep_alive;
        self.chunked = chunked;
        self.content_length = content_length;

        if self.chunked {
            // Chunked wins over Content-Length when both are present.
            self.state = HttpState::ReadChunkHeader;
            self.chunk_size = 0;
            self.chunk_size_started = false;
            self.chunk_size_done = false;
        } else if self.content_length > 0 {
            self.state = HttpState::ReadBody;
        } else {
            self.state = HttpState::Done;
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn state(&self) -> HttpState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == HttpState::Done
    }

    pub fn is_bad(&self) -> bool {
        self.state == HttpState::Bad
    }

    pub fn is_keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// `(method, uri, version)` for a request, `(version, code, status)`
    /// for a response. Fails unless the first line has all three parts.
    pub fn request_line(&self) -> Result<(&str, &str, &str), HttpError> {
        if self.state != HttpState::Done {
            return Err(HttpError::NotReady);
        }
        let line = self.line_bytes(0).ok_or(HttpError::BadRequestLine)?;
        let text = std::str::from_utf8(line).map_err(|_| HttpError::BadRequestLine)?;
        let mut parts = text.splitn(3, ' ');
        let first = parts.next().filter(|s| !s.is_empty());
        let second = parts.next().filter(|s| !s.is_empty());
        let third = parts.next().filter(|s| !s.is_empty());
        match (first, second, third) {
            (Some(first), Some(second), Some(third)) => Ok((first, second, third)),
            _ => Err(HttpError::BadRequestLine),
        }
    }

    /// All `(name, value)` pairs, case-preserving, whitespace-trimmed.
    /// Repeated names yield repeated entries; trailer lines from chunked
    /// messages are included.
    pub fn headers(&self) -> Result<Vec<(String, String)>, HttpError> {
        if self.state != HttpState::Done {
            return Err(HttpError::NotReady);
        }
        let data = self.recv.data();
        let mut out = Vec::new();
        for line in self.lines.iter().skip(1) {
            if let Some((name, value)) = split_header(data, line) {
                out.push((
                    String::from_utf8_lossy(name).into_owned(),
                    String::from_utf8_lossy(value).into_owned(),
                ));
            }
        }
        Ok(out)
    }

    /// The message body: the concatenation of every recorded chunk range.
    pub fn body(&self) -> Result<ByteBuffer, HttpError> {
        if self.state != HttpState::Done {
            return Err(HttpError::NotReady);
        }
        let total: usize = self.chunks.iter().map(|&(_, len)| len).sum();
        let mut body = ByteBuffer::with_capacity(total);
        let data = self.recv.data();
        for &(start, len) in &self.chunks {
            body.extend_from_slice(&data[start..start + len]);
        }
        Ok(body)
    }

    /// Snapshot the completed message (without any trailing unparsed
    /// bytes) into `copy`. This context is left untouched.
    pub fn extract_into(&self, copy: &mut HttpContext) -> Result<(), HttpError> {
        if self.state != HttpState::Done {
            return Err(HttpError::NotReady);
        }
        copy.recv = self.recv.snapshot_prefix(self.analysis_cursor);
        copy.state = HttpState::Done;
        copy.analysis_cursor = self.analysis_cursor;
        copy.lines = self.lines.clone();
        copy.header_size = self.header_size;
        copy.keep_alive = self.keep_alive;
        copy.chunked = self.chunked;
        copy.content_length = self.content_length;
        copy.chunk_size = 0;
        copy.chunk_size_started = false;
        copy.chunk_size_done = false;
        copy.chunks = self.chunks.clone();
        Ok(())
    }

    /// Move the completed message into `former`, shift the unparsed
    /// remainder to offset 0, and reset so the next `analyse()` parses the
    /// next pipelined message. No bytes are lost or duplicated across the
    /// boundary.
    pub fn reinit_for_next(&mut self, former: &mut HttpContext) -> Result<(), HttpError> {
        if self.state != HttpState::Done {
            return Err(HttpError::NotReady);
        }
        former.recv = self.recv.snapshot_prefix(self.analysis_cursor);
        former.state = HttpState::Done;
        former.analysis_cursor = self.analysis_cursor;
        former.lines = std::mem::take(&mut self.lines);
        former.header_size = self.header_size;
        former.keep_alive = self.keep_alive;
        former.chunked = self.chunked;
        former.content_length = self.content_length;
        former.chunk_size = 0;
        former.chunk_size_started = false;
        former.chunk_size_done = false;
        former.chunks = std::mem::take(&mut self.chunks);

        self.recv.compact_to(self.analysis_cursor);
        self.init();
        Ok(())
    }

    /// Like [`reinit_for_next`](Self::reinit_for_next) without the
    /// snapshot: drop the completed message and keep the remainder.
    pub fn clear(&mut self) -> Result<(), HttpError> {
        if self.state != HttpState::Done {
            return Err(HttpError::NotReady);
        }
        self.recv.compact_to(self.analysis_cursor);
        self.init();
        Ok(())
    }

    fn line_bytes(&self, index: usize) -> Option<&[u8]> {
        let line = self.lines.get(index)?;
        let len = line.len?;
        Some(&self.recv.data()[line.start..line.start + len])
    }
}

impl Default for HttpContext {
    fn default() -> HttpContext {
        HttpContext::new()
    }
}

/// Split one recorded line into trimmed (name, value) at the first colon.
/// Returns None for lines without a colon, unterminated lines, and empty
/// names or values.
fn split_header<'a>(data: &'a [u8], line: &Line) -> Option<(&'a [u8], &'a [u8])> {
    let len = line.len?;
    let raw = &data[line.start..line.start + len];
    let colon = raw.iter().position(|&b| b == b':')?;
    let name = trim_ascii(&raw[..colon]);
    let value = trim_ascii(&raw[colon + 1..]);
    if name.is_empty() || value.is_empty() {
        return None;
    }
    Some((name, value))
}

fn trim_ascii(mut bytes: &[u8]) -> &[u8] {
    while let Some((first, rest)) = bytes.split_first() {
        if first.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    while let Some((last, rest)) = bytes.split_last() {
        if last.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    bytes
}

/// Leading-digits decimal parse; anything else yields 0, like `atoi`.
fn parse_decimal_prefix(bytes: &[u8]) -> usize {
    let mut value = 0usize;
    for &b in bytes {
        if b.is_ascii_digit() {
            value = value.saturating_mul(10).saturating_add((b - b'0') as usize);
        } else {
            break;
        }
    }
    value
}
