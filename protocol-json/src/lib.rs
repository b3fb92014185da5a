//! Incremental JSON message framer.
//!
//! Frames one top-level object or array at a time by balancing brackets,
//! without validating the JSON inside. Brackets inside string literals
//! (with escape handling) are ignored. Feed raw chunks, `merge()`, call
//! [`JsonContext::analyse`] until terminal; `restart()` plus `clear()`
//! frame back-to-back messages on a persistent connection.

use netpool::alloc::SlabBlock;
use netpool::buffer::ByteBuffer;
use netpool::recv::{ChunkStage, RecvBuffer};

const DEFAULT_INITIAL_CAPACITY: usize = 0x1000; // 4 KiB
const DEFAULT_MAX_CAPACITY: usize = 0x10000; // 64 KiB

/// Framer state. `Done` and `Bad` are terminal until `restart()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonState {
    Start,
    Object,
    Array,
    Done,
    Bad,
}

/// Bracket-balancing framer over a [`RecvBuffer`].
pub struct JsonContext {
    recv: RecvBuffer,
    analysis_cursor: usize,
    state: JsonState,
    depth: usize,
    start: usize,
    in_string: bool,
    escaped: bool,
}

impl JsonContext {
    pub fn new() -> JsonContext {
        JsonContext::with_capacity(DEFAULT_INITIAL_CAPACITY, DEFAULT_MAX_CAPACITY)
    }

    pub fn with_capacity(initial: usize, max: usize) -> JsonContext {
        JsonContext {
            recv: RecvBuffer::new(initial, max),
            analysis_cursor: 0,
            state: JsonState::Start,
            depth: 0,
            start: 0,
            in_string: false,
            escaped: false,
        }
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

    /// Advance as far as the merged bytes allow. Returns true on a
    /// terminal state, false for "need more input".
    pub fn analyse(&mut self) -> bool {
        if self.recv.overflow() {
            self.state = JsonState::Bad;
            return true;
        }
        loop {
            if matches!(self.state, JsonState::Done | JsonState::Bad) {
                return true;
            }
            let cursor = self.recv.cursor();
            if cursor <= self.analysis_cursor {
                return false;
            }
            match self.state {
                JsonState::Start => {
                    let mut entered: Option<JsonState> = None;
                    {
                        let data = self.recv.data();
                        while self.analysis_cursor < cursor {
                            let ch = data[self.analysis_cursor];
                            if !ch.is_ascii_whitespace() {
                                match ch {
                                    b'{' => entered = Some(JsonState::Object),
                                    b'[' => entered = Some(JsonState::Array),
                                    _ => {
                                        self.state = JsonState::Bad;
                                        return true;
                                    }
                                }
                                break;
                            }
                            self.analysis_cursor += 1;
                        }
                    }
                    match entered {
                        Some(state) => {
                            self.state = state;
                            self.depth = 1;
                            self.start = self.analysis_cursor;
                            self.analysis_cursor += 1;
                            self.in_string = false;
                            self.escaped = false;
                        }
                        None => return false,
                    }
                }

                JsonState::Object => {
                    if self.scan_brackets(cursor, b'{', b'}') {
                        return true;
                    }
                    if self.state == JsonState::Object {
                        return false;
                    }
                }

                JsonState::Array => {
                    if self.scan_brackets(cursor, b'[', b']') {
                        return true;
                    }
                    if self.state == JsonState::Array {
                        return false;
                    }
                }

                JsonState::Done | JsonState::Bad => unreachable!(),
            }
        }
    }

    /// Count `opener`/`closer` outside string literals. Returns true when
    /// the frame closed (state set to `Done`).
    fn scan_brackets(&mut self, cursor: usize, opener: u8, closer: u8) -> bool {
        let data = self.recv.data();
        while self.analysis_cursor < cursor {
            let ch = data[self.analysis_cursor];
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if ch == b'\\' {
                    self.escaped = true;
                } else if ch == b'"' {
                    self.in_string = false;
                }
            } else if ch == b'"' {
                self.in_string = true;
            } else if ch == opener {
                self.depth += 1;
            } else if ch == closer {
                self.depth -= 1;
                if self.depth == 0 {
                    self.analysis_cursor += 1;
                    self.state = JsonState::Done;
                    return true;
                }
            }
            self.analysis_cursor += 1;
        }
        false
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn state(&self) -> JsonState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == JsonState::Done
    }

    pub fn is_bad(&self) -> bool {
        self.state == JsonState::Bad
    }

    /// Copy the framed message into `out`. Only valid once done.
    pub fn extract(&self, out: &mut ByteBuffer) -> bool {
        if self.state != JsonState::Done {
            return false;
        }
        out.set(&self.recv.data()[self.start..self.analysis_cursor]);
        true
    }

    /// Borrow the framed message: exactly the bytes from the opening
    /// bracket through its matching closer, inclusive.
    pub fn content(&self) -> Option<&[u8]> {
        if self.state != JsonState::Done {
            return None;
        }
        Some(&self.recv.data()[self.start..self.analysis_cursor])
    }

    /// Reset the state machine while keeping the buffer, so the next
    /// message on the connection frames from where this one ended.
    pub fn restart(&mut self) {
        self.state = JsonState::Start;
        self.depth = 0;
        self.start = self.analysis_cursor;
        self.in_string = false;
        self.escaped = false;
    }

    /// Compact the buffer, dropping consumed bytes.
    pub fn clear(&mut self) {
        if self.state == JsonState::Done {
            self.recv.compact_to(self.analysis_cursor);
            self.analysis_cursor = 0;
            self.state = JsonState::Start;
            self.depth = 0;
            self.start = 0;
            self.in_string = false;
            self.escaped = false;
        } else if self.state != JsonState::Bad && self.start != 0 {
            // Mid-message: keep the partial frame, drop what precedes it.
            self.recv.compact_to(self.start);
            self.analysis_cursor -= self.start;
            self.start = 0;
        }
    }
}

impl Default for JsonContext {
    fn default() -> JsonContext {
        JsonContext::new()
    }
}
