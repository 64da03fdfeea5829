//! The line buffer for one translation unit, split by a cursor into an
//! already-emitted half and a pending half. Multi-line rules examine the
//! tail of the emitted half; analyzers walk the concatenation of both.

use crate::line::Line;

#[derive(Debug, Clone)]
pub struct AsmBuf {
    lines: Vec<Line>,
    /// Boundary index: `lines[..cursor]` is emitted, `lines[cursor..]` is
    /// pending input.
    cursor: usize,
}

impl AsmBuf {
    pub fn load(lines: Vec<Line>) -> AsmBuf {
        AsmBuf { lines, cursor: 0 }
    }

    /// Build from source text, trimming each line and recording 1-based
    /// origins.
    pub fn from_source(source: &str) -> AsmBuf {
        let lines = source
            .lines()
            .enumerate()
            .map(|(i, text)| Line::with_origin(text, (i + 1) as u32))
            .collect();
        AsmBuf::load(lines)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn set_cursor(&mut self, cursor: usize) {
        debug_assert!(cursor <= self.lines.len());
        self.cursor = cursor;
    }

    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    pub fn done(&self) -> bool {
        self.cursor >= self.lines.len()
    }

    /// Consume one pending line into the emitted half.
    pub fn advance(&mut self) -> bool {
        if self.done() {
            return false;
        }
        self.cursor += 1;
        true
    }

    pub fn emitted(&self) -> &[Line] {
        &self.lines[..self.cursor]
    }

    pub fn pending(&self) -> &[Line] {
        &self.lines[self.cursor..]
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn line(&self, idx: usize) -> &Line {
        &self.lines[idx]
    }

    pub fn line_mut(&mut self, idx: usize) -> &mut Line {
        &mut self.lines[idx]
    }

    pub fn get(&self, idx: usize) -> Option<&Line> {
        self.lines.get(idx)
    }

    /// Last `k` emitted lines.
    pub fn window(&self, k: usize) -> &[Line] {
        &self.lines[self.cursor - k..self.cursor]
    }

    /// Replace the last `k` emitted lines with `replacement`; the cursor
    /// stays at the end of the replacement.
    pub fn splice_tail(&mut self, k: usize, replacement: Vec<Line>) {
        debug_assert!(k <= self.cursor);
        let start = self.cursor - k;
        let added = replacement.len();
        self.lines.splice(start..self.cursor, replacement);
        self.cursor = start + added;
    }

    /// Insert a line at an absolute index. An insertion strictly before
    /// the cursor lands in the emitted half and moves the boundary.
    pub fn insert(&mut self, idx: usize, line: Line) {
        self.lines.insert(idx, line);
        if idx < self.cursor {
            self.cursor += 1;
        }
    }

    pub fn remove(&mut self, idx: usize) -> Line {
        let line = self.lines.remove(idx);
        if idx < self.cursor {
            self.cursor -= 1;
        }
        line
    }

    pub fn into_lines(self) -> Vec<Line> {
        self.lines
    }

    /// Render back to source text: labels and comments in column zero,
    /// everything else behind a tab.
    pub fn to_source(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            if line.is_empty() {
                out.push('\n');
                continue;
            }
            if !(line.is_label() || line.is_comment()) {
                out.push('\t');
            }
            out.push_str(line.text());
            out.push('\n');
        }
        out
    }
}

/// Scoped neutralization of the last `count` emitted lines: each is
/// prefixed with `#` so analyzer walks do not count the window a rule is
/// about to replace as reads. The original texts are restored on drop, on
/// every exit path.
pub struct TailGuard<'a> {
    buf: &'a mut AsmBuf,
    start: usize,
    saved: Vec<String>,
}

impl<'a> TailGuard<'a> {
    pub fn neutralize(buf: &'a mut AsmBuf, count: usize) -> TailGuard<'a> {
        let count = count.min(buf.cursor());
        let start = buf.cursor() - count;
        let mut saved = Vec::with_capacity(count);
        for idx in start..buf.cursor() {
            let line = buf.line_mut(idx);
            saved.push(line.text().to_string());
            let neutralized = format!("# {}", line.text());
            line.set_text(neutralized);
        }
        TailGuard { buf, start, saved }
    }

    pub fn buf(&self) -> &AsmBuf {
        self.buf
    }
}

impl Drop for TailGuard<'_> {
    fn drop(&mut self) {
        for (offset, text) in self.saved.drain(..).enumerate() {
            self.buf.line_mut(self.start + offset).set_text(text);
        }
    }
}
