use std::collections::VecDeque;
use std::io::{self, Write};

/// Ring buffer holding the most recent `capacity` lines of the tail
#[derive(Debug)]
pub struct TailBuffer {
    /// Buffered lines, oldest first
    lines: VecDeque<String>,

    /// Maximum capacity
    capacity: usize,
}

impl TailBuffer {
    /// Create a new tail buffer with the given capacity.
    ///
    /// Storage grows as lines arrive; the capacity only bounds it.
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            capacity,
        }
    }

    /// Push a line, evicting oldest if over capacity
    pub fn add(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        self.lines.push_back(line);
        while self.lines.len() > self.capacity {
            self.lines.pop_front();
        }
    }

    /// Number of buffered lines
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Maximum number of lines kept
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Write every buffered line followed by a newline, then clear.
    ///
    /// The first write error is returned as-is and the buffer keeps all of
    /// its lines, including the ones already written.
    pub fn flush<W: Write + ?Sized>(&mut self, writer: &mut W) -> io::Result<()> {
        for line in &self.lines {
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        self.lines.clear();
        Ok(())
    }
}
