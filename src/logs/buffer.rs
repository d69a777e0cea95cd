// src/logs/buffer.rs

use std::collections::VecDeque;

/// Ring buffer keeping the `limit` most recent lines.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: VecDeque<String>,
    limit: usize,
}

impl LogBuffer {
    /// A limit of zero is treated as one.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            lines: VecDeque::with_capacity(limit.min(1024)),
            limit,
        }
    }

    pub fn push(&mut self, line: String) {
        while self.lines.len() >= self.limit {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// Change the cap, dropping the oldest lines if needed.
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit.max(1);
        while self.lines.len() > self.limit {
            self.lines.pop_front();
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Snapshot, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_most_recent_lines() {
        let mut buf = LogBuffer::new(3);
        for i in 1..=10 {
            buf.push(i.to_string());
        }
        assert_eq!(buf.lines(), vec!["8", "9", "10"]);
    }

    #[test]
    fn lowering_limit_trims_oldest() {
        let mut buf = LogBuffer::new(5);
        for i in 1..=5 {
            buf.push(i.to_string());
        }
        buf.set_limit(2);
        assert_eq!(buf.lines(), vec!["4", "5"]);
        buf.push("6".to_string());
        assert_eq!(buf.lines(), vec!["5", "6"]);
    }

    #[test]
    fn zero_limit_still_keeps_last_line() {
        let mut buf = LogBuffer::new(0);
        buf.push("a".to_string());
        buf.push("b".to_string());
        assert_eq!(buf.lines(), vec!["b"]);
    }
}
