//! Thread-safe append-only buffer of intercepted-call log entries.
//!
//! Interception sites append concurrently from arbitrary threads; the
//! server thread drains. Everything runs under a single critical section,
//! so ordering between appenders is lock-acquisition order, and a drain is
//! atomic: an entry lands in exactly one drain, never zero, never two.

use apimon_common::LogEntry;
use std::sync::{Mutex, PoisonError};

/// Shared log buffer. Construct once at agent startup and share by `Arc`.
#[derive(Debug, Default)]
pub struct LogBuffer {
    entries: Mutex<Vec<LogEntry>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry. Safe to call concurrently with itself and with
    /// [`drain_all`](Self::drain_all).
    pub fn append(&self, entry: LogEntry) {
        self.lock().push(entry);
    }

    /// Atomically remove and return every buffered entry, in insertion
    /// order. Ownership transfers to the caller; the buffer is left empty.
    pub fn drain_all(&self) -> Vec<LogEntry> {
        std::mem::take(&mut *self.lock())
    }

    /// Snapshot the buffered entries without clearing them. Used by the
    /// agent's self-check before dispatching a request.
    pub fn peek_all(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LogEntry>> {
        // A poisoned lock means some holder panicked mid-operation; the
        // vector itself is still structurally sound, so keep going rather
        // than wedging every interception site in the host process.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    fn entry(payload: &str) -> LogEntry {
        LogEntry::new("1", "2024-01-01 10:00:00.000", payload)
    }

    #[test]
    fn drain_returns_entries_in_insertion_order_and_clears() {
        let buf = LogBuffer::new();
        buf.append(entry("a"));
        buf.append(entry("b"));
        buf.append(entry("c"));

        let drained = buf.drain_all();
        let payloads: Vec<_> = drained.iter().map(|e| e.payload.as_str()).collect();
        assert_eq!(payloads, ["a", "b", "c"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_on_empty_buffer_is_empty() {
        let buf = LogBuffer::new();
        assert!(buf.drain_all().is_empty());
    }

    #[test]
    fn second_drain_sees_only_entries_appended_in_between() {
        let buf = LogBuffer::new();
        buf.append(entry("first"));
        assert_eq!(buf.drain_all().len(), 1);

        assert!(buf.drain_all().is_empty());

        buf.append(entry("second"));
        let drained = buf.drain_all();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].payload, "second");
    }

    #[test]
    fn peek_does_not_remove_entries() {
        let buf = LogBuffer::new();
        buf.append(entry("kept"));

        assert_eq!(buf.peek_all().len(), 1);
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.drain_all().len(), 1);
    }

    #[test]
    fn concurrent_appends_and_drains_lose_and_duplicate_nothing() {
        const WRITERS: usize = 8;
        const PER_WRITER: usize = 200;

        let buf = Arc::new(LogBuffer::new());
        let mut handles = Vec::new();
        for w in 0..WRITERS {
            let buf = Arc::clone(&buf);
            handles.push(thread::spawn(move || {
                for i in 0..PER_WRITER {
                    buf.append(entry(&format!("{w}:{i}")));
                }
            }));
        }

        // Drain concurrently with the writers; collect everything seen.
        let mut seen: Vec<LogEntry> = Vec::new();
        while seen.len() < WRITERS * PER_WRITER {
            seen.extend(buf.drain_all());
            if handles.iter().all(|h| h.is_finished()) {
                seen.extend(buf.drain_all());
                break;
            }
        }
        for h in handles {
            h.join().unwrap();
        }
        seen.extend(buf.drain_all());

        assert_eq!(seen.len(), WRITERS * PER_WRITER);
        let unique: HashSet<_> = seen.iter().map(|e| e.payload.clone()).collect();
        assert_eq!(unique.len(), WRITERS * PER_WRITER);
        assert!(buf.is_empty());
    }

    #[test]
    fn per_writer_order_is_preserved_within_a_drain() {
        let buf = LogBuffer::new();
        for i in 0..10 {
            buf.append(entry(&format!("{i}")));
        }
        let drained = buf.drain_all();
        for (i, e) in drained.iter().enumerate() {
            assert_eq!(e.payload, format!("{i}"));
        }
    }
}
