//! Bounded in-memory capture of a child's stdout and stderr.
//!
//! Each stream has its own ring buffer; once full the oldest line is evicted.
//! The buffers outlive individual processes so the last run's output stays
//! readable after a crash. They are cleared on the next spawn.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug, Default)]
struct Buffers {
    stdout: VecDeque<String>,
    stderr: VecDeque<String>,
}

/// Shared handle to a service's log ring buffers.
///
/// Cloning yields another handle to the same buffers.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    inner: Arc<Mutex<Buffers>>,
    max_lines: usize,
    dropped: Arc<AtomicUsize>,
}

impl LogBuffer {
    pub fn new(max_lines: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Buffers::default())),
            max_lines: max_lines.max(1),
            dropped: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn push(&self, stream: Stream, line: String) {
        let mut buffers = self.inner.lock();
        let buf = match stream {
            Stream::Stdout => &mut buffers.stdout,
            Stream::Stderr => &mut buffers.stderr,
        };
        buf.push_back(line);
        if buf.len() > self.max_lines {
            buf.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Last `lines` lines of each stream, oldest first.
    pub fn tail(&self, lines: usize) -> (Vec<String>, Vec<String>) {
        let buffers = self.inner.lock();
        (last_n(&buffers.stdout, lines), last_n(&buffers.stderr, lines))
    }

    pub fn clear(&self) {
        let mut buffers = self.inner.lock();
        buffers.stdout.clear();
        buffers.stderr.clear();
        self.dropped.store(0, Ordering::Relaxed);
    }

    /// Lines evicted since the last clear.
    pub fn dropped_count(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    /// Spawn a task copying `reader` line by line into this buffer until EOF.
    pub fn capture<R>(&self, reader: R, stream: Stream, service_id: &str) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = self.clone();
        let service_id = service_id.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => buffer.push(stream, line),
                    Ok(None) => break,
                    Err(e) => {
                        tracing::debug!(
                            "Stopped capturing {:?} for service '{}': {}",
                            stream,
                            service_id,
                            e
                        );
                        break;
                    }
                }
            }
        })
    }
}

fn last_n(buf: &VecDeque<String>, n: usize) -> Vec<String> {
    let skip = buf.len().saturating_sub(n);
    buf.iter().skip(skip).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let logs = LogBuffer::new(3);
        for i in 0..5 {
            logs.push(Stream::Stdout, format!("line {}", i));
        }
        logs.push(Stream::Stderr, "oops".into());

        let (stdout, stderr) = logs.tail(10);
        assert_eq!(stdout, vec!["line 2", "line 3", "line 4"]);
        assert_eq!(stderr, vec!["oops"]);
        assert_eq!(logs.dropped_count(), 2);
    }

    #[test]
    fn test_tail_returns_most_recent() {
        let logs = LogBuffer::new(100);
        for i in 0..10 {
            logs.push(Stream::Stdout, i.to_string());
        }
        let (stdout, _) = logs.tail(2);
        assert_eq!(stdout, vec!["8", "9"]);
    }

    #[test]
    fn test_clones_share_buffers() {
        let logs = LogBuffer::new(10);
        let other = logs.clone();
        other.push(Stream::Stderr, "shared".into());
        assert_eq!(logs.tail(1).1, vec!["shared"]);
        logs.clear();
        assert!(other.tail(10).1.is_empty());
    }

    #[tokio::test]
    async fn test_capture_reads_until_eof() {
        let logs = LogBuffer::new(10);
        let input: &[u8] = b"first\nsecond\nthird";
        logs.capture(input, Stream::Stdout, "svc").await.unwrap();
        assert_eq!(logs.tail(10).0, vec!["first", "second", "third"]);
    }
}
