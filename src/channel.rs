use crate::errors::{PipelineError, Result};
use crate::stage::StageKind;
use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

/// How often blocked receivers re-check the cancel token.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Number of written chunks the byte channel buffers before the writer blocks.
pub const BYTE_CHANNEL_DEPTH: usize = 16;

/// Cooperative stop signal shared by every stage of one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, condvar) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleeps for `duration` unless cancelled first. Returns true if cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let (flag, condvar) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = condvar
            .wait_timeout_while(guard, duration, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }

    /// The artificial per-segment delay; wakes early with `Interrupted` on cancel.
    pub fn pause(&self, stage: StageKind, duration: Duration) -> Result<()> {
        if !duration.is_zero() && self.sleep(duration) {
            return Err(PipelineError::Interrupted { stage });
        }
        self.check(stage)
    }

    /// Returns `Interrupted` for `stage` once cancellation has been requested.
    pub fn check(&self, stage: StageKind) -> Result<()> {
        if self.is_cancelled() {
            Err(PipelineError::Interrupted { stage })
        } else {
            Ok(())
        }
    }
}

/// Bounded queue transferring ownership of whole items between two stages.
/// Dropping the sender closes the queue.
pub fn handoff<T>(capacity: usize) -> (HandoffSender<T>, HandoffReceiver<T>) {
    let (tx, rx) = mpsc::sync_channel(capacity.max(1));
    (HandoffSender { tx }, HandoffReceiver { rx })
}

#[derive(Debug)]
pub struct HandoffSender<T> {
    tx: SyncSender<T>,
}

impl<T> HandoffSender<T> {
    /// Blocks while the queue is full.
    pub fn send(&self, item: T) -> Result<()> {
        self.tx.send(item).map_err(|_| PipelineError::Transfer {
            message: "handoff queue receiver is gone".to_string(),
        })
    }

    pub fn close(self) {}
}

#[derive(Debug)]
pub struct HandoffReceiver<T> {
    rx: Receiver<T>,
}

impl<T> HandoffReceiver<T> {
    /// Blocks until an item arrives, the sender closes, or `cancel` fires.
    pub fn recv(&self, stage: StageKind, cancel: &CancelToken) -> Result<T> {
        loop {
            cancel.check(stage)?;
            match self.rx.recv_timeout(CANCEL_POLL_INTERVAL) {
                Ok(item) => return Ok(item),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(PipelineError::UpstreamClosed { stage })
                }
            }
        }
    }
}

#[derive(Debug)]
enum ChannelMessage {
    Data(Vec<u8>),
    Abort(String),
}

/// Ordered point-to-point byte stream. Dropping or closing the writer is a clean
/// end of data; `abort` makes the reader fail instead of seeing EOF.
pub fn byte_channel() -> (ByteWriter, ByteReader) {
    let (tx, rx) = mpsc::sync_channel(BYTE_CHANNEL_DEPTH);
    (
        ByteWriter { tx },
        ByteReader {
            rx,
            current: Vec::new(),
            pos: 0,
            cancel: None,
            finished: false,
        },
    )
}

#[derive(Debug)]
pub struct ByteWriter {
    tx: SyncSender<ChannelMessage>,
}

impl ByteWriter {
    pub fn close(self) {}

    /// Closes the channel with an error so the reader does not mistake it for EOF.
    pub fn abort(self, reason: impl Into<String>) {
        let _ = self.tx.send(ChannelMessage::Abort(reason.into()));
    }
}

impl Write for ByteWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .send(ChannelMessage::Data(buf.to_vec()))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "byte channel reader is gone"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct ByteReader {
    rx: Receiver<ChannelMessage>,
    current: Vec<u8>,
    pos: usize,
    cancel: Option<CancelToken>,
    finished: bool,
}

impl ByteReader {
    /// Makes blocked reads give up with `ConnectionAborted` once `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn next_message(&mut self) -> io::Result<Option<ChannelMessage>> {
        loop {
            if let Some(cancel) = &self.cancel {
                if cancel.is_cancelled() {
                    return Err(io::Error::new(io::ErrorKind::ConnectionAborted, "cancelled"));
                }
            }
            match self.rx.recv_timeout(CANCEL_POLL_INTERVAL) {
                Ok(message) => return Ok(Some(message)),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Ok(None),
            }
        }
    }
}

impl Read for ByteReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.pos >= self.current.len() {
            if self.finished {
                return Ok(0);
            }
            match self.next_message()? {
                Some(ChannelMessage::Data(chunk)) => {
                    self.current = chunk;
                    self.pos = 0;
                }
                Some(ChannelMessage::Abort(reason)) => {
                    self.finished = true;
                    return Err(io::Error::new(io::ErrorKind::ConnectionAborted, reason));
                }
                None => {
                    self.finished = true;
                    return Ok(0);
                }
            }
        }

        let n = buf.len().min(self.current.len() - self.pos);
        buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_handoff_transfers_once() {
        let (tx, rx) = handoff::<Vec<u32>>(1);
        let cancel = CancelToken::new();
        tx.send(vec![1, 2, 3]).unwrap();
        tx.close();

        assert_eq!(rx.recv(StageKind::Transform, &cancel).unwrap(), vec![1, 2, 3]);
        let err = rx.recv(StageKind::Transform, &cancel).unwrap_err();
        assert_eq!(err.error_code(), "UPSTREAM_CLOSED");
    }

    #[test]
    fn test_handoff_recv_observes_cancel() {
        let (_tx, rx) = handoff::<u8>(1);
        let cancel = CancelToken::new();
        let remote = cancel.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            remote.cancel();
        });

        let err = rx.recv(StageKind::Transform, &cancel).unwrap_err();
        assert_eq!(err.error_code(), "INTERRUPTED");
        canceller.join().unwrap();
    }

    #[test]
    fn test_byte_channel_streams_across_threads() {
        let (mut writer, mut reader) = byte_channel();
        let producer = thread::spawn(move || {
            for chunk in [&b"hello "[..], b"staged ", b"world"] {
                writer.write_all(chunk).unwrap();
            }
            writer.close();
        });

        let mut received = String::new();
        reader.read_to_string(&mut received).unwrap();
        producer.join().unwrap();
        assert_eq!(received, "hello staged world");
    }

    #[test]
    fn test_abort_is_not_eof() {
        let (mut writer, mut reader) = byte_channel();
        writer.write_all(b"ab").unwrap();
        writer.abort("encode failed");

        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        let err = reader.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionAborted);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_write_after_reader_dropped_is_broken_pipe() {
        let (mut writer, reader) = byte_channel();
        drop(reader);
        let err = writer.write(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_cancel_wakes_sleep_early() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let started = Instant::now();
        assert!(cancel.sleep(Duration::from_secs(5)));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!CancelToken::new().sleep(Duration::from_millis(1)));
    }
}
