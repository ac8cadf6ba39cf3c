//! Bounded in-memory byte pipe between two threads.

use std::io::{self, Read, Write};

use bytes::{Buf, Bytes};
use crossbeam_channel::{Receiver, Sender};

/// Creates a pipe holding at most `capacity` chunks in flight.
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    (
        PipeWriter { tx },
        PipeReader {
            rx,
            current: Bytes::new(),
        },
    )
}

/// Writing end; dropping it marks the end of the stream.
#[derive(Debug)]
pub struct PipeWriter {
    tx: Sender<Bytes>,
}

impl PipeWriter {
    /// Queues a chunk, blocking while the pipe is full.
    pub fn send(&self, chunk: Bytes) -> io::Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.tx
            .send(chunk)
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.send(Bytes::copy_from_slice(buf))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Reading end; reads block until data arrives or the writer is gone.
#[derive(Debug)]
pub struct PipeReader {
    rx: Receiver<Bytes>,
    current: Bytes,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while !self.current.has_remaining() {
            match self.rx.recv() {
                Ok(chunk) => self.current = chunk,
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.current.remaining());
        self.current.copy_to_slice(&mut buf[..n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn reads_span_chunks_until_eof() {
        let (mut writer, mut reader) = pipe(1);
        let producer = thread::spawn(move || {
            for chunk in ["ab", "", "cde", "f"] {
                writer.write_all(chunk.as_bytes()).unwrap();
            }
        });

        let mut small = [0u8; 2];
        let mut out = Vec::new();
        loop {
            let n = reader.read(&mut small).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&small[..n]);
        }
        producer.join().unwrap();
        assert_eq!(out, b"abcdef");
    }

    #[test]
    fn write_to_dropped_reader_fails() {
        let (mut writer, reader) = pipe(4);
        drop(reader);
        let err = writer.write(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
