//! Background writer for received data
//!
//! The receive loop hands consumed chunks to a dedicated thread over a
//! bounded channel so that slow storage never stalls ack generation.
//! A full queue tells the loop to leave data in the receive buffer,
//! which shrinks the advertised window.

use bytes::Bytes;
use crossbeam::channel::{self, Sender, TrySendError};
use std::io::{self, Write};
use std::thread::{self, JoinHandle};

/// Handle to a running writer thread
pub struct OutputWriter<W> {
    queue: Sender<Bytes>,
    handle: JoinHandle<io::Result<(W, u64)>>,
}

impl<W: Write + Send + 'static> OutputWriter<W> {
    /// Spawn a writer thread that drains up to `capacity` queued chunks
    pub fn spawn(mut sink: W, capacity: usize) -> io::Result<Self> {
        let (queue, chunks) = channel::bounded::<Bytes>(capacity);
        let handle = thread::Builder::new()
            .name("rdt-output".to_string())
            .spawn(move || {
                let mut written = 0u64;
                for chunk in chunks {
                    sink.write_all(&chunk)?;
                    written += chunk.len() as u64;
                }
                sink.flush()?;
                Ok((sink, written))
            })?;

        Ok(OutputWriter { queue, handle })
    }

    /// Whether another chunk can be queued without blocking
    pub fn has_capacity(&self) -> bool {
        !self.queue.is_full()
    }

    /// Queue a chunk, handing it back if the queue is full
    pub fn try_write(&self, chunk: Bytes) -> Result<(), Bytes> {
        match self.queue.try_send(chunk) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(chunk)) | Err(TrySendError::Disconnected(chunk)) => Err(chunk),
        }
    }

    /// Close the queue and wait for everything to reach the sink
    ///
    /// Returns the sink and the number of bytes written.
    pub fn finish(self) -> io::Result<(W, u64)> {
        drop(self.queue);
        self.handle
            .join()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "output writer thread panicked"))?
    }
}
