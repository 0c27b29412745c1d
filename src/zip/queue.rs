//! Ordered output buffer between the archive encoder and its sink.
//!
//! Chunks leave the queue in exactly the order they were pushed. While the
//! shared [`FlowControl`] is paused nothing is delivered; producers keep
//! queueing until `high_water_mark` bytes are pending and then wait for a
//! resume.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use tokio::sync::watch;

use crate::io::ChunkSink;

/// Cloneable pause/resume switch for an archive's output.
///
/// Handed to the sink through [`ChunkSink::attach`] and available from
/// [`ZipStream::flow_control`](super::ZipStream::flow_control), so either
/// side (or any other task) can throttle delivery.
#[derive(Debug, Clone)]
pub struct FlowControl {
    paused: Arc<watch::Sender<bool>>,
}

impl FlowControl {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            paused: Arc::new(paused),
        }
    }

    /// Stop delivering chunks to the sink. Queued data is kept.
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Wait until the output is not paused.
    pub async fn resumed(&self) {
        let mut rx = self.paused.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|paused| !*paused).await;
    }
}

impl Default for FlowControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Pending output chunks plus the sink they are bound for.
pub struct OutputQueue<S> {
    sink: S,
    pending: VecDeque<Vec<u8>>,
    pending_bytes: usize,
    high_water_mark: usize,
    flow: FlowControl,
}

impl<S: ChunkSink> OutputQueue<S> {
    pub fn new(mut sink: S, high_water_mark: usize) -> Self {
        let flow = FlowControl::new();
        sink.attach(flow.clone());
        Self {
            sink,
            pending: VecDeque::new(),
            pending_bytes: 0,
            high_water_mark,
            flow,
        }
    }

    pub fn flow_control(&self) -> FlowControl {
        self.flow.clone()
    }

    /// Append a chunk behind everything already queued.
    pub fn push(&mut self, chunk: Vec<u8>) {
        if chunk.is_empty() {
            return;
        }
        self.pending_bytes += chunk.len();
        self.pending.push_back(chunk);
    }

    /// Deliver queued chunks until the queue is empty or output is paused.
    pub async fn flush(&mut self) -> io::Result<()> {
        while !self.flow.is_paused() {
            let Some(chunk) = self.pending.pop_front() else {
                break;
            };
            self.pending_bytes -= chunk.len();
            self.sink.accept(chunk).await?;
        }
        Ok(())
    }

    /// Whether producers must wait: output is paused and the queue is full.
    pub fn is_blocked(&self) -> bool {
        self.flow.is_paused() && self.pending_bytes >= self.high_water_mark
    }

    /// Flush, then wait for resumes until the queue accepts more data.
    pub async fn wait_writable(&mut self) -> io::Result<()> {
        loop {
            self.flush().await?;
            if !self.is_blocked() {
                return Ok(());
            }
            self.flow.resumed().await;
        }
    }

    /// Deliver everything, waiting out pauses, then end the sink.
    pub async fn end(&mut self) -> io::Result<()> {
        loop {
            self.flush().await?;
            if self.pending.is_empty() {
                break;
            }
            self.flow.resumed().await;
        }
        self.sink.end().await
    }

    /// Drop queued output without delivering it.
    pub fn discard(&mut self) {
        self.pending.clear();
        self.pending_bytes = 0;
    }

    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delivers_in_push_order() {
        let mut queue = OutputQueue::new(Vec::new(), 1024);
        queue.push(b"one ".to_vec());
        queue.push(Vec::new());
        queue.push(b"two ".to_vec());
        queue.flush().await.unwrap();
        queue.push(b"three".to_vec());
        queue.end().await.unwrap();

        assert_eq!(queue.pending_bytes(), 0);
        assert_eq!(queue.into_sink(), b"one two three");
    }

    #[tokio::test]
    async fn test_pause_holds_data() {
        let mut queue = OutputQueue::new(Vec::new(), 8);
        let flow = queue.flow_control();

        flow.pause();
        queue.push(b"abcd".to_vec());
        queue.flush().await.unwrap();
        assert!(queue.sink().is_empty());
        assert_eq!(queue.pending_bytes(), 4);
        assert!(!queue.is_blocked());

        queue.push(b"efgh".to_vec());
        assert!(queue.is_blocked());

        flow.resume();
        queue.wait_writable().await.unwrap();
        assert_eq!(queue.sink(), b"abcdefgh");
        assert_eq!(queue.pending_bytes(), 0);
    }

    #[tokio::test]
    async fn test_end_waits_for_resume() {
        let mut queue = OutputQueue::new(Vec::new(), 8);
        let flow = queue.flow_control();
        flow.pause();
        queue.push(b"tail".to_vec());

        let resumer = {
            let flow = flow.clone();
            tokio::spawn(async move { flow.resume() })
        };
        queue.end().await.unwrap();
        resumer.await.unwrap();

        assert_eq!(queue.into_sink(), b"tail");
    }

    #[tokio::test]
    async fn test_discard() {
        let mut queue = OutputQueue::new(Vec::new(), 8);
        queue.flow_control().pause();
        queue.push(b"gone".to_vec());
        queue.discard();
        assert_eq!(queue.pending_bytes(), 0);
        queue.flow_control().resume();
        queue.flush().await.unwrap();
        assert!(queue.sink().is_empty());
    }
}
