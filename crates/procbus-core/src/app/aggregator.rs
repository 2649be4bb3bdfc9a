//! OutputAggregator - per-process capture of stdout/stderr.
//!
//! Every chunk is offered twice: to its own descriptor (`stdout` or `stderr`)
//! and to the synthetic `output` descriptor. Each offer is resolved
//! independently against that descriptor's [`HandlerMode`]:
//!
//! ```text
//! drop                  -> discarded
//! buffer/buffer_retain  -> appended to the descriptor's OutputBuffer, published at exit
//! stream/stream_retain  -> returned as a Delivery for immediate publication
//! ```
//!
//! The aggregator performs no I/O; the caller publishes the returned deliveries.

use std::collections::VecDeque;

use crate::domain::{ChildStream, HandlerMode, ProcessDefinition, StreamDescriptor};

pub fn clipped_marker(clipped: usize) -> String {
    format!("...(clipped {clipped})...\n")
}

/// Bounded chunk buffer.
///
/// Eviction drops whole chunks from the front while more than one chunk is
/// held and `total_len > cap + len(oldest)`. The newest chunk is never evicted,
/// even when it alone exceeds the cap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputBuffer {
    total_len: usize,
    chunks: VecDeque<Vec<u8>>,
    clipped: usize,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: Vec<u8>, cap: usize) {
        self.total_len += chunk.len();
        self.chunks.push_back(chunk);

        while self.chunks.len() > 1 {
            let oldest = self.chunks.front().map_or(0, Vec::len);
            if self.total_len - oldest <= cap {
                break;
            }
            if let Some(evicted) = self.chunks.pop_front() {
                self.total_len -= evicted.len();
                self.clipped += evicted.len();
            }
        }
    }

    pub fn total_len(&self) -> usize {
        self.total_len
    }

    /// Bytes evicted since the last flush.
    pub fn clipped(&self) -> usize {
        self.clipped
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn oldest_len(&self) -> usize {
        self.chunks.front().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.total_len == 0
    }

    /// Concatenate everything held (prefixed by the clipped marker when
    /// bytes were evicted) and reset. `None` when nothing is held.
    pub fn take(&mut self) -> Option<Vec<u8>> {
        let buffer = std::mem::take(self);
        if buffer.total_len == 0 {
            return None;
        }

        let mut out = Vec::with_capacity(buffer.total_len + 32);
        if buffer.clipped > 0 {
            out.extend_from_slice(clipped_marker(buffer.clipped).as_bytes());
        }
        for chunk in buffer.chunks {
            out.extend_from_slice(&chunk);
        }
        Some(out)
    }
}

/// A payload to publish on a stream status topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub stream: StreamDescriptor,
    pub payload: Vec<u8>,
    pub retain: bool,
}

#[derive(Debug, Clone, Default)]
pub struct OutputAggregator {
    buffers: [OutputBuffer; 3],
}

impl OutputAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(&self, stream: StreamDescriptor) -> &OutputBuffer {
        &self.buffers[stream.index()]
    }

    /// Forget everything held (new run).
    pub fn reset(&mut self) {
        self.buffers = Default::default();
    }

    pub fn on_chunk(
        &mut self,
        definition: &ProcessDefinition,
        source: ChildStream,
        data: &[u8],
    ) -> Vec<Delivery> {
        let mut deliveries = Vec::new();
        for stream in [source.descriptor(), StreamDescriptor::Output] {
            let mode = definition.mode(stream);
            match mode {
                HandlerMode::Drop => {}
                HandlerMode::Buffer | HandlerMode::BufferRetain => {
                    self.buffers[stream.index()].push(data.to_vec(), definition.buffer_max);
                }
                HandlerMode::Stream | HandlerMode::StreamRetain => deliveries.push(Delivery {
                    stream,
                    payload: data.to_vec(),
                    retain: mode.retains(),
                }),
            }
        }
        deliveries
    }

    /// Exit-time flush, in `stdout`, `stderr`, `output` order.
    /// Only buffered descriptors with content produce a delivery.
    pub fn flush(&mut self, definition: &ProcessDefinition) -> Vec<Delivery> {
        let mut deliveries = Vec::new();
        for stream in StreamDescriptor::ALL {
            let mode = definition.mode(stream);
            let held = self.buffers[stream.index()].take();
            if !mode.is_buffered() {
                continue;
            }
            if let Some(payload) = held {
                deliveries.push(Delivery {
                    stream,
                    payload,
                    retain: mode.retains(),
                });
            }
        }
        deliveries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn def(stdout: HandlerMode, stderr: HandlerMode, output: HandlerMode) -> ProcessDefinition {
        ProcessDefinition::new("/bin/true")
            .with_mode(StreamDescriptor::Stdout, stdout)
            .with_mode(StreamDescriptor::Stderr, stderr)
            .with_mode(StreamDescriptor::Output, output)
    }

    #[test]
    fn eviction_keeps_total_within_cap_plus_oldest() {
        let mut buf = OutputBuffer::new();
        let sizes = [5usize, 7, 3, 11, 2, 9, 1, 6, 13, 4];
        let mut pushed = 0;
        for (i, size) in sizes.iter().enumerate() {
            buf.push(vec![i as u8; *size], 10);
            pushed += size;

            if buf.chunk_count() > 1 {
                assert!(buf.total_len() <= 10 + buf.oldest_len());
            }
            assert_eq!(buf.total_len() + buf.clipped(), pushed);
        }
        assert!(buf.clipped() > 0);
    }

    #[test]
    fn newest_chunk_is_never_evicted() {
        let mut buf = OutputBuffer::new();
        buf.push(b"abc".to_vec(), 2);
        buf.push(vec![b'x'; 50], 2);

        assert_eq!(buf.chunk_count(), 1);
        assert_eq!(buf.total_len(), 50);
        assert_eq!(buf.clipped(), 3);
    }

    #[test]
    fn single_oversized_chunk_is_kept() {
        let mut buf = OutputBuffer::new();
        buf.push(vec![0; 100], 10);
        assert_eq!(buf.total_len(), 100);
        assert_eq!(buf.clipped(), 0);
    }

    #[test]
    fn unbounded_cap_keeps_every_chunk() {
        let mut buf = OutputBuffer::new();
        buf.push(b"aa".to_vec(), usize::MAX);
        buf.push(b"bb".to_vec(), usize::MAX);

        assert_eq!(buf.chunk_count(), 2);
        assert_eq!(buf.clipped(), 0);
        assert_eq!(buf.take(), Some(b"aabb".to_vec()));
    }

    #[test]
    fn configured_max_buffer_cap_flushes_everything() {
        let table = crate::domain::ProcessTable::from_json_str(
            r#"{"job": {
                "path": "/bin/job",
                "bufferMax": 18446744073709551615,
                "stdout": "buffer"
            }}"#,
        )
        .unwrap();
        let def = table.get(&crate::domain::ProcessName::new("job")).unwrap();
        let mut agg = OutputAggregator::new();

        agg.on_chunk(def, ChildStream::Stdout, b"aa");
        agg.on_chunk(def, ChildStream::Stdout, b"bb");

        let flushed = agg.flush(def);
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].payload, b"aabb".to_vec());
    }

    #[test]
    fn take_prefixes_clipped_marker_and_resets() {
        let mut buf = OutputBuffer::new();
        buf.push(b"aaaa".to_vec(), 2);
        buf.push(b"bb".to_vec(), 2);
        buf.push(b"cc".to_vec(), 2);

        let out = buf.take().unwrap();
        assert_eq!(out, b"...(clipped 4)...\nbbcc".to_vec());
        assert!(buf.is_empty());
        assert_eq!(buf.clipped(), 0);
        assert_eq!(buf.take(), None);
    }

    #[test]
    fn buffer_retain_flushes_concatenation_once() {
        let def = def(HandlerMode::BufferRetain, HandlerMode::Drop, HandlerMode::Drop);
        let mut agg = OutputAggregator::new();

        assert!(agg.on_chunk(&def, ChildStream::Stdout, b"ab").is_empty());
        assert!(agg.on_chunk(&def, ChildStream::Stdout, b"cd").is_empty());

        let flushed = agg.flush(&def);
        assert_eq!(
            flushed,
            vec![Delivery {
                stream: StreamDescriptor::Stdout,
                payload: b"abcd".to_vec(),
                retain: true,
            }]
        );
        assert!(agg.buffer(StreamDescriptor::Stdout).is_empty());
        assert!(agg.flush(&def).is_empty());
    }

    #[test]
    fn streamed_chunk_is_not_flushed_later() {
        let def = def(HandlerMode::Stream, HandlerMode::Drop, HandlerMode::Buffer);
        let mut agg = OutputAggregator::new();

        let live = agg.on_chunk(&def, ChildStream::Stdout, b"hello");
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].stream, StreamDescriptor::Stdout);
        assert!(!live[0].retain);

        let flushed = agg.flush(&def);
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].stream, StreamDescriptor::Output);
        assert_eq!(flushed[0].payload, b"hello".to_vec());
        assert!(!flushed[0].retain);
    }

    #[test]
    fn output_descriptor_sees_both_pipes_in_order() {
        let def = def(HandlerMode::Drop, HandlerMode::StreamRetain, HandlerMode::Buffer);
        let mut agg = OutputAggregator::new();

        agg.on_chunk(&def, ChildStream::Stdout, b"1");
        let live = agg.on_chunk(&def, ChildStream::Stderr, b"2");
        agg.on_chunk(&def, ChildStream::Stdout, b"3");

        assert_eq!(live.len(), 1);
        assert_eq!(live[0].stream, StreamDescriptor::Stderr);
        assert!(live[0].retain);

        let flushed = agg.flush(&def);
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].payload, b"123".to_vec());
    }

    #[rstest]
    #[case::drop(HandlerMode::Drop, 0, 0)]
    #[case::buffer(HandlerMode::Buffer, 0, 1)]
    #[case::buffer_retain(HandlerMode::BufferRetain, 0, 1)]
    #[case::stream(HandlerMode::Stream, 1, 0)]
    #[case::stream_retain(HandlerMode::StreamRetain, 1, 0)]
    fn per_mode_delivery(
        #[case] mode: HandlerMode,
        #[case] live: usize,
        #[case] at_exit: usize,
    ) {
        let def = def(HandlerMode::Drop, mode, HandlerMode::Drop);
        let mut agg = OutputAggregator::new();
        assert_eq!(agg.on_chunk(&def, ChildStream::Stderr, b"x").len(), live);
        assert_eq!(agg.flush(&def).len(), at_exit);
    }

    #[test]
    fn reset_drops_held_output() {
        let def = def(HandlerMode::Buffer, HandlerMode::Drop, HandlerMode::Drop);
        let mut agg = OutputAggregator::new();
        agg.on_chunk(&def, ChildStream::Stdout, b"stale");
        agg.reset();
        assert!(agg.flush(&def).is_empty());
    }
}
