use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bytes::Bytes;

struct Frame {
    at: Instant,
    pcm: Bytes,
}

/// Bounded FIFO of raw PCM frames with wall-clock timestamps.
///
/// Written on every inbound audio frame; read only when a forced final
/// triggers a recovery pass. Reads copy out, so the recovery recognizer
/// never aliases live buffer memory. Frames older than the retention window
/// are dropped on every push.
pub struct AudioRingBuffer {
    frames: VecDeque<Frame>,
    retention: Duration,
    total_bytes: usize,
}

impl AudioRingBuffer {
    pub fn new(retention: Duration) -> Self {
        Self {
            frames: VecDeque::new(),
            retention,
            total_bytes: 0,
        }
    }

    pub fn push(&mut self, pcm: Bytes, now: Instant) {
        if pcm.is_empty() {
            return;
        }
        self.total_bytes += pcm.len();
        self.frames.push_back(Frame { at: now, pcm });
        self.evict(now);
    }

    /// Contiguous copy of all audio received within the trailing window.
    pub fn recent_bytes(&self, window: Duration, now: Instant) -> Vec<u8> {
        let cutoff = now.checked_sub(window);
        self.collect(|f| cutoff.is_none_or(|c| f.at >= c))
    }

    /// Contiguous copy of the audio around `center` — `pre` before it,
    /// `post` after it. This is the recovery window: the decoder gap sits
    /// just *before* the forced-final instant.
    pub fn window_bytes(&self, center: Instant, pre: Duration, post: Duration) -> Vec<u8> {
        let start = center.checked_sub(pre);
        let end = center + post;
        self.collect(|f| start.is_none_or(|s| f.at >= s) && f.at <= end)
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn len_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.total_bytes = 0;
    }

    fn collect(&self, keep: impl Fn(&Frame) -> bool) -> Vec<u8> {
        let mut out = Vec::new();
        for frame in self.frames.iter().filter(|f| keep(f)) {
            out.extend_from_slice(&frame.pcm);
        }
        out
    }

    fn evict(&mut self, now: Instant) {
        let Some(cutoff) = now.checked_sub(self.retention) else {
            return;
        };
        while let Some(front) = self.frames.front() {
            if front.at >= cutoff {
                break;
            }
            self.total_bytes -= front.pcm.len();
            self.frames.pop_front();
        }
    }
}
