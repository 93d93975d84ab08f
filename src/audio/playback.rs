//! # Playback Queue
//!
//! Ordered, single-consumer queue of raw PCM payloads received from the agent.
//! Payloads are wrapped, decoded and played strictly one at a time in enqueue order.
//!
//! ## Consumer Model:
//! - The first `enqueue` onto an idle queue fires `on_start` and spawns a consumer task
//! - The consumer pops the head, plays it to completion, and loops
//! - When the queue runs dry it marks itself idle and fires `on_end` once per drain
//! - A payload that fails to decode or play is logged and skipped
//!
//! ## Cancellation:
//! - **clear()**: drops pending payloads and marks the queue idle. An item already
//!   playing is left to finish, and no later item starts until it has.
//! - **interrupt()**: `clear()` plus aborting the consumer and stopping the sink now.

use crate::audio::codec;
use crate::audio::traits::AudioSink;

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

/// Lifecycle callback fired by the queue.
pub type PlaybackCallback = Arc<dyn Fn() + Send + Sync>;

/// One queued payload, owned by the queue until played or discarded.
#[derive(Debug)]
pub struct PlaybackItem {
    pub seq: u64,
    pub pcm: Vec<u8>,
}

struct QueueState {
    pending: VecDeque<PlaybackItem>,
    is_playing: bool,
    /// Bumped on every clear so stale consumers stand down
    generation: u64,
    next_seq: u64,
    consumer: Option<AbortHandle>,
}

struct QueueShared {
    sink: Arc<dyn AudioSink>,
    state: Mutex<QueueState>,
    /// Held for the duration of one decode+play
    playhead: tokio::sync::Mutex<()>,
    playing: watch::Sender<bool>,
    decode_failures: AtomicU64,
    on_start: PlaybackCallback,
    on_end: PlaybackCallback,
}

/// Handle to a playback queue. Clones share the same queue.
#[derive(Clone)]
pub struct PlaybackQueue {
    shared: Arc<QueueShared>,
}

impl PlaybackQueue {
    pub fn new(sink: Arc<dyn AudioSink>, on_start: PlaybackCallback, on_end: PlaybackCallback) -> Self {
        let (playing, _) = watch::channel(false);
        Self {
            shared: Arc::new(QueueShared {
                sink,
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    is_playing: false,
                    generation: 0,
                    next_seq: 0,
                    consumer: None,
                }),
                playhead: tokio::sync::Mutex::new(()),
                playing,
                decode_failures: AtomicU64::new(0),
                on_start,
                on_end,
            }),
        }
    }

    /// Append a payload; starts consuming if the queue was idle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue(&self, pcm: Vec<u8>) {
        let mut state = self.shared.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        debug!(seq, bytes = pcm.len(), "Queued audio chunk");
        state.pending.push_back(PlaybackItem { seq, pcm });

        if state.is_playing {
            return;
        }

        state.is_playing = true;
        self.shared.playing.send_replace(true);
        (self.shared.on_start)();

        let generation = state.generation;
        let shared = self.shared.clone();
        let consumer = tokio::spawn(drain(shared, generation));
        state.consumer = Some(consumer.abort_handle());
    }

    /// Discard pending payloads and mark the queue idle.
    ///
    /// Does not cut off an item that is already playing; see [`interrupt`](Self::interrupt).
    pub fn clear(&self) {
        let mut state = self.shared.state.lock();
        let dropped = state.pending.len();
        state.pending.clear();
        state.is_playing = false;
        state.generation += 1;
        state.consumer = None;
        self.shared.playing.send_replace(false);
        if dropped > 0 {
            debug!(dropped, "Cleared pending audio");
        }
    }

    /// Stop playback now: clear, abort the in-flight item and silence the sink.
    pub fn interrupt(&self) {
        let consumer = {
            let mut state = self.shared.state.lock();
            state.consumer.take()
        };
        self.clear();
        if let Some(consumer) = consumer {
            consumer.abort();
        }
        self.shared.sink.stop();
    }

    pub fn is_playing(&self) -> bool {
        self.shared.state.lock().is_playing
    }

    pub fn pending(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Payloads skipped because they could not be decoded.
    pub fn decode_failures(&self) -> u64 {
        self.shared.decode_failures.load(Ordering::Relaxed)
    }

    /// Wait until the queue is idle.
    pub async fn drained(&self) {
        let mut playing = self.shared.playing.subscribe();
        let _ = playing.wait_for(|is_playing| !*is_playing).await;
    }
}

/// Consumer loop for one drain.
async fn drain(shared: Arc<QueueShared>, generation: u64) {
    loop {
        let item = {
            let mut state = shared.state.lock();
            if state.generation != generation {
                return;
            }
            match state.pending.pop_front() {
                Some(item) => item,
                None => {
                    state.is_playing = false;
                    state.consumer = None;
                    shared.playing.send_replace(false);
                    (shared.on_end)();
                    return;
                }
            }
        };

        // Waits out an item a cleared consumer is still playing
        let _playhead = shared.playhead.lock().await;
        if shared.state.lock().generation != generation {
            return;
        }

        let container = codec::wrap_pcm(&item.pcm);
        match shared.sink.decode(&container).await {
            Ok(audio) => {
                if let Err(err) = shared.sink.play(audio).await {
                    warn!(seq = item.seq, error = %err, "Audio chunk playback failed");
                }
            }
            Err(err) => {
                shared.decode_failures.fetch_add(1, Ordering::Relaxed);
                warn!(seq = item.seq, error = %err, "Skipping undecodable audio chunk");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::codec::pcm_to_bytes;
    use crate::test_support::RecordingSink;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn counter() -> (Arc<AtomicUsize>, PlaybackCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let hook = count.clone();
        (count, Arc::new(move || {
            hook.fetch_add(1, Ordering::SeqCst);
        }))
    }

    async fn drained(queue: &PlaybackQueue) {
        tokio::time::timeout(Duration::from_secs(5), queue.drained())
            .await
            .expect("queue did not drain");
    }

    #[tokio::test]
    async fn test_plays_in_enqueue_order_skipping_failures() {
        let sink = Arc::new(RecordingSink::with_delay(Duration::from_millis(5)));
        let a = vec![1i16, 1, 1, 1];
        let b = vec![2i16, 2, 2, 2];
        let c = vec![3i16, 3, 3, 3];
        sink.poison(pcm_to_bytes(&b));

        let (_, on_start) = counter();
        let (_, on_end) = counter();
        let queue = PlaybackQueue::new(sink.clone(), on_start, on_end);

        queue.enqueue(pcm_to_bytes(&a));
        queue.enqueue(pcm_to_bytes(&b));
        queue.enqueue(pcm_to_bytes(&c));
        drained(&queue).await;

        assert_eq!(sink.played(), vec![a, c]);
        assert_eq!(sink.max_concurrent(), 1);
        assert_eq!(queue.decode_failures(), 1);
    }

    #[tokio::test]
    async fn test_one_start_and_end_per_drain() {
        let sink = Arc::new(RecordingSink::with_delay(Duration::from_millis(5)));
        let (starts, on_start) = counter();
        let (ends, on_end) = counter();
        let queue = PlaybackQueue::new(sink.clone(), on_start, on_end);

        for value in 0..3i16 {
            queue.enqueue(pcm_to_bytes(&[value; 8]));
        }
        assert!(queue.is_playing());
        assert_eq!(starts.load(Ordering::SeqCst), 1);

        drained(&queue).await;
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(ends.load(Ordering::SeqCst), 1);
        assert_eq!(sink.played().len(), 3);

        // A second batch is a second drain
        queue.enqueue(pcm_to_bytes(&[9; 8]));
        drained(&queue).await;
        assert_eq!(starts.load(Ordering::SeqCst), 2);
        assert_eq!(ends.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_clear_discards_pending() {
        let sink = Arc::new(RecordingSink::with_delay(Duration::from_millis(50)));
        let (_, on_start) = counter();
        let (ends, on_end) = counter();
        let queue = PlaybackQueue::new(sink.clone(), on_start, on_end);

        queue.enqueue(pcm_to_bytes(&[1; 4]));
        queue.enqueue(pcm_to_bytes(&[2; 4]));
        queue.enqueue(pcm_to_bytes(&[3; 4]));

        // Let the first item start
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.clear();
        assert!(!queue.is_playing());
        assert_eq!(queue.pending(), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sink.played(), vec![vec![1; 4]]);
        assert_eq!(ends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_enqueue_after_clear_waits_for_in_flight_item() {
        let sink = Arc::new(RecordingSink::with_delay(Duration::from_millis(40)));
        let (_, on_start) = counter();
        let (_, on_end) = counter();
        let queue = PlaybackQueue::new(sink.clone(), on_start, on_end);

        queue.enqueue(pcm_to_bytes(&[1; 4]));
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.clear();
        queue.enqueue(pcm_to_bytes(&[2; 4]));
        drained(&queue).await;

        assert_eq!(sink.played(), vec![vec![1; 4], vec![2; 4]]);
        assert_eq!(sink.max_concurrent(), 1);
    }

    #[tokio::test]
    async fn test_interrupt_cuts_off_in_flight_item() {
        let sink = Arc::new(RecordingSink::with_delay(Duration::from_secs(10)));
        let (_, on_start) = counter();
        let (_, on_end) = counter();
        let queue = PlaybackQueue::new(sink.clone(), on_start, on_end);

        queue.enqueue(pcm_to_bytes(&[1; 4]));
        queue.enqueue(pcm_to_bytes(&[2; 4]));
        tokio::time::sleep(Duration::from_millis(10)).await;

        queue.interrupt();
        assert!(!queue.is_playing());
        assert_eq!(queue.pending(), 0);
        assert_eq!(sink.stops(), 1);

        // The aborted item no longer holds the playhead, so new audio starts at once
        queue.enqueue(pcm_to_bytes(&[3; 4]));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.played(), vec![vec![1; 4], vec![3; 4]]);
    }
}
