//! TTS streamer & barge-in controller.
//!
//! Runs as its own `tokio::spawn`ed task rather than inline in the
//! dispatcher loop so that `user.interrupt`/`call.end` frames keep being
//! processed by the owning task while frames are in flight -- the
//! dispatcher's `tokio::select!` loop and this task run concurrently, and
//! coordinate only through the three atomics already carried on `Session`
//! (`tts_epoch`, `interrupt_notified`, `call_ended`). The mandatory yield
//! between frame sends is `tokio::task::yield_now()`, the idiomatic
//! cooperative suspension point that keeps interrupt latency bounded to a
//! single frame.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::codec::{encode_pcm16_base64, ServerMessage};

const FRAME_SIZE: usize = 4096;
const SAMPLE_RATE: u32 = 16_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsOutcome {
    Completed,
    Interrupted,
}

/// Spawns the streaming task and returns a oneshot that resolves once the
/// stream has completed or been cancelled -- the owning task awaits this
/// before clearing `llmInFlight` and dispatching any `pendingTranscript`.
pub fn spawn_tts_streamer(
    pcm: Vec<u8>,
    my_epoch: u64,
    epoch: Arc<AtomicU64>,
    call_ended: Arc<AtomicBool>,
    interrupt_notified: Arc<AtomicBool>,
    outbound: mpsc::Sender<ServerMessage>,
) -> oneshot::Receiver<TtsOutcome> {
    let (done_tx, done_rx) = oneshot::channel();

    tokio::spawn(async move {
        if outbound.send(ServerMessage::AgentAudioStart).await.is_err() {
            let _ = done_tx.send(TtsOutcome::Interrupted);
            return;
        }

        let mut interrupted = false;
        for frame in pcm.chunks(FRAME_SIZE) {
            if call_ended.load(Ordering::SeqCst) || epoch.load(Ordering::SeqCst) != my_epoch {
                interrupted = true;
                break;
            }
            let payload = encode_pcm16_base64(frame);
            let chunk = ServerMessage::AgentAudioChunk {
                payload,
                format: "pcm16",
                sample_rate: SAMPLE_RATE,
            };
            if outbound.send(chunk).await.is_err() {
                interrupted = true;
                break;
            }
            // Mandatory yield: without it interrupt latency is unbounded.
            tokio::task::yield_now().await;
        }

        if interrupted {
            if interrupt_notified
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                let _ = outbound.send(ServerMessage::AgentInterrupt).await;
            }
            let _ = done_tx.send(TtsOutcome::Interrupted);
        } else {
            let _ = outbound.send(ServerMessage::AgentAudioEnd).await;
            let _ = done_tx.send(TtsOutcome::Completed);
        }
    });

    done_rx
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn completes_without_interruption_for_small_buffer() {
        let (tx, mut rx) = mpsc::channel(64);
        let epoch = Arc::new(AtomicU64::new(1));
        let call_ended = Arc::new(AtomicBool::new(false));
        let interrupt_notified = Arc::new(AtomicBool::new(false));

        let done = spawn_tts_streamer(vec![0u8; 10], 1, epoch, call_ended, interrupt_notified, tx);
        let outcome = done.await.unwrap();
        assert_eq!(outcome, TtsOutcome::Completed);

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let messages = drain(&mut rx).await;
        assert!(matches!(messages.first(), Some(ServerMessage::AgentAudioStart)));
        assert!(matches!(messages.last(), Some(ServerMessage::AgentAudioEnd)));
        assert!(!messages.iter().any(|m| matches!(m, ServerMessage::AgentInterrupt)));
    }

    #[tokio::test]
    async fn epoch_mismatch_halts_stream_and_notifies_once() {
        let (tx, mut rx) = mpsc::channel(64);
        let epoch = Arc::new(AtomicU64::new(2));
        let call_ended = Arc::new(AtomicBool::new(false));
        let interrupt_notified = Arc::new(AtomicBool::new(false));

        // my_epoch (1) != current epoch (2) from the very first check.
        let done = spawn_tts_streamer(vec![0u8; 20_000], 1, epoch, call_ended, interrupt_notified, tx);
        let outcome = done.await.unwrap();
        assert_eq!(outcome, TtsOutcome::Interrupted);

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let messages = drain(&mut rx).await;
        assert!(matches!(messages.first(), Some(ServerMessage::AgentAudioStart)));
        let interrupt_count =
            messages.iter().filter(|m| matches!(m, ServerMessage::AgentInterrupt)).count();
        assert_eq!(interrupt_count, 1);
        assert!(!messages.iter().any(|m| matches!(m, ServerMessage::AgentAudioEnd)));
    }
}
