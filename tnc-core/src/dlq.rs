//! Receive queue (DLQ): the thread-safe hand-off between the per-channel
//! demodulator threads and the single packet-processor thread (§3
//! "Receive queue (DLQ)", §5 "One packet-processor thread (blocks on DLQ
//! empty condition)").
//!
//! Built on `crossbeam::channel` rather than a hand-rolled mutex+condvar:
//! an MPSC channel *is* the mutex-protected FIFO queue with a built-in
//! "wait until non-empty" block, which is exactly the contract spec.md
//! asks for.

use crossbeam::channel::{Receiver, Sender};

use crate::packet::Packet;

/// One accepted frame plus the metadata the DLQ records alongside it
/// (§4.2 "Output").
#[derive(Debug, Clone)]
pub struct DlqEntry {
    pub chan: u16,
    pub subchan: u8,
    pub slicer: u8,
    pub packet: Packet,
    /// Demodulated signal level, roughly 0..100, for diagnostics.
    pub audio_level: u8,
    /// Number of bit flips FIX_BITS needed to validate this frame.
    pub retries: u32,
    /// Human-readable summary of which sub-decoders were running, e.g.
    /// `"1200:0,1200:+50"` — purely informational.
    pub spectrum: String,
}

/// Producer handle, cloned once per demodulator thread.
#[derive(Clone)]
pub struct DlqSender {
    tx: Sender<DlqEntry>,
}

impl DlqSender {
    pub fn send(&self, entry: DlqEntry) {
        // The DLQ is unbounded (spec.md §7: "queues are unbounded; memory
        // pressure is the implicit limit"), so this can only fail if
        // every receiver has been dropped, i.e. the processor thread has
        // already shut down — nothing useful to do but drop the frame.
        let _ = self.tx.send(entry);
    }
}

/// Consumer handle, owned by the single packet-processor thread.
pub struct DlqReceiver {
    rx: Receiver<DlqEntry>,
}

impl DlqReceiver {
    /// Block until a frame is available.
    pub fn recv(&self) -> Option<DlqEntry> {
        self.rx.recv().ok()
    }

    /// Non-blocking poll, for processors that need to interleave DLQ
    /// draining with other work.
    pub fn try_recv(&self) -> Option<DlqEntry> {
        self.rx.try_recv().ok()
    }
}

/// Construct a fresh DLQ pair. Every demodulator thread gets a clone of
/// the sender; the processor thread owns the single receiver.
pub fn channel() -> (DlqSender, DlqReceiver) {
    let (tx, rx) = crossbeam::channel::unbounded();
    (DlqSender { tx }, DlqReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> DlqEntry {
        DlqEntry {
            chan: 0,
            subchan: 0,
            slicer: 0,
            packet: Packet::new_ui("W1ABC".parse().unwrap(), "APRS".parse().unwrap(), b"test".to_vec()),
            audio_level: 80,
            retries: 0,
            spectrum: "1200:0".to_string(),
        }
    }

    #[test]
    fn fifo_ordering_preserved() {
        let (tx, rx) = channel();
        for i in 0..5u8 {
            let mut e = sample_entry();
            e.audio_level = i * 10;
            tx.send(e);
        }
        for i in 0..5u8 {
            assert_eq!(rx.recv().unwrap().audio_level, i * 10);
        }
    }

    #[test]
    fn multiple_senders_interleave_without_loss() {
        let (tx, rx) = channel();
        let tx2 = tx.clone();
        std::thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..50 {
                    tx.send(sample_entry());
                }
            });
            scope.spawn(|| {
                for _ in 0..50 {
                    tx2.send(sample_entry());
                }
            });
        });
        let mut count = 0;
        while rx.try_recv().is_some() {
            count += 1;
        }
        assert_eq!(count, 100);
    }
}
