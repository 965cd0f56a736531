//! Per-channel receive thread: pulls samples from an `AudioSource`, runs
//! them through the channel's demodulator bank, and hands completed
//! frames to the packet processor via the DLQ.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tnc_core::demod::{BitSink, ModemBank};
use tnc_core::dlq::{DlqEntry, DlqSender};
use tnc_core::hdlc::receiver::{FixBitsMode, HdlcReceiver};
use tnc_core::logging::TncLogger;

use tnc_core::audio::AudioSource;

/// Fans `hdlc_rx_bit` callbacks for every (subchan, slicer) pair of one
/// channel's modem bank out to its own `HdlcReceiver`, so concurrent
/// sub-decoders never tread on each other's bit-stream state.
struct ChannelBitSink<'a> {
    chan: u16,
    fix_bits: FixBitsMode,
    receivers: HashMap<(u8, u8), HdlcReceiver>,
    dlq: &'a DlqSender,
    logger: &'a mut TncLogger,
}

impl<'a> BitSink for ChannelBitSink<'a> {
    fn hdlc_rx_bit(&mut self, chan: u16, subchan: u8, slicer: u8, bit: u8, _raw_bit: u8, _lfsr_state: u32) {
        let fix_bits = self.fix_bits;
        let receiver = self
            .receivers
            .entry((subchan, slicer))
            .or_insert_with(|| HdlcReceiver::new(fix_bits));

        if let Some(frame) = receiver.process_bit(bit, self.logger) {
            self.dlq.send(DlqEntry {
                chan,
                subchan,
                slicer,
                packet: frame.packet,
                audio_level: 0,
                retries: frame.retries,
                spectrum: String::new(),
            });
        }
    }
}

/// Run the receive loop for one channel until `shutdown` is set. Reads
/// fixed-size blocks so a dead/disconnected source (`read` returning 0)
/// is distinguishable from merely slow audio.
pub fn run(
    chan: u16,
    mut source: Box<dyn AudioSource>,
    mut bank: ModemBank,
    fix_bits: FixBitsMode,
    dlq: DlqSender,
    logger: Arc<Mutex<TncLogger>>,
    shutdown: Arc<AtomicBool>,
) {
    let mut buf = [0i16; 256];
    let mut receivers: HashMap<(u8, u8), HdlcReceiver> = HashMap::new();

    while !shutdown.load(Ordering::Relaxed) {
        let n = source.read(&mut buf);
        if n == 0 {
            break;
        }

        let mut logger = logger.lock().unwrap();
        let mut sink = ChannelBitSink {
            chan,
            fix_bits,
            receivers: std::mem::take(&mut receivers),
            dlq: &dlq,
            logger: &mut *logger,
        };

        for &sample in &buf[..n] {
            bank.process_sample(sample, &mut sink);
        }

        receivers = sink.receivers;
    }
}
