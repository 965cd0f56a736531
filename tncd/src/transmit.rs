//! Per-channel transmit thread (§4.6): dequeue, defer to a clear channel,
//! key PTT, frame and modulate the packet, play it out, then unkey.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tnc_core::audio::AudioSink;
use tnc_core::config::{ChannelConfig, ModemKind, PttConfig};
use tnc_core::hdlc::transmitter::HdlcTransmitter;
use tnc_core::modulate::{AfskModulator, Baseband9600Modulator};
use tnc_core::ptt::{NullPtt, Ptt};
use tnc_core::txqueue::{wait_for_clear_channel, CsmaConfig, CsmaState, TxQueue};

enum Modulator {
    Afsk(AfskModulator),
    Baseband9600(Baseband9600Modulator),
}

impl Modulator {
    fn new(modem: ModemKind, sample_rate: u32) -> Self {
        match modem {
            ModemKind::Afsk1200 => Modulator::Afsk(AfskModulator::new(sample_rate, 1200, 1200.0, 2200.0)),
            ModemKind::Afsk300 => Modulator::Afsk(AfskModulator::new(sample_rate, 300, 1600.0, 1800.0)),
            ModemKind::Baseband9600 => Modulator::Baseband9600(Baseband9600Modulator::new(sample_rate)),
        }
    }

    fn baud_rate(modem: ModemKind) -> u32 {
        match modem {
            ModemKind::Afsk1200 => 1200,
            ModemKind::Afsk300 => 300,
            ModemKind::Baseband9600 => 9600,
        }
    }

    fn render(&mut self, levels: &[bool]) -> Vec<i16> {
        match self {
            Modulator::Afsk(m) => m.render(levels),
            Modulator::Baseband9600(m) => m.render(levels),
        }
    }
}

/// Run the transmit loop for one channel until the queue is closed or
/// `shutdown` is set. `ptt` defaults to [`NullPtt`] — real line control is
/// host-specific and out of scope; this is the reference no-op backend,
/// matching the stand-in philosophy of `audio_backend`.
pub fn run(
    channel: ChannelConfig,
    ptt_config: PttConfig,
    queue: Arc<TxQueue>,
    mut sink: Box<dyn AudioSink>,
    sample_rate: u32,
    shutdown: Arc<AtomicBool>,
) {
    let baud_rate = Modulator::baud_rate(channel.modem.kind);
    let mut modulator = Modulator::new(channel.modem.kind, sample_rate);
    let mut ptt = Ptt::new(ptt_config.clone(), NullPtt);
    let mut csma = CsmaState::new(CsmaConfig {
        dwait_ms: ptt_config.dwait_ms,
        slottime_ms: ptt_config.slottime_ms,
        persist: ptt_config.persist,
    });

    while !shutdown.load(Ordering::Relaxed) {
        let packet = match queue.dequeue_blocking() {
            Some(p) => p,
            None => break,
        };

        wait_for_clear_channel(&mut csma);

        let txdelay_flags = HdlcTransmitter::flags_for_delay_ms(ptt_config.txdelay_ms, baud_rate);
        let txtail_flags = HdlcTransmitter::flags_for_delay_ms(ptt_config.txtail_ms, baud_rate);
        let levels = HdlcTransmitter::frame_bits(&packet, txdelay_flags, txtail_flags);
        let samples = modulator.render(&levels);

        ptt.key_up();
        sink.write(&samples);
        sink.drain();
        ptt.key_down();
    }
}
