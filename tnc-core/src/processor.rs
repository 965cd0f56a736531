//! Packet processor (§4.3): the single dedicated consumer that drains the
//! DLQ and dispatches each frame to attached clients, the digipeater, and
//! the IGate RX path.

use crate::address::Address;
use crate::digipeat::Digipeater;
use crate::dlq::{DlqEntry, DlqReceiver};
use crate::logging::TncLogger;
use crate::packet::Packet;
use crate::txqueue::{Priority, TxQueue};

/// An attached client application (KISS or AGW listener) that wants every
/// received frame, tagged with its channel. The transport itself (TCP or
/// serial) lives outside `tnc-core`; this is just the delivery hook.
pub trait ClientSink: Send {
    fn deliver(&self, chan: u16, packet: &Packet);
}

/// The IGate RX→IS path, expressed as a trait so `processor` doesn't need
/// a hard dependency on socket types — [`crate::igate::IgateClient`]
/// implements this.
pub trait IgateRxSink: Send {
    fn receive_from_rf(&self, chan: u16, packet: &Packet);

    /// Notify that a packet was just digipeated onto `chan`, so the
    /// implementation can register it in its own IS→TX dedupe cache
    /// (§4.4 "insert... also into the IS→TX cache (marked 'by-digi')")
    /// and avoid re-sending what the digipeater just put on the air.
    /// Default no-op: most sinks (test doubles, non-IGate clients) don't
    /// care about this.
    fn note_digipeated(&self, _chan: u16, _packet: &Packet) {}
}

/// The APRStt (DTMF) subsystem hand-off. Full touch-tone decoding is out
/// of scope (§1); this only exists so a synthetic touch-tone packet can
/// be routed onward per §4.3 step 4.
pub trait TouchToneSink: Send {
    fn deliver_touch_tone(&self, chan: u16, packet: &Packet);
}

/// One (from_chan, to_chan) IGate RX-path routing per §4.3 step 3 — a
/// channel's received frames may be gated to more than one IGate client
/// (e.g. multiple APRS-IS server connections), mirroring the digipeater's
/// own per-pair configuration.
struct IgateRoute {
    from_chan: u16,
    sink: Box<dyn IgateRxSink>,
}

/// Which channels have touch-tone decoding enabled, per §4.3 step 4.
struct TouchToneRoute {
    chan: u16,
    sink: Box<dyn TouchToneSink>,
}

/// Owns the DLQ receiver and every downstream subsystem the processor
/// fans a frame out to. Constructed once at startup and run on its own
/// thread via [`Processor::run`].
pub struct Processor {
    dlq: DlqReceiver,
    mycall_by_chan: Vec<(u16, Address)>,
    digipeater: Digipeater,
    tx_queues: Vec<(u16, std::sync::Arc<TxQueue>)>,
    clients: Vec<Box<dyn ClientSink>>,
    igate_routes: Vec<IgateRoute>,
    touch_tone_routes: Vec<TouchToneRoute>,
    logger: TncLogger,
}

impl Processor {
    pub fn new(dlq: DlqReceiver, digipeater: Digipeater, logger: TncLogger) -> Self {
        Self {
            dlq,
            mycall_by_chan: Vec::new(),
            digipeater,
            tx_queues: Vec::new(),
            clients: Vec::new(),
            igate_routes: Vec::new(),
            touch_tone_routes: Vec::new(),
            logger,
        }
    }

    pub fn set_mycall(&mut self, chan: u16, call: Address) {
        self.mycall_by_chan.retain(|(c, _)| *c != chan);
        self.mycall_by_chan.push((chan, call));
    }

    pub fn add_tx_queue(&mut self, chan: u16, queue: std::sync::Arc<TxQueue>) {
        self.tx_queues.push((chan, queue));
    }

    pub fn add_client(&mut self, client: Box<dyn ClientSink>) {
        self.clients.push(client);
    }

    pub fn add_igate_route(&mut self, from_chan: u16, sink: Box<dyn IgateRxSink>) {
        self.igate_routes.push(IgateRoute { from_chan, sink });
    }

    pub fn add_touch_tone_route(&mut self, chan: u16, sink: Box<dyn TouchToneSink>) {
        self.touch_tone_routes.push(TouchToneRoute { chan, sink });
    }

    fn mycall_for(&self, chan: u16) -> Option<&Address> {
        self.mycall_by_chan.iter().find(|(c, _)| *c == chan).map(|(_, a)| a)
    }

    fn tx_queue_for(&self, chan: u16) -> Option<&std::sync::Arc<TxQueue>> {
        self.tx_queues.iter().find(|(c, _)| *c == chan).map(|(_, q)| q)
    }

    /// Dispatch one DLQ entry per the four steps of §4.3.
    pub fn dispatch(&mut self, entry: DlqEntry, is_touch_tone: bool) {
        let DlqEntry { chan, packet, .. } = entry;

        // Step 1: deliver to every attached client unaltered.
        for client in &self.clients {
            client.deliver(chan, &packet);
        }

        // Step 2: digipeater, for each from_chan == chan rule.
        if let Some(mycall) = self.mycall_for(chan).cloned() {
            let outbound = self.digipeater.process_received(&packet, chan, &mycall, &mut self.logger);
            for (to_chan, out_packet) in outbound {
                for route in &self.igate_routes {
                    route.sink.note_digipeated(to_chan, &out_packet);
                }
                if let Some(queue) = self.tx_queue_for(to_chan) {
                    queue.enqueue(out_packet, Priority::Hi);
                } else {
                    self.logger.warn("DIGI", format!("no tx queue configured for chan {to_chan}"));
                }
            }
        }

        // Step 3: IGate RX path, for each configured (chan -> IG) pair.
        for route in self.igate_routes.iter().filter(|r| r.from_chan == chan) {
            route.sink.receive_from_rf(chan, &packet);
        }

        // Step 4: touch-tone hand-off, only for synthetic DTMF packets on
        // a channel with touch-tone decoding enabled.
        if is_touch_tone {
            for route in self.touch_tone_routes.iter().filter(|r| r.chan == chan) {
                route.sink.deliver_touch_tone(chan, &packet);
            }
        }
    }

    /// Run forever, draining the DLQ. Returns when the DLQ's senders have
    /// all been dropped (shutdown).
    pub fn run(&mut self) {
        while let Some(entry) = self.dlq.recv() {
            self.dispatch(entry, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DigipeatRule;
    use crate::digipeat::CompiledRule;
    use crate::dlq::{self, DlqEntry};
    use std::sync::{Arc, Mutex};

    fn sample_packet() -> Packet {
        Packet::new_ui(
            "W1ABC".parse().unwrap(),
            "APRS".parse().unwrap(),
            b"!4237.14N/07120.83W-test".to_vec(),
        )
        .with_repeaters(vec!["WIDE2-2".parse().unwrap()])
        .unwrap()
    }

    fn entry_for(packet: Packet, chan: u16) -> DlqEntry {
        DlqEntry {
            chan,
            subchan: 0,
            slicer: 0,
            packet,
            audio_level: 80,
            retries: 0,
            spectrum: String::new(),
        }
    }

    struct RecordingClient {
        seen: Arc<Mutex<Vec<(u16, Packet)>>>,
    }
    impl ClientSink for RecordingClient {
        fn deliver(&self, chan: u16, packet: &Packet) {
            self.seen.lock().unwrap().push((chan, packet.clone()));
        }
    }

    struct RecordingIgate {
        seen: Arc<Mutex<Vec<Packet>>>,
        digipeated: Arc<Mutex<Vec<(u16, Packet)>>>,
    }
    impl IgateRxSink for RecordingIgate {
        fn receive_from_rf(&self, _chan: u16, packet: &Packet) {
            self.seen.lock().unwrap().push(packet.clone());
        }

        fn note_digipeated(&self, chan: u16, packet: &Packet) {
            self.digipeated.lock().unwrap().push((chan, packet.clone()));
        }
    }

    #[test]
    fn dispatch_fans_out_to_clients_digipeater_and_igate() {
        let (_tx, rx) = dlq::channel();
        let rule = CompiledRule::compile(&DigipeatRule {
            from_chan: 0,
            to_chan: 0,
            ..Default::default()
        })
        .unwrap();
        let digipeater = Digipeater::new(vec![rule], 25, 30);
        let mut processor = Processor::new(rx, digipeater, TncLogger::default());

        processor.set_mycall(0, Address::new("MYCALL", 0).unwrap());
        let txq = Arc::new(TxQueue::new());
        processor.add_tx_queue(0, txq.clone());

        let client_seen = Arc::new(Mutex::new(Vec::new()));
        processor.add_client(Box::new(RecordingClient { seen: client_seen.clone() }));

        let igate_seen = Arc::new(Mutex::new(Vec::new()));
        let igate_digipeated = Arc::new(Mutex::new(Vec::new()));
        processor.add_igate_route(
            0,
            Box::new(RecordingIgate {
                seen: igate_seen.clone(),
                digipeated: igate_digipeated.clone(),
            }),
        );

        processor.dispatch(entry_for(sample_packet(), 0), false);

        assert_eq!(client_seen.lock().unwrap().len(), 1);
        assert_eq!(igate_seen.lock().unwrap().len(), 1);
        assert_eq!(txq.len(), 1);

        // The digipeated output must also be offered to every IGate route
        // so it can register the packet in its IS→TX cache (§4.4) before
        // the packet is dequeued for transmission.
        let notified = igate_digipeated.lock().unwrap();
        assert_eq!(notified.len(), 1);
        assert_eq!(notified[0].0, 0);
        assert_eq!(notified[0].1.to_tnc2(), "W1ABC>APRS,MYCALL*,WIDE2-1:!4237.14N/07120.83W-test");
        drop(notified);

        let digipeated = txq.dequeue_blocking().unwrap();
        assert_eq!(digipeated.to_tnc2(), "W1ABC>APRS,MYCALL*,WIDE2-1:!4237.14N/07120.83W-test");
    }

    #[test]
    fn unconfigured_channel_skips_digipeat_without_panicking() {
        let (_tx, rx) = dlq::channel();
        let digipeater = Digipeater::new(vec![], 25, 30);
        let mut processor = Processor::new(rx, digipeater, TncLogger::default());
        processor.dispatch(entry_for(sample_packet(), 3), false);
    }
}
