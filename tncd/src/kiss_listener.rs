//! KISS TCP listener (§6 "KISS frame (to attached apps)"): the socket and
//! attach/detach lifecycle `tnc_core::kiss`'s own doc comment says belong
//! to the daemon. Every connected client receives every received frame,
//! tagged with its originating channel in the KISS type byte's high
//! nibble; a client sending a KISS data frame back has it decoded and
//! enqueued for transmit on the matching channel.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tnc_core::kiss::{self, KissCommand, KissDecoder};
use tnc_core::packet::Packet;
use tnc_core::processor::ClientSink;
use tnc_core::txqueue::{Priority, TxQueue};

/// Broadcasts every dispatched frame to all currently-attached KISS
/// clients. Registered with [`tnc_core::processor::Processor::add_client`].
pub struct KissBroadcaster {
    clients: Arc<Mutex<Vec<TcpStream>>>,
}

impl ClientSink for KissBroadcaster {
    fn deliver(&self, chan: u16, packet: &Packet) {
        let frame = kiss::encode_packet((chan & 0x0F) as u8, packet);
        let mut clients = self.clients.lock().unwrap();
        clients.retain_mut(|stream| stream.write_all(&frame).is_ok());
    }
}

/// Spawn the listener thread; returns the [`KissBroadcaster`] to register
/// with the processor. Inbound data frames are decoded and enqueued onto
/// `tx_queues` at [`Priority::Lo`] (an attached application is "the
/// operator", same priority class as a beacon), keyed by the KISS type
/// byte's channel nibble.
pub fn spawn(
    port: u16,
    tx_queues: HashMap<u16, Arc<TxQueue>>,
    shutdown: Arc<AtomicBool>,
) -> std::io::Result<KissBroadcaster> {
    let listener = TcpListener::bind(("0.0.0.0", port))?;
    listener.set_nonblocking(true)?;
    let clients: Arc<Mutex<Vec<TcpStream>>> = Arc::new(Mutex::new(Vec::new()));

    {
        let clients = clients.clone();
        let shutdown = shutdown.clone();
        std::thread::spawn(move || accept_loop(listener, clients, tx_queues, shutdown));
    }

    Ok(KissBroadcaster { clients })
}

fn accept_loop(
    listener: TcpListener,
    clients: Arc<Mutex<Vec<TcpStream>>>,
    tx_queues: HashMap<u16, Arc<TxQueue>>,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, _addr)) => {
                let _ = stream.set_nonblocking(true);
                if let Ok(rx_stream) = stream.try_clone() {
                    clients.lock().unwrap().push(stream);
                    let tx_queues = tx_queues.clone();
                    let shutdown = shutdown.clone();
                    std::thread::spawn(move || client_recv_loop(rx_stream, tx_queues, shutdown));
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(std::time::Duration::from_millis(100));
            }
            Err(_) => break,
        }
    }
}

/// Reads KISS frames from one attached client and enqueues decoded data
/// frames for transmit. Control frames (TXDELAY, PERSIST, ...) are
/// accepted but otherwise ignored: per-channel transmit parameters come
/// from the directive file, not the attached application (§6).
fn client_recv_loop(mut stream: TcpStream, tx_queues: HashMap<u16, Arc<TxQueue>>, shutdown: Arc<AtomicBool>) {
    let mut decoder = KissDecoder::new();
    let mut buf = [0u8; 1024];
    while !shutdown.load(Ordering::Relaxed) {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                for frame in decoder.feed(&buf[..n]) {
                    if frame.command != KissCommand::Data {
                        continue;
                    }
                    if let Ok(packet) = kiss::decode_packet(&frame) {
                        if let Some(queue) = tx_queues.get(&(frame.chan as u16)) {
                            queue.enqueue(packet, Priority::Lo);
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(std::time::Duration::from_millis(50));
            }
            Err(_) => break,
        }
    }
}
