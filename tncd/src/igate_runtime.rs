//! IGate connection, recv, and SATgate runtime (§4.5, §5).
//!
//! `tnc_core::igate` supplies the protocol logic — dedup/rate gates, the
//! RX→IS and IS→RF transforms, the SATgate delay queue — but deliberately
//! stops short of owning a socket that multiple threads write to (see its
//! `run_connection_loop` doc comment). This module is the daemon-side
//! plumbing that doc comment points at: a shared write half behind a
//! mutex (§5 "Shared resources" — "a mutex serializes write() calls"), a
//! dedicated thread that owns the read half for its blocked lifetime, and
//! a poller for the SATgate delay queue.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::thread_rng;

use tnc_core::address::Address;
use tnc_core::config::IgateConfig;
use tnc_core::igate::{login_line, resolve_shuffled, IgateClient};
use tnc_core::packet::Packet;
use tnc_core::processor::IgateRxSink;
use tnc_core::txqueue::{Priority, TxQueue};

use crate::logging::{ConnectionState as LogConnState, IgateConnectionEvent, LogEvent, StructuredLogger};

const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);
const LOGIN_WAIT: Duration = Duration::from_secs(7);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const POLL_TIMEOUT: Duration = Duration::from_secs(1);

type SharedWriter = Arc<Mutex<Option<TcpStream>>>;

fn write_line(writer: &SharedWriter, line: &str) -> bool {
    let mut guard = writer.lock().unwrap();
    let Some(stream) = guard.as_mut() else { return false };
    let mut bytes = line.as_bytes().to_vec();
    if !line.ends_with('\n') {
        bytes.push(b'\n');
    }
    if stream.write_all(&bytes).is_ok() {
        return true;
    }
    *guard = None;
    false
}

/// The IGate RX→IS sink the packet processor dispatches received RF
/// frames to (§4.3 step 3). Locks the shared [`IgateClient`] to run the
/// dedup/SATgate/filter gate, then writes the resulting TNC2 line through
/// the shared socket mutex.
pub struct IgateHandle {
    client: Arc<Mutex<IgateClient>>,
    writer: SharedWriter,
    login_ok: Arc<AtomicBool>,
}

impl IgateRxSink for IgateHandle {
    fn receive_from_rf(&self, chan: u16, packet: &Packet) {
        let ok = self.login_ok.load(Ordering::Relaxed);
        let line = self.client.lock().unwrap().rx_to_is(packet, chan, ok, Instant::now());
        if let Some(line) = line {
            write_line(&self.writer, &line);
        }
    }

    fn note_digipeated(&self, chan: u16, packet: &Packet) {
        self.client.lock().unwrap().note_digipeated(chan, packet);
    }
}

fn log_connection(logger: &Arc<Mutex<StructuredLogger>>, server: &str, state: LogConnState, detail: Option<String>) {
    let _ = logger.lock().unwrap().log(LogEvent::IgateConnection(IgateConnectionEvent {
        timestamp: chrono::Utc::now(),
        server: server.to_string(),
        state,
        detail,
    }));
}

/// Spawn the connect/login/heartbeat/recv thread and the SATgate poller
/// thread (§5 lists these as two of the daemon's threads), and return the
/// [`IgateHandle`] the processor should route RF→IS traffic to. IS→RF
/// traffic lands on `tx_queue` at [`Priority::Lo`] (§4.6 "LO for beacon /
/// IGate"), since `config.tx_chan` is fixed per gateway.
pub fn spawn(
    config: IgateConfig,
    mycall: Address,
    tx_queue: Arc<TxQueue>,
    shutdown: Arc<AtomicBool>,
    logger: Arc<Mutex<StructuredLogger>>,
) -> color_eyre::eyre::Result<IgateHandle> {
    let client = Arc::new(Mutex::new(
        IgateClient::new(config.clone(), mycall)
            .map_err(|e| color_eyre::eyre::eyre!("invalid IGate configuration: {e}"))?,
    ));
    let writer: SharedWriter = Arc::new(Mutex::new(None));
    let login_ok = Arc::new(AtomicBool::new(false));

    {
        let client = client.clone();
        let writer = writer.clone();
        let login_ok = login_ok.clone();
        let shutdown = shutdown.clone();
        let logger = logger.clone();
        let config = config.clone();
        std::thread::spawn(move || {
            connection_loop(config, client, writer, login_ok, tx_queue, shutdown, logger);
        });
    }

    {
        let client = client.clone();
        let writer = writer.clone();
        let shutdown = shutdown.clone();
        std::thread::spawn(move || satgate_loop(client, writer, shutdown));
    }

    Ok(IgateHandle { client, writer, login_ok })
}

/// One connect→login→(heartbeat+recv)→disconnect cycle, repeated forever
/// with a constant 5s back-off between attempts (§4.5 "Connection life
/// cycle": "No exponential back-off is required").
fn connection_loop(
    config: IgateConfig,
    client: Arc<Mutex<IgateClient>>,
    writer: SharedWriter,
    login_ok: Arc<AtomicBool>,
    tx_queue: Arc<TxQueue>,
    shutdown: Arc<AtomicBool>,
    logger: Arc<Mutex<StructuredLogger>>,
) {
    let mut rng = thread_rng();
    while !shutdown.load(Ordering::Relaxed) {
        login_ok.store(false, Ordering::Relaxed);
        log_connection(&logger, &config.server, LogConnState::Connecting, None);

        let addrs = match resolve_shuffled(&config.server, config.port, &mut rng) {
            Ok(a) if !a.is_empty() => a,
            _ => {
                log_connection(&logger, &config.server, LogConnState::Disconnected, Some("DNS lookup failed".into()));
                std::thread::sleep(RECONNECT_BACKOFF);
                continue;
            }
        };

        let mut connected = None;
        for addr in addrs {
            if let Ok(stream) = TcpStream::connect(addr) {
                let _ = stream.set_nodelay(true);
                connected = Some(stream);
                break;
            }
        }
        let Some(stream) = connected else {
            log_connection(&logger, &config.server, LogConnState::Disconnected, Some("connect failed on every address".into()));
            std::thread::sleep(RECONNECT_BACKOFF);
            continue;
        };

        let reader_stream = match stream.try_clone().and_then(|s| {
            s.set_read_timeout(Some(POLL_TIMEOUT))?;
            Ok(s)
        }) {
            Ok(s) => s,
            Err(_) => {
                std::thread::sleep(RECONNECT_BACKOFF);
                continue;
            }
        };
        *writer.lock().unwrap() = Some(stream);
        log_connection(&logger, &config.server, LogConnState::Connected, None);

        if !write_line(&writer, &login_line(&config)) {
            log_connection(&logger, &config.server, LogConnState::Disconnected, Some("login write failed".into()));
            std::thread::sleep(RECONNECT_BACKOFF);
            continue;
        }
        log_connection(&logger, &config.server, LogConnState::LoginSent, None);

        let connected_at = Instant::now();
        let mut last_heartbeat = connected_at;
        let mut reader = BufReader::new(reader_stream);
        let mut line_buf = String::new();

        loop {
            if shutdown.load(Ordering::Relaxed) {
                return;
            }
            if !login_ok.load(Ordering::Relaxed) && connected_at.elapsed() >= LOGIN_WAIT {
                login_ok.store(true, Ordering::Relaxed);
            }

            match reader.read_line(&mut line_buf) {
                Ok(0) => break,
                Ok(_) if line_buf.ends_with('\n') => {
                    let line = line_buf.trim_end_matches(['\r', '\n']).to_string();
                    line_buf.clear();
                    if line.starts_with('#') {
                        if !login_ok.load(Ordering::Relaxed) {
                            let _ = logger.lock().unwrap().log(LogEvent::Info {
                                message: format!("igate: {line}"),
                            });
                        }
                        continue;
                    }
                    let entry = client
                        .lock()
                        .unwrap()
                        .is_to_rf(&line, login_ok.load(Ordering::Relaxed), Instant::now());
                    if let Some((_chan, packet)) = entry {
                        tx_queue.enqueue(packet, Priority::Lo);
                    }
                }
                // A read may return without a trailing newline only when
                // the poll timeout elapsed mid-line; `line_buf` keeps
                // whatever was read so far and the next call resumes it.
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(_) => break,
            }

            if last_heartbeat.elapsed() >= HEARTBEAT_INTERVAL {
                if !write_line(&writer, "#\n") {
                    break;
                }
                last_heartbeat = Instant::now();
            }
        }

        *writer.lock().unwrap() = None;
        login_ok.store(false, Ordering::Relaxed);
        log_connection(&logger, &config.server, LogConnState::Disconnected, None);
        std::thread::sleep(RECONNECT_BACKOFF);
    }
}

/// Polls the SATgate delay queue once a second (§4.5 "SATgate delay
/// thread") and writes every released entry's RX→IS line.
fn satgate_loop(client: Arc<Mutex<IgateClient>>, writer: SharedWriter, shutdown: Arc<AtomicBool>) {
    while !shutdown.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_secs(1));
        let lines = client.lock().unwrap().drain_satgate(Instant::now());
        for line in lines {
            write_line(&writer, &line);
        }
    }
}
