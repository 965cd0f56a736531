//! tncd: the software TNC daemon. Loads a directive file, brings up one
//! receive/transmit thread pair per configured channel, and wires the
//! packet processor, digipeater, IGate runtime, beacon scheduler, and
//! (optionally) a KISS listener around them.

mod audio_backend;
mod config;
mod igate_runtime;
mod kiss_listener;
mod logging;
mod receive;
mod transmit;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use clap::Parser as ClapParser;
use color_eyre::eyre::{Context, Result};

use tnc_core::beacon::{BeaconScheduler, NullGpsSource};
use tnc_core::config::BeaconDestination;
use tnc_core::demod::ModemBank;
use tnc_core::digipeat::{CompiledRule, Digipeater};
use tnc_core::dlq;
use tnc_core::logging::TncLogger;
use tnc_core::processor::{IgateRxSink, Processor};
use tnc_core::txqueue::{Priority, TxQueue};
use tnc_core::{Address, Packet};

use config::RuntimeConfig;
use igate_runtime::IgateHandle;
use logging::{LogEvent, StructuredLogger};

#[derive(ClapParser, Debug)]
#[command(name = "tncd", about = "Software TNC for amateur packet radio")]
struct Cli {
    /// Path to the directive config file.
    config: String,

    /// Verbose (debug-level) logging, overriding the config file's LOGLEVEL directive.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let (mut runtime, warnings) =
        RuntimeConfig::load(&cli.config).wrap_err_with(|| format!("reading config file {}", cli.config))?;
    if cli.verbose {
        runtime.logging.level = config::LogLevel::Debug;
    }

    let mut logger = StructuredLogger::new(runtime.logging.clone())?;
    for w in &warnings {
        logger.log(LogEvent::Warn { message: w.to_string() })?;
    }
    let logger = Arc::new(Mutex::new(logger));

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || shutdown.store(true, Ordering::Relaxed))
            .wrap_err("installing Ctrl-C handler")?;
    }

    let devices: HashMap<u16, config::AudioDeviceDirective> =
        runtime.audio_devices.iter().cloned().map(|d| (d.id, d)).collect();

    let (dlq_sender, dlq_receiver) = dlq::channel();
    let core_log_config = runtime.logging.to_core_log_config();

    let mut tx_queues: HashMap<u16, Arc<TxQueue>> = HashMap::new();
    let mut channel_mycalls: Vec<(u16, Address)> = Vec::new();

    for ch in &runtime.channels {
        let Some(device) = devices.get(&ch.adevice) else {
            logger.lock().unwrap().log(LogEvent::Warn {
                message: format!("channel {} references undeclared adevice {}", ch.channel.chan, ch.adevice),
            })?;
            continue;
        };
        let sample_rate = device.audio.sample_rate;

        let source = audio_backend::build_source(&device.kind, sample_rate)
            .wrap_err_with(|| format!("opening audio source for adevice {}", ch.adevice))?;
        let sink = audio_backend::build_sink(&device.kind, sample_rate)
            .wrap_err_with(|| format!("opening audio sink for adevice {}", ch.adevice))?;

        let queue = Arc::new(TxQueue::new());
        tx_queues.insert(ch.channel.chan, queue.clone());

        let mycall: Address = ch
            .channel
            .mycall
            .parse()
            .wrap_err_with(|| format!("invalid MYCALL {:?} on channel {}", ch.channel.mycall, ch.channel.chan))?;
        channel_mycalls.push((ch.channel.chan, mycall));

        let bank = ModemBank::new(ch.channel.chan, &ch.channel.modem, sample_rate);
        let rx_logger = Arc::new(Mutex::new(TncLogger::new(core_log_config.clone())));
        let rx_dlq = dlq_sender.clone();
        let chan = ch.channel.chan;
        let fix_bits = ch.channel.fix_bits;
        let rx_shutdown = shutdown.clone();
        std::thread::spawn(move || {
            receive::run(chan, source, bank, fix_bits, rx_dlq, rx_logger, rx_shutdown);
        });

        let ptt_config = ch.channel.ptt.clone();
        let channel_config = ch.channel.clone();
        let tx_shutdown = shutdown.clone();
        std::thread::spawn(move || {
            transmit::run(channel_config, ptt_config, queue, sink, sample_rate, tx_shutdown);
        });
    }

    let compiled_rules: Vec<CompiledRule> = runtime
        .digipeat_rules
        .iter()
        .filter_map(|rule| match CompiledRule::compile(rule) {
            Ok(c) => Some(c),
            Err(e) => {
                let _ = logger.lock().unwrap().log(LogEvent::Warn {
                    message: format!("skipping digipeat rule {}->{}: {e}", rule.from_chan, rule.to_chan),
                });
                None
            }
        })
        .collect();
    let digipeater = Digipeater::new(
        compiled_rules,
        runtime.dedupe.digipeat_capacity,
        runtime.dedupe.digipeat_window_secs,
    );

    let mut processor = Processor::new(dlq_receiver, digipeater, TncLogger::new(core_log_config.clone()));
    for (chan, call) in &channel_mycalls {
        processor.set_mycall(*chan, call.clone());
    }
    for (chan, queue) in &tx_queues {
        processor.add_tx_queue(*chan, queue.clone());
    }

    let igate_handle = match runtime.igate.clone() {
        Some(igate_config) => start_igate(igate_config, &channel_mycalls, &tx_queues, &shutdown, &logger, &mut processor)?,
        None => None,
    };

    if let Some(port) = runtime.kiss_listen_port {
        match kiss_listener::spawn(port, tx_queues.clone(), shutdown.clone()) {
            Ok(broadcaster) => processor.add_client(Box::new(broadcaster)),
            Err(e) => logger.lock().unwrap().log(LogEvent::Warn {
                message: format!("failed to start KISS listener on port {port}: {e}"),
            })?,
        }
    }

    if !runtime.beacons.is_empty() {
        if let Some((_, mycall)) = channel_mycalls.first().cloned() {
            let beacon_tx_queues = tx_queues.clone();
            let beacon_igate = igate_handle;
            let beacon_shutdown = shutdown.clone();
            let beacons = runtime.beacons.clone();
            let smartbeacon = runtime.smartbeacon.clone();
            let beacon_dlq = dlq_sender.clone();
            std::thread::spawn(move || {
                beacon_thread(
                    beacons,
                    smartbeacon,
                    mycall,
                    beacon_tx_queues,
                    beacon_igate,
                    beacon_dlq,
                    beacon_shutdown,
                );
            });
        } else {
            logger.lock().unwrap().log(LogEvent::Warn {
                message: "beacons configured but no channel declares a MYCALL; skipping".to_string(),
            })?;
        }
    }

    // The processor owns the DLQ receiver and runs on the main thread,
    // draining it until every sender is dropped (process exit). A
    // lightweight poller triggers the actual exit once Ctrl-C fires,
    // since the per-channel receive threads otherwise only drop their
    // senders when their audio source disconnects.
    {
        let poll_shutdown = shutdown.clone();
        std::thread::spawn(move || {
            while !poll_shutdown.load(Ordering::Relaxed) {
                std::thread::sleep(std::time::Duration::from_millis(200));
            }
            std::process::exit(0);
        });
    }
    processor.run();
    Ok(())
}

fn start_igate(
    igate_config: tnc_core::config::IgateConfig,
    channel_mycalls: &[(u16, Address)],
    tx_queues: &HashMap<u16, Arc<TxQueue>>,
    shutdown: &Arc<AtomicBool>,
    logger: &Arc<Mutex<StructuredLogger>>,
    processor: &mut Processor,
) -> Result<Option<Arc<IgateHandle>>> {
    let Some((_, mycall)) = channel_mycalls.first().cloned() else {
        logger.lock().unwrap().log(LogEvent::Warn {
            message: "IGate configured but no channel declares a MYCALL; skipping".to_string(),
        })?;
        return Ok(None);
    };
    let tx_chan = igate_config.tx_chan;
    let Some(tx_queue) = tx_queues.get(&tx_chan).cloned() else {
        logger.lock().unwrap().log(LogEvent::Warn {
            message: format!("IGate IGTXVIA targets undeclared channel {tx_chan}"),
        })?;
        return Ok(None);
    };

    let handle = Arc::new(
        igate_runtime::spawn(igate_config, mycall, tx_queue, shutdown.clone(), logger.clone())
            .wrap_err("starting IGate runtime")?,
    );
    for (chan, _) in channel_mycalls {
        processor.add_igate_route(*chan, Box::new(RoutedIgateHandle(handle.clone())));
    }
    Ok(Some(handle))
}

/// Lets more than one channel share the same [`IgateHandle`] as its RX→IS
/// sink (§4.3 step 3 is per-channel, the gateway connection is not).
struct RoutedIgateHandle(Arc<IgateHandle>);

impl IgateRxSink for RoutedIgateHandle {
    fn receive_from_rf(&self, chan: u16, packet: &Packet) {
        self.0.receive_from_rf(chan, packet);
    }

    fn note_digipeated(&self, chan: u16, packet: &Packet) {
        self.0.note_digipeated(chan, packet);
    }
}

/// Wakes for the next beacon due across every configured beacon, routing
/// each to its configured destination (§4.8).
fn beacon_thread(
    beacons: Vec<tnc_core::config::BeaconConfig>,
    smartbeacon: Option<tnc_core::config::SmartBeaconConfig>,
    mycall: Address,
    tx_queues: HashMap<u16, Arc<TxQueue>>,
    igate: Option<Arc<IgateHandle>>,
    dlq_sender: dlq::DlqSender,
    shutdown: Arc<AtomicBool>,
) {
    let start = Instant::now();
    let mut scheduler = BeaconScheduler::new(beacons, smartbeacon, NullGpsSource, mycall, start);

    while !shutdown.load(Ordering::Relaxed) {
        let now = Instant::now();
        let wake = scheduler.earliest_wakeup(now);
        let sleep_for = wake.saturating_duration_since(now).min(std::time::Duration::from_secs(1));
        std::thread::sleep(sleep_for);

        for (destination, packet) in scheduler.tick(Instant::now()) {
            match destination {
                BeaconDestination::Channel(chan) => {
                    if let Some(queue) = tx_queues.get(&chan) {
                        queue.enqueue(packet, Priority::Lo);
                    }
                }
                BeaconDestination::Igate => {
                    if let Some(handle) = &igate {
                        handle.receive_from_rf(u16::MAX, &packet);
                    }
                }
                BeaconDestination::Loopback(chan) => {
                    dlq_sender.send(dlq::DlqEntry {
                        chan,
                        subchan: 0,
                        slicer: 0,
                        packet,
                        audio_level: 0,
                        retries: 0,
                        spectrum: "beacon-loopback".to_string(),
                    });
                }
            }
        }
    }
}
