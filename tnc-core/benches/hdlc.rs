use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use tnc_core::hdlc::receiver::{FixBitsMode, HdlcReceiver};
use tnc_core::hdlc::transmitter::HdlcTransmitter;
use tnc_core::hdlc::NrziDecoder;
use tnc_core::logging::{LogConfig, TncLogger};
use tnc_core::packet::Packet;

fn sample_packet(info_len: usize) -> Packet {
    Packet::new_ui(
        "W1ABC".parse().unwrap(),
        "APRS".parse().unwrap(),
        vec![b'!'; info_len],
    )
}

/// The line-level signal `HdlcTransmitter::frame_bits` produces, decoded
/// back to the pre-NRZI data bits `HdlcReceiver::process_bit` expects —
/// the same loopback shape `hdlc::receiver`'s own tests use.
fn loopback_bits(packet: &Packet) -> Vec<u8> {
    let levels = HdlcTransmitter::frame_bits(packet, 20, 2);
    let mut decoder = NrziDecoder::new(false);
    levels.iter().map(|&level| decoder.decode_level(level)).collect()
}

fn benchmark_frame_bits(c: &mut Criterion) {
    let packet = sample_packet(32);
    c.bench_function("hdlc_frame_bits", |b| {
        b.iter(|| HdlcTransmitter::frame_bits(black_box(&packet), black_box(20), black_box(2)))
    });
}

fn benchmark_process_bit(c: &mut Criterion) {
    let packet = sample_packet(32);
    let bits = loopback_bits(&packet);

    c.bench_function("hdlc_process_bit_stream", |b| {
        b.iter(|| {
            let mut rx = HdlcReceiver::new(FixBitsMode::Off);
            let mut logger = TncLogger::new(LogConfig::disabled());
            let mut frames = 0;
            for &bit in black_box(&bits) {
                if rx.process_bit(bit, &mut logger).is_some() {
                    frames += 1;
                }
            }
            black_box(frames)
        })
    });
}

fn benchmark_payload_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("hdlc_frame_bits_by_payload");
    for &len in &[8usize, 32, 128, 256] {
        let packet = sample_packet(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, _| {
            b.iter(|| HdlcTransmitter::frame_bits(black_box(&packet), 20, 2))
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_frame_bits, benchmark_process_bit, benchmark_payload_sizes);
criterion_main!(benches);
