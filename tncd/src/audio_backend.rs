//! Reference audio backends for `ADEVICE` directives.
//!
//! A real sound card is host-specific and out of scope; these are the
//! stand-ins the daemon actually ships so a channel's modem chain can run
//! end-to-end on any machine: a generated test tone, a streaming WAV file
//! via `hound`, a file decoded once via `symphonia` + `rubato`, or silence.

use std::fs::File;
use std::path::Path;

use color_eyre::eyre::{eyre, Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use tnc_core::audio::{AudioSink, AudioSource};

use crate::config::AudioDeviceKind;

/// Build the `AudioSource` a receive thread reads from for `kind`.
pub fn build_source(kind: &AudioDeviceKind, sample_rate: u32) -> Result<Box<dyn AudioSource>> {
    match kind {
        AudioDeviceKind::Tone => Ok(Box::new(ToneSource::new(sample_rate, 1200.0))),
        AudioDeviceKind::Null => Ok(Box::new(NullSource { sample_rate })),
        AudioDeviceKind::WavFile(path) => Ok(Box::new(WavFileSource::open(path, sample_rate)?)),
        AudioDeviceKind::CompressedFile(path) => {
            let samples = decode_and_resample(Path::new(path), sample_rate)?;
            Ok(Box::new(tnc_core::audio::MemoryAudio::new(sample_rate, samples)))
        }
    }
}

/// Build the `AudioSink` a transmit thread writes to for `kind`. A tone
/// generator and compressed-file decode are read-only by nature; both
/// fall back to discarding whatever the modulator produces.
pub fn build_sink(kind: &AudioDeviceKind, sample_rate: u32) -> Result<Box<dyn AudioSink>> {
    match kind {
        AudioDeviceKind::WavFile(path) => Ok(Box::new(WavFileSink::create(path, sample_rate)?)),
        AudioDeviceKind::Tone | AudioDeviceKind::Null | AudioDeviceKind::CompressedFile(_) => {
            Ok(Box::new(NullSink { sample_rate }))
        }
    }
}

/// Continuously generated sine tone, used to smoke-test a channel's
/// demodulator chain without any real audio attached.
struct ToneSource {
    sample_rate: u32,
    freq_hz: f32,
    phase: f32,
}

impl ToneSource {
    fn new(sample_rate: u32, freq_hz: f32) -> Self {
        Self { sample_rate, freq_hz, phase: 0.0 }
    }
}

impl AudioSource for ToneSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read(&mut self, buf: &mut [i16]) -> usize {
        let step = 2.0 * std::f32::consts::PI * self.freq_hz / self.sample_rate as f32;
        for sample in buf.iter_mut() {
            *sample = (self.phase.sin() * i16::MAX as f32 * 0.7) as i16;
            self.phase = (self.phase + step) % (2.0 * std::f32::consts::PI);
        }
        buf.len()
    }
}

/// Infinite silence in, discarded audio out — a channel that exists only
/// to be an IGate/digipeat source or sink under test.
struct NullSource {
    sample_rate: u32,
}

impl AudioSource for NullSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read(&mut self, buf: &mut [i16]) -> usize {
        buf.fill(0);
        buf.len()
    }
}

struct NullSink {
    sample_rate: u32,
}

impl AudioSink for NullSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn write(&mut self, _buf: &[i16]) {}
    fn drain(&mut self) {}
}

/// Streams samples from a PCM WAV file, converting whatever sample
/// format the file was written in down to mono i16 as they're read.
struct WavFileSource {
    reader: WavReader<std::io::BufReader<File>>,
    sample_rate: u32,
    spec: WavSpec,
}

impl WavFileSource {
    fn open(path: &str, sample_rate: u32) -> Result<Self> {
        let reader = WavReader::open(path).wrap_err_with(|| format!("opening WAV source {path:?}"))?;
        let spec = reader.spec();
        Ok(Self { reader, sample_rate, spec })
    }
}

impl AudioSource for WavFileSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read(&mut self, buf: &mut [i16]) -> usize {
        let channels = self.spec.channels.max(1) as usize;
        let mut n = 0;
        while n < buf.len() {
            let mut frame_sum: i32 = 0;
            let mut got_any = false;
            for _ in 0..channels {
                let sample = match self.spec.sample_format {
                    SampleFormat::Int => match self.reader.samples::<i32>().next() {
                        Some(Ok(s)) => {
                            let shift = 32 - self.spec.bits_per_sample;
                            (s << shift) >> 16
                        }
                        _ => break,
                    },
                    SampleFormat::Float => match self.reader.samples::<f32>().next() {
                        Some(Ok(s)) => (s * i16::MAX as f32) as i32,
                        _ => break,
                    },
                };
                frame_sum += sample;
                got_any = true;
            }
            if !got_any {
                break;
            }
            buf[n] = (frame_sum / channels as i32).clamp(i16::MIN as i32, i16::MAX as i32) as i16;
            n += 1;
        }
        n
    }
}

/// Writes 16-bit mono PCM to a WAV file, finalizing on drop so the file
/// header's length fields are correct no matter how the daemon exits.
struct WavFileSink {
    writer: Option<WavWriter<std::io::BufWriter<File>>>,
    sample_rate: u32,
}

impl WavFileSink {
    fn create(path: &str, sample_rate: u32) -> Result<Self> {
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let writer = WavWriter::create(path, spec).wrap_err_with(|| format!("creating WAV sink {path:?}"))?;
        Ok(Self { writer: Some(writer), sample_rate })
    }
}

impl AudioSink for WavFileSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn write(&mut self, buf: &[i16]) {
        if let Some(writer) = &mut self.writer {
            for &sample in buf {
                let _ = writer.write_sample(sample);
            }
        }
    }

    fn drain(&mut self) {
        if let Some(writer) = &mut self.writer {
            let _ = writer.flush();
        }
    }
}

impl Drop for WavFileSink {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            let _ = writer.finalize();
        }
    }
}

/// Decode a compressed file fully into memory, resampled to
/// `target_rate` and quantized to i16, per the teacher's symphonia +
/// rubato pipeline.
fn decode_and_resample(path: &Path, target_rate: u32) -> Result<Vec<i16>> {
    let file = File::open(path).wrap_err_with(|| format!("opening audio file {path:?}"))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .wrap_err_with(|| format!("probing audio format for {path:?}"))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| eyre!("{path:?} has no decodable audio track"))?;
    let track_id = track.id;
    let source_rate = track.codec_params.sample_rate.ok_or_else(|| eyre!("{path:?} has no known sample rate"))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .wrap_err_with(|| format!("building decoder for {path:?}"))?;

    let mut mono = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(_) => break,
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => mono.extend(convert_to_mono_f32(&decoded)),
            Err(_) => continue,
        }
    }

    let resampled = if source_rate == target_rate {
        mono
    } else {
        resample(&mono, source_rate as usize, target_rate as usize)?
    };

    Ok(resampled.into_iter().map(|s| (s * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16).collect())
}

fn convert_to_mono_f32(buffer: &AudioBufferRef) -> Vec<f32> {
    macro_rules! mixdown {
        ($buf:expr, $to_f32:expr) => {{
            let channels = $buf.spec().channels.count().max(1);
            let frames = $buf.frames();
            let mut mono = Vec::with_capacity(frames);
            for i in 0..frames {
                let sum: f32 = (0..channels).map(|ch| $to_f32($buf.chan(ch)[i])).sum();
                mono.push(sum / channels as f32);
            }
            mono
        }};
    }

    match buffer {
        AudioBufferRef::F32(buf) => mixdown!(buf, |s: f32| s),
        AudioBufferRef::F64(buf) => mixdown!(buf, |s: f64| s as f32),
        AudioBufferRef::U8(buf) => mixdown!(buf, |s: u8| (s as f32 - 128.0) / 128.0),
        AudioBufferRef::U16(buf) => mixdown!(buf, |s: u16| (s as f32 - 32768.0) / 32768.0),
        AudioBufferRef::U24(buf) => mixdown!(buf, |s: symphonia::core::sample::u24| (s.inner() as i32 - 8_388_608) as f32 / 8_388_608.0),
        AudioBufferRef::U32(buf) => mixdown!(buf, |s: u32| (s as f64 - 2_147_483_648.0) as f32 / 2_147_483_648.0),
        AudioBufferRef::S8(buf) => mixdown!(buf, |s: i8| s as f32 / 128.0),
        AudioBufferRef::S16(buf) => mixdown!(buf, |s: i16| s as f32 / 32768.0),
        AudioBufferRef::S24(buf) => mixdown!(buf, |s: symphonia::core::sample::i24| s.inner() as f32 / 8_388_608.0),
        AudioBufferRef::S32(buf) => mixdown!(buf, |s: i32| s as f64 as f32 / 2_147_483_648.0),
    }
}

fn resample(samples: &[f32], source_rate: usize, target_rate: usize) -> Result<Vec<f32>> {
    if samples.is_empty() {
        return Ok(Vec::new());
    }
    let chunk_size = source_rate;
    let mut resampler = FastFixedIn::<f32>::new(
        target_rate as f64 / source_rate as f64,
        1.0,
        PolynomialDegree::Linear,
        chunk_size,
        1,
    )
    .wrap_err("building resampler")?;

    let mut output = Vec::new();
    let mut input_buf = vec![Vec::new()];
    for chunk in samples.chunks(chunk_size) {
        input_buf[0].clear();
        input_buf[0].extend_from_slice(chunk);
        input_buf[0].resize(chunk_size, 0.0);
        let out = resampler.process(&input_buf, None).wrap_err("resampling")?;
        output.extend_from_slice(&out[0]);
    }
    Ok(output)
}
