//! Device-backed audio I/O: cpal capture and playback bridged onto the
//! session's WebRTC tracks, with rubato resampling and Opus framing.
//!
//! The cpal streams are not `Send`, so each one lives on its own thread and
//! talks to the async side exclusively through a lock-free ring buffer.

use async_trait::async_trait;
use bytes::Bytes;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapRb};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use voicelink_session::{AudioSink, AudioSource, LocalAudio, SessionError, opus_track};
use webrtc::media::Sample;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

/// Transport sample rate for Opus audio.
const TRANSPORT_RATE: u32 = 48_000;
/// Samples per 20 ms Opus frame at the transport rate.
const OPUS_FRAME: usize = 960;
const FRAME_MS: u64 = 20;

fn poisoned_guard<T>(err: std::sync::PoisonError<T>) -> T {
    err.into_inner()
}

/// Captures the default input device and feeds it to the outbound track.
pub struct MicrophoneSource;

#[async_trait]
impl AudioSource for MicrophoneSource {
    async fn open(&self) -> Result<LocalAudio, SessionError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or_else(|| {
            SessionError::MediaAccess("no input device available; check that a microphone is connected and permitted".into())
        })?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        let supported = device.default_input_config().map_err(|err| {
            SessionError::MediaAccess(format!("input device rejected configuration: {err}"))
        })?;
        if supported.sample_format() != SampleFormat::F32 {
            return Err(SessionError::MediaAccess(format!(
                "unsupported input sample format {:?}",
                supported.sample_format()
            )));
        }
        let config: StreamConfig = supported.into();
        let input_rate = config.sample_rate.0;
        let channels = config.channels as usize;
        info!(device = %device_name, rate = input_rate, channels, "capturing microphone");

        // One second of slack between the device callback and the encoder.
        let (mut producer, consumer) = HeapRb::<f32>::new(input_rate as usize).split();
        let stop = Arc::new(AtomicBool::new(false));

        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), String>>();
        let thread_stop = Arc::clone(&stop);
        std::thread::spawn(move || {
            let stream = device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if channels == 1 {
                        producer.push_slice(data);
                    } else {
                        // Downmix interleaved frames to mono.
                        for frame in data.chunks(channels) {
                            let sample = frame.iter().sum::<f32>() / channels as f32;
                            let _ = producer.try_push(sample);
                        }
                    }
                },
                |err| error!(error = %err, "input stream error"),
                None,
            );
            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    let _ = ready_tx.send(Err(err.to_string()));
                    return;
                }
            };
            if let Err(err) = stream.play() {
                let _ = ready_tx.send(Err(err.to_string()));
                return;
            }
            let _ = ready_tx.send(Ok(()));
            while !thread_stop.load(Ordering::SeqCst) {
                std::thread::park_timeout(Duration::from_millis(100));
            }
            drop(stream);
        });

        let ready = tokio::task::spawn_blocking(move || ready_rx.recv())
            .await
            .map_err(|err| SessionError::MediaAccess(err.to_string()))?
            .map_err(|_| SessionError::MediaAccess("capture thread exited early".into()))?;
        if let Err(message) = ready {
            return Err(SessionError::MediaAccess(format!(
                "could not open capture stream: {message}"
            )));
        }

        let track = opus_track("microphone");
        let pump = tokio::spawn(pump_microphone(consumer, Arc::clone(&track), input_rate));

        let pump_stop = Arc::clone(&stop);
        Ok(LocalAudio::new(track, move || {
            pump_stop.store(true, Ordering::SeqCst);
            pump.abort();
        }))
    }
}

/// Moves captured samples to the track: resample to 48 kHz, frame into 20 ms
/// chunks, Opus-encode, write.
async fn pump_microphone(
    mut captured: HeapCons<f32>,
    track: Arc<TrackLocalStaticSample>,
    input_rate: u32,
) {
    let chunk = (input_rate as usize / 1000) * FRAME_MS as usize;
    let mut resampler = match FastFixedIn::<f32>::new(
        f64::from(TRANSPORT_RATE) / f64::from(input_rate),
        1.0,
        PolynomialDegree::Cubic,
        chunk,
        1,
    ) {
        Ok(resampler) => resampler,
        Err(err) => {
            error!(error = %err, "could not build capture resampler");
            return;
        }
    };
    let mut encoder = match opus::Encoder::new(TRANSPORT_RATE, opus::Channels::Mono, opus::Application::Voip)
    {
        Ok(encoder) => encoder,
        Err(err) => {
            error!(error = %err, "could not build opus encoder");
            return;
        }
    };

    let mut ticker = tokio::time::interval(Duration::from_millis(FRAME_MS));
    let mut buffer = vec![0.0_f32; chunk];
    let mut pending: Vec<f32> = Vec::with_capacity(chunk * 2);
    let mut resampled_pending: Vec<f32> = Vec::with_capacity(OPUS_FRAME * 2);

    loop {
        ticker.tick().await;
        let popped = captured.pop_slice(&mut buffer);
        pending.extend_from_slice(&buffer[..popped]);

        while pending.len() >= chunk {
            let frame: Vec<f32> = pending.drain(..chunk).collect();
            match resampler.process(&[frame], None) {
                Ok(mut output) => resampled_pending.extend(output.remove(0)),
                Err(err) => {
                    warn!(error = %err, "capture resampling failed");
                    continue;
                }
            }
        }

        while resampled_pending.len() >= OPUS_FRAME {
            let pcm: Vec<i16> = resampled_pending
                .drain(..OPUS_FRAME)
                .map(|sample| (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
                .collect();
            let packet = match encoder.encode_vec(&pcm, 4000) {
                Ok(packet) => packet,
                Err(err) => {
                    warn!(error = %err, "opus encode failed");
                    continue;
                }
            };
            let sample = Sample {
                data: Bytes::from(packet),
                duration: Duration::from_millis(FRAME_MS),
                ..Default::default()
            };
            if track.write_sample(&sample).await.is_err() {
                return;
            }
        }
    }
}

/// Plays the remote track on the default output device.
#[derive(Default)]
pub struct SpeakerSink {
    playback: std::sync::Mutex<Option<Playback>>,
}

struct Playback {
    task: JoinHandle<()>,
    stop: Arc<AtomicBool>,
}

impl SpeakerSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AudioSink for SpeakerSink {
    async fn attach(&self, track: Arc<TrackRemote>) {
        let stop = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(play_remote_track(track, Arc::clone(&stop)));
        let mut playback = self.playback.lock().unwrap_or_else(poisoned_guard);
        if playback.is_some() {
            warn!("playback already attached; ignoring duplicate track");
            task.abort();
            return;
        }
        *playback = Some(Playback { task, stop });
    }

    fn detach(&self) {
        let mut playback = self.playback.lock().unwrap_or_else(poisoned_guard);
        if let Some(playback) = playback.take() {
            playback.stop.store(true, Ordering::SeqCst);
            playback.task.abort();
        }
    }
}

async fn play_remote_track(track: Arc<TrackRemote>, stop: Arc<AtomicBool>) {
    let host = cpal::default_host();
    let Some(device) = host.default_output_device() else {
        warn!("no output device available; discarding remote audio");
        drain_track(track, stop).await;
        return;
    };
    let supported = match device.default_output_config() {
        Ok(supported) => supported,
        Err(err) => {
            warn!(error = %err, "output device rejected configuration; discarding remote audio");
            drain_track(track, stop).await;
            return;
        }
    };
    if supported.sample_format() != SampleFormat::F32 {
        warn!(format = ?supported.sample_format(), "unsupported output sample format; discarding remote audio");
        drain_track(track, stop).await;
        return;
    }
    let config: StreamConfig = supported.into();
    let output_rate = config.sample_rate.0;
    let output_channels = config.channels as usize;
    info!(rate = output_rate, channels = output_channels, "playing remote audio");

    let (mut producer, mut consumer) = HeapRb::<f32>::new(output_rate as usize).split();

    let thread_stop = Arc::clone(&stop);
    std::thread::spawn(move || {
        let stream = device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(output_channels) {
                    // Zero-fill on underrun rather than stalling the device.
                    let sample = consumer.try_pop().unwrap_or(0.0);
                    for slot in frame {
                        *slot = sample;
                    }
                }
            },
            |err| error!(error = %err, "output stream error"),
            None,
        );
        let stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                warn!(error = %err, "could not open playback stream");
                return;
            }
        };
        if let Err(err) = stream.play() {
            warn!(error = %err, "could not start playback stream");
            return;
        }
        while !thread_stop.load(Ordering::SeqCst) {
            std::thread::park_timeout(Duration::from_millis(100));
        }
        drop(stream);
    });

    let mut decoder = match opus::Decoder::new(TRANSPORT_RATE, opus::Channels::Mono) {
        Ok(decoder) => decoder,
        Err(err) => {
            error!(error = %err, "could not build opus decoder");
            return;
        }
    };
    let mut resampler = if output_rate == TRANSPORT_RATE {
        None
    } else {
        match FastFixedIn::<f32>::new(
            f64::from(output_rate) / f64::from(TRANSPORT_RATE),
            1.0,
            PolynomialDegree::Cubic,
            OPUS_FRAME,
            1,
        ) {
            Ok(resampler) => Some(resampler),
            Err(err) => {
                error!(error = %err, "could not build playback resampler");
                return;
            }
        }
    };

    // Largest Opus frame is 120 ms.
    let mut pcm = vec![0_i16; OPUS_FRAME * 6];
    let mut resample_pending: Vec<f32> = Vec::with_capacity(OPUS_FRAME * 2);
    while !stop.load(Ordering::SeqCst) {
        let payload = match track.read_rtp().await {
            Ok((packet, _)) => packet.payload,
            Err(_) => break,
        };
        if payload.is_empty() {
            continue;
        }
        let decoded = match decoder.decode(&payload, &mut pcm, false) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(error = %err, "opus decode failed");
                continue;
            }
        };
        let mono: Vec<f32> = pcm[..decoded]
            .iter()
            .map(|&sample| f32::from(sample) / 32768.0)
            .collect();
        match &mut resampler {
            None => {
                producer.push_slice(&mono);
            }
            Some(resampler) => {
                resample_pending.extend(mono);
                while resample_pending.len() >= OPUS_FRAME {
                    let frame: Vec<f32> = resample_pending.drain(..OPUS_FRAME).collect();
                    match resampler.process(&[frame], None) {
                        Ok(mut output) => {
                            producer.push_slice(&output.remove(0));
                        }
                        Err(err) => warn!(error = %err, "playback resampling failed"),
                    }
                }
            }
        }
    }
}

/// Keeps an unplayable remote track drained so the transport stays healthy.
async fn drain_track(track: Arc<TrackRemote>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::SeqCst) {
        if track.read_rtp().await.is_err() {
            break;
        }
    }
}
