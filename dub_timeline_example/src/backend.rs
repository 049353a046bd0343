use crossbeam_channel::{unbounded, Sender};
use dub_timeline::waveform::normalize_peaks;
use dub_timeline::{AudioBackend, AudioResolution, AudioTicket, SegmentId, WaveformRequest, WaveformResponse};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

fn open_source(url: &str) -> Result<Decoder<BufReader<File>>, String> {
    let file = File::open(url).map_err(|err| format!("{url}: {err}"))?;
    Decoder::new(BufReader::new(file)).map_err(|err| format!("{url}: {err}"))
}

struct SinkSlot {
    sink: Sink,
    url: String,
}

/// One rodio sink per segment, all sharing the default output device.
pub struct RodioBackend {
    _stream: OutputStream,
    handle: OutputStreamHandle,
    slots: HashMap<SegmentId, SinkSlot>,
}

impl RodioBackend {
    pub fn try_new() -> Result<Self, String> {
        let (stream, handle) =
            OutputStream::try_default().map_err(|err| format!("无法初始化输出设备: {err}"))?;
        Ok(Self {
            _stream: stream,
            handle,
            slots: HashMap::new(),
        })
    }
}

impl AudioBackend for RodioBackend {
    fn load(&mut self, id: &SegmentId, url: &str) {
        let sink = match Sink::try_new(&self.handle) {
            Ok(sink) => sink,
            Err(err) => {
                log::warn!("No sink for {}: {}", id, err);
                return;
            }
        };
        match open_source(url) {
            Ok(source) => {
                sink.pause();
                sink.append(source);
                self.slots.insert(
                    id.clone(),
                    SinkSlot {
                        sink,
                        url: url.to_string(),
                    },
                );
            }
            Err(err) => log::warn!("Cannot load audio for {}: {}", id, err),
        }
    }

    fn play(&mut self, id: &SegmentId, offset: f64, rate: f64) {
        let Some(slot) = self.slots.get(id) else {
            return;
        };
        // A sink that ran to the end has dropped its source.
        if slot.sink.empty() {
            match open_source(&slot.url) {
                Ok(source) => slot.sink.append(source),
                Err(err) => {
                    log::warn!("Cannot reopen audio for {}: {}", id, err);
                    return;
                }
            }
        }
        slot.sink.set_speed(rate as f32);
        if let Err(err) = slot.sink.try_seek(Duration::from_secs_f64(offset.max(0.0))) {
            log::debug!("Seek failed for {}: {}", id, err);
        }
        slot.sink.play();
    }

    fn pause(&mut self, id: &SegmentId) {
        if let Some(slot) = self.slots.get(id) {
            slot.sink.pause();
        }
    }

    fn seek(&mut self, id: &SegmentId, offset: f64) {
        if let Some(slot) = self.slots.get(id) {
            if let Err(err) = slot.sink.try_seek(Duration::from_secs_f64(offset.max(0.0))) {
                log::debug!("Seek failed for {}: {}", id, err);
            }
        }
    }

    fn position(&self, id: &SegmentId) -> Option<f64> {
        self.slots.get(id).map(|slot| slot.sink.get_pos().as_secs_f64())
    }

    fn release(&mut self, id: &SegmentId) {
        if let Some(slot) = self.slots.remove(id) {
            slot.sink.stop();
        }
    }
}

/// Work the editor hands to the host: resolving audio references and
/// decoding waveforms. Replies go back on the sender carried by the job, so
/// results for a replaced editor are simply dropped.
pub enum Job {
    Resolve {
        ticket: AudioTicket,
        base_dir: PathBuf,
        reply: Sender<AudioResolution>,
    },
    Decode {
        request: WaveformRequest,
        reply: Sender<WaveformResponse>,
    },
}

pub fn spawn_worker(ctx: egui::Context) -> Sender<Job> {
    let (sender, receiver) = unbounded::<Job>();
    let spawned = thread::Builder::new()
        .name("dub-audio-worker".into())
        .spawn(move || {
            for job in receiver {
                match job {
                    Job::Resolve {
                        ticket,
                        base_dir,
                        reply,
                    } => {
                        let result = resolve_ref(&base_dir, &ticket.audio_ref);
                        let _ = reply.send(AudioResolution { ticket, result });
                    }
                    Job::Decode { request, reply } => {
                        let result = decode_peaks(&request.url, request.sample_count);
                        let _ = reply.send(WaveformResponse { request, result });
                    }
                }
                ctx.request_repaint();
            }
            log::debug!("Audio worker finished");
        });
    if let Err(err) = spawned {
        log::error!("Failed to start audio worker: {}", err);
    }
    sender
}

/// References are file paths, relative to the session or seed file.
fn resolve_ref(base_dir: &Path, audio_ref: &str) -> Result<String, String> {
    let path = Path::new(audio_ref);
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    };
    if path.is_file() {
        Ok(path.to_string_lossy().into_owned())
    } else {
        Err(format!("{} not found", path.display()))
    }
}

fn decode_peaks(url: &str, count: usize) -> Result<Vec<f32>, String> {
    let decoder = open_source(url)?;
    let channels = decoder.channels().max(1) as usize;
    let samples: Vec<f32> = decoder.convert_samples::<f32>().collect();
    let mono: Vec<f32> = samples
        .chunks(channels)
        .map(|frame| frame.iter().fold(0.0_f32, |peak, s| peak.max(s.abs())))
        .collect();
    Ok(normalize_peaks(&mono, count))
}

/// Length of an audio file in seconds.
pub fn audio_duration(path: &Path) -> Result<f64, String> {
    let url = path.to_string_lossy();
    let decoder = open_source(&url)?;
    if let Some(duration) = decoder.total_duration() {
        return Ok(duration.as_secs_f64());
    }
    let rate = decoder.sample_rate().max(1) as f64;
    let channels = decoder.channels().max(1) as f64;
    let samples = decoder.count() as f64;
    Ok(samples / (rate * channels))
}
