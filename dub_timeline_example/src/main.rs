mod backend;

use backend::{audio_duration, spawn_worker, Job, RodioBackend};
use crossbeam_channel::Sender;
use dub_timeline::{
    AudioBackend, InstantClock, NullBackend, SeedSegment, SessionSnapshot, TimelineCommand,
    TimelineConfig, TimelineEditor, TrackKind,
};
use eframe::egui::{self, TopBottomPanel};
use rfd::FileDialog;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Host-side seed file: the segment list plus the session length.
#[derive(Deserialize)]
struct SeedFile {
    duration: f64,
    segments: Vec<SeedSegment>,
}

struct Args {
    seed: Option<PathBuf>,
    config: Option<PathBuf>,
}

fn parse_args() -> Args {
    let mut args = Args {
        seed: None,
        config: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => args.config = iter.next().map(PathBuf::from),
            _ => args.seed = Some(PathBuf::from(arg)),
        }
    }
    args
}

fn main() -> eframe::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args();
    let config = match &args.config {
        Some(path) => TimelineConfig::load(path).unwrap_or_else(|err| {
            log::error!("Ignoring config {}: {}", path.display(), err);
            TimelineConfig::default()
        }),
        None => TimelineConfig::default(),
    };

    let native_options = eframe::NativeOptions::default();
    eframe::run_native(
        "Dub Timeline",
        native_options,
        Box::new(move |cc| {
            let app = DubApp::new(cc.egui_ctx.clone(), config, args.seed)?;
            Ok(Box::new(app))
        }),
    )
}

fn make_backend() -> Box<dyn AudioBackend> {
    match RodioBackend::try_new() {
        Ok(backend) => Box::new(backend),
        Err(err) => {
            log::warn!("{err}; audio output disabled");
            Box::new(NullBackend)
        }
    }
}

fn read_seed_file(path: &Path) -> Result<SeedFile, String> {
    let json = fs::read_to_string(path)
        .map_err(|err| format!("Failed to read {}: {err}", path.display()))?;
    serde_json::from_str(&json).map_err(|err| format!("Invalid seed file {}: {err}", path.display()))
}

fn seed_line(id: &str, speaker: &str, start: f64, end: f64, source: &str, target: &str) -> SeedSegment {
    SeedSegment {
        id: id.into(),
        speaker: speaker.into(),
        start,
        end,
        source_text: source.into(),
        target_text: target.into(),
        audio_ref: None,
        playback_rate: None,
    }
}

fn demo_seed() -> SeedFile {
    SeedFile {
        duration: 30.0,
        segments: vec![
            seed_line("seg1", "Narrator", 0.5, 4.0, "Il était une fois", "Once upon a time"),
            seed_line("seg2", "Narrator", 4.0, 7.5, "dans un pays lointain", "in a faraway land"),
            seed_line("seg3", "Alice", 8.0, 10.5, "Qui est là ?", "Who's there?"),
            seed_line("seg4", "Bob", 11.0, 14.0, "C'est moi.", "It's me."),
            seed_line("seg5", "Alice", 14.5, 18.0, "Entre donc.", "Come on in."),
            seed_line("seg6", "Narrator", 19.0, 25.0, "Et ils parlèrent longtemps.", "And they talked for hours."),
        ],
    }
}

struct DubApp {
    editor: TimelineEditor,
    config: TimelineConfig,
    worker: Sender<Job>,
    /// Relative audio references resolve against this directory.
    base_dir: PathBuf,
    session_path: Option<PathBuf>,
    status_line: String,
}

impl DubApp {
    fn new(ctx: egui::Context, config: TimelineConfig, seed_path: Option<PathBuf>) -> Result<Self, String> {
        let (seed, base_dir) = match &seed_path {
            Some(path) => (read_seed_file(path)?, parent_dir(path)),
            None => (demo_seed(), PathBuf::from(".")),
        };
        let editor = TimelineEditor::from_seed(seed.segments, seed.duration, config.clone(), make_backend())
            .map_err(|err| err.to_string())?;

        let mut app = Self {
            editor,
            config,
            worker: spawn_worker(ctx),
            base_dir,
            session_path: None,
            status_line: "Ready".to_owned(),
        };
        app.dispatch_jobs();
        Ok(app)
    }

    fn replace_editor(&mut self, editor: TimelineEditor, base_dir: PathBuf) {
        self.editor.shutdown();
        self.editor = editor;
        self.base_dir = base_dir;
        self.dispatch_jobs();
    }

    /// Forwards the editor's outstanding audio and waveform work to the worker.
    fn dispatch_jobs(&mut self) {
        let audio_reply = self.editor.audio_completion_sender();
        for ticket in self.editor.take_audio_tickets() {
            let job = Job::Resolve {
                ticket,
                base_dir: self.base_dir.clone(),
                reply: audio_reply.clone(),
            };
            if self.worker.send(job).is_err() {
                log::error!("Audio worker is gone");
                return;
            }
        }
        let waveform_reply = self.editor.waveform_completion_sender();
        for request in self.editor.take_waveform_requests() {
            let job = Job::Decode {
                request,
                reply: waveform_reply.clone(),
            };
            if self.worker.send(job).is_err() {
                log::error!("Audio worker is gone");
                return;
            }
        }
    }

    fn menu_bar(&mut self, ui: &mut egui::Ui) {
        egui::menu::bar(ui, |ui| {
            ui.menu_button("File", |ui| {
                if ui.button("Open Seed...").clicked() {
                    self.open_seed_dialog();
                    ui.close_menu();
                }
                if ui.button("Open Session...").clicked() {
                    self.open_session_dialog();
                    ui.close_menu();
                }
                if ui.button("Save Session").clicked() {
                    self.save_session();
                    ui.close_menu();
                }
                if ui.button("Save Session As...").clicked() {
                    self.save_session_as_dialog();
                    ui.close_menu();
                }
            });
            ui.menu_button("Edit", |ui| {
                if ui.button("Import Audio for Selected...").clicked() {
                    self.import_audio_dialog();
                    ui.close_menu();
                }
                ui.separator();
                if ui.button("Add Waveform Lane").clicked() {
                    self.run(TimelineCommand::AddLane {
                        kind: TrackKind::Waveform,
                        label: "Original".into(),
                    });
                    ui.close_menu();
                }
                if ui.button("Add Muted Lane").clicked() {
                    self.run(TimelineCommand::AddLane {
                        kind: TrackKind::Muted,
                        label: "Muted".into(),
                    });
                    ui.close_menu();
                }
            });

            if let Some(path) = &self.session_path {
                ui.label(format!(" Session: {}", path.display()));
            } else {
                ui.label(" Session: (unsaved)");
            }
        });
    }

    fn run(&mut self, command: TimelineCommand) {
        if let Err(err) = self.editor.execute_command(command) {
            self.set_error(err.to_string());
        }
    }

    fn open_seed_dialog(&mut self) {
        if let Some(path) = FileDialog::new().add_filter("Seed", &["json"]).pick_file() {
            let loaded = read_seed_file(&path).and_then(|seed| {
                TimelineEditor::from_seed(seed.segments, seed.duration, self.config.clone(), make_backend())
                    .map_err(|err| err.to_string())
            });
            match loaded {
                Ok(editor) => {
                    self.replace_editor(editor, parent_dir(&path));
                    self.session_path = None;
                    self.set_status(format!("Opened seed {}", path.display()));
                }
                Err(err) => self.set_error(err),
            }
        }
    }

    fn open_session_dialog(&mut self) {
        if let Some(path) = FileDialog::new().add_filter("Dub Session", &["json"]).pick_file() {
            let loaded = SessionSnapshot::load_from_path(&path).and_then(|snapshot| {
                TimelineEditor::from_snapshot(
                    snapshot,
                    self.config.clone(),
                    Box::new(InstantClock::default()),
                    make_backend(),
                )
            });
            match loaded {
                Ok(editor) => {
                    self.replace_editor(editor, parent_dir(&path));
                    self.session_path = Some(path.clone());
                    self.set_status(format!("Opened {}", path.display()));
                }
                Err(err) => self.set_error(err.to_string()),
            }
        }
    }

    fn save_session(&mut self) {
        if let Some(path) = self.session_path.clone() {
            match self.editor.snapshot().save_to_path(&path) {
                Ok(_) => self.set_status(format!("Saved {}", path.display())),
                Err(err) => self.set_error(err.to_string()),
            }
        } else {
            self.save_session_as_dialog();
        }
    }

    fn save_session_as_dialog(&mut self) {
        if let Some(path) = FileDialog::new()
            .add_filter("Dub Session", &["json"])
            .set_file_name("session.json")
            .save_file()
        {
            match self.editor.snapshot().save_to_path(&path) {
                Ok(_) => {
                    self.session_path = Some(path.clone());
                    self.set_status(format!("Saved {}", path.display()));
                }
                Err(err) => self.set_error(err.to_string()),
            }
        }
    }

    /// Attaches a rendered dub to the selected segment; its end follows the
    /// audio length.
    fn import_audio_dialog(&mut self) {
        let Some(segment_id) = self.editor.selected_segment().cloned() else {
            self.set_error("Select a segment first");
            return;
        };
        let Some(path) = FileDialog::new()
            .add_filter("Audio", &["wav", "mp3", "flac", "ogg"])
            .pick_file()
        else {
            return;
        };
        match audio_duration(&path) {
            Ok(duration) => {
                let command = TimelineCommand::AudioReady {
                    segment_id: segment_id.clone(),
                    url: path.to_string_lossy().into_owned(),
                    duration,
                };
                match self.editor.execute_command(command) {
                    Ok(()) => self.set_status(format!("Attached {} to {}", path.display(), segment_id)),
                    Err(err) => self.set_error(err.to_string()),
                }
            }
            Err(err) => self.set_error(err),
        }
    }

    fn set_status<S: Into<String>>(&mut self, msg: S) {
        self.status_line = msg.into();
        log::info!("{}", self.status_line);
    }

    fn set_error<E: Into<String>>(&mut self, err: E) {
        let msg = err.into();
        self.status_line = format!("Error: {msg}");
        log::error!("{msg}");
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

impl eframe::App for DubApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            self.menu_bar(ui);
        });

        TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.label(self.status_line.clone());
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.editor.ui(ui);
        });

        self.dispatch_jobs();
        for event in self.editor.take_events() {
            log::info!("[TimelineEvent] {:?}", event);
        }
    }
}

impl Drop for DubApp {
    fn drop(&mut self) {
        self.editor.shutdown();
    }
}
