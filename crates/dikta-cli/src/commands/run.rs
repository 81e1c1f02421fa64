//! Interactive dictation session in the terminal.
//!
//! The terminal stands in for the global hotkey: space toggles recording,
//! with the same debounce the desktop hotkey layer applies, so key repeat
//! cannot double-toggle.

use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use console::style;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

use dikta_core::audio::AudioSource;
use dikta_core::{Pipeline, PipelineEvent, SessionState, Settings};

use crate::cli::RunArgs;

/// Suppresses duplicate presses from key repeat.
const DEBOUNCE: Duration = Duration::from_millis(300);

pub async fn execute(args: RunArgs) -> Result<()> {
    let mut settings = Settings::load();
    if let Some(model) = args.model {
        settings.model_id = model;
    }
    if let Some(language) = args.language {
        settings.language = language;
    }
    if args.correct || args.correction_model.is_some() {
        settings.correction.enabled = true;
    }
    if let Some(model) = args.correction_model {
        settings.correction.model_id = model;
    }

    let audio = open_audio(args.device.as_deref())?;
    let pipeline = Pipeline::new(&settings, audio)?;
    pipeline.load_initial_engine(&settings).map_err(|e| {
        anyhow!("{e}\nDownload models with: dikta models download <id>")
    })?;

    let events = pipeline.subscribe();
    let printer = tokio::spawn(print_events(events));

    println!(
        "Model: {}  Language: {}  Correction: {}",
        settings.model_id,
        settings.language,
        if settings.correction.enabled {
            "on"
        } else {
            "off"
        }
    );
    println!("Space: toggle recording   c: cancel   q: quit");

    let result = input_loop(&pipeline);

    pipeline.close();
    printer.abort();
    result
}

#[cfg(feature = "microphone")]
fn open_audio(device: Option<&str>) -> Result<Box<dyn AudioSource>> {
    use dikta_core::audio::mic::MicSource;
    Ok(match device {
        Some(name) => Box::new(MicSource::with_device(name)),
        None => Box::new(MicSource::new()),
    })
}

#[cfg(not(feature = "microphone"))]
fn open_audio(_device: Option<&str>) -> Result<Box<dyn AudioSource>> {
    anyhow::bail!("this build has no microphone support (rebuild with --features microphone)")
}

fn input_loop(pipeline: &Pipeline) -> Result<()> {
    enable_raw_mode()?;
    let result = read_keys(pipeline);
    disable_raw_mode()?;
    result
}

fn read_keys(pipeline: &Pipeline) -> Result<()> {
    let session = pipeline.session();
    let mut last_toggle = Instant::now() - DEBOUNCE;

    loop {
        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        // Only press edges act; releases and repeats are not toggles.
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match key.code {
            KeyCode::Char(' ') => {
                if last_toggle.elapsed() >= DEBOUNCE {
                    last_toggle = Instant::now();
                    session.toggle();
                }
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                session.cancel();
                return Ok(());
            }
            KeyCode::Char('c') => session.cancel(),
            KeyCode::Enter => session.accept_result(),
            KeyCode::Char('q') | KeyCode::Esc => {
                session.cancel();
                return Ok(());
            }
            _ => {}
        }
    }
}

async fn print_events(mut rx: tokio::sync::broadcast::Receiver<PipelineEvent>) {
    // Raw mode needs explicit carriage returns.
    while let Ok(ev) = rx.recv().await {
        match ev {
            PipelineEvent::StateChanged(state) => {
                if state == SessionState::Idle {
                    print!("{}\r\n", style("idle").dim());
                }
            }
            PipelineEvent::RecordingStarted => {
                print!("{}\r\n", style("● recording").red());
            }
            PipelineEvent::Processing => {
                print!("{}\r\n", style("… transcribing").yellow());
            }
            PipelineEvent::Result {
                original,
                corrected,
            } => {
                match corrected {
                    Some(text) => {
                        print!("{}\r\n", style(&text).green().bold());
                        print!("{} {original}\r\n", style("raw:").dim());
                    }
                    None => print!("{}\r\n", style(&original).green().bold()),
                }
                print!("{}\r\n", style("Enter to finish, space to dictate again").dim());
            }
            PipelineEvent::Empty => {
                print!("{}\r\n", style("(no speech detected)").dim());
            }
            PipelineEvent::Error(kind) => {
                print!("{} {kind:?}\r\n", style("error:").red());
            }
            PipelineEvent::ModelSwapped { model_id } => {
                print!("model: {model_id}\r\n");
            }
            PipelineEvent::Download(_) => {}
        }
    }
}
