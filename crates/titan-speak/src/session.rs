//! Interactive speech session.
//!
//! Plain lines are synthesized in the background and recorded in a
//! [`SpeechHistory`]. `:` commands list, play, stop and remove entries. Stdin is
//! read on its own thread; everything else, including controller completions,
//! runs on the loop thread.

use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, select};
use speech_player::{
    CpalSink, EncodedAudio, EntryId, EntryStatus, PlayOutcome, PlaybackController, SpeechHistory,
};

use crate::config::Settings;
use crate::tts::TtsClient;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Speak(String),
    List,
    Play(u64),
    Stop,
    Remove(u64),
    Help,
    Quit,
    Empty,
    Invalid(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix(':') else {
        return Input::Speak(line.to_string());
    };
    let mut words = command.split_whitespace();
    let name = words.next().unwrap_or_default();
    let arg = words.next();
    let id = || arg.and_then(|a| a.parse::<u64>().ok());
    match (name, arg) {
        ("list" | "ls", None) => Input::List,
        ("stop", None) => Input::Stop,
        ("help" | "h", None) => Input::Help,
        ("quit" | "q", None) => Input::Quit,
        ("play" | "p", Some(_)) => id().map(Input::Play).unwrap_or_else(|| invalid(line)),
        ("rm", Some(_)) => id().map(Input::Remove).unwrap_or_else(|| invalid(line)),
        _ => invalid(line),
    }
}

fn invalid(line: &str) -> Input {
    Input::Invalid(line.to_string())
}

type Generated = (EntryId, Result<EncodedAudio>);

struct Session {
    settings: Settings,
    client: Arc<TtsClient>,
    history: SpeechHistory,
    controller: PlaybackController<CpalSink>,
    generated_tx: Sender<Generated>,
}

pub fn run(settings: &Settings, interrupted: Arc<AtomicBool>) -> Result<()> {
    let client = Arc::new(TtsClient::new(&settings.tts)?);
    let mut controller = PlaybackController::new(CpalSink::new(settings.playback.clone()));
    controller.on_ended(|entry| println!("[{entry}] finished"));

    let (generated_tx, generated_rx) = crossbeam_channel::unbounded();
    let mut session = Session {
        settings: settings.clone(),
        client,
        history: SpeechHistory::new(),
        controller,
        generated_tx,
    };
    let lines = spawn_stdin_reader();

    print_help();
    loop {
        session.controller.poll();
        if interrupted.swap(false, Ordering::SeqCst) {
            // Ctrl-C stops playback first; a second one while idle quits.
            if session.controller.stop().is_none() {
                break;
            }
            println!("stopped");
            continue;
        }

        select! {
            recv(lines) -> line => match line {
                Ok(line) => {
                    if !session.handle(parse_input(&line)) {
                        break;
                    }
                }
                Err(_) => break,
            },
            recv(generated_rx) -> msg => {
                if let Ok((id, result)) = msg {
                    session.settle(id, result);
                }
            },
            default(POLL_INTERVAL) => {}
        }
    }

    session.controller.stop();
    tracing::info!("session closed");
    Ok(())
}

impl Session {
    /// Returns `false` when the session should end.
    fn handle(&mut self, input: Input) -> bool {
        match input {
            Input::Speak(text) => self.generate(text),
            Input::List => self.list(),
            Input::Play(raw) => self.play(EntryId::new(raw)),
            Input::Stop => match self.controller.stop() {
                Some(entry) => println!("[{entry}] stopped"),
                None => println!("nothing is playing"),
            },
            Input::Remove(raw) => self.remove(EntryId::new(raw)),
            Input::Help => print_help(),
            Input::Quit => return false,
            Input::Empty => {}
            Input::Invalid(line) => println!("unknown command: {line} (try :help)"),
        }
        true
    }

    fn generate(&mut self, text: String) {
        let Some(id) = self.history.begin(&text) else {
            println!("still generating the previous clip");
            return;
        };
        println!("[{id}] generating...");
        let client = self.client.clone();
        let tx = self.generated_tx.clone();
        std::thread::spawn(move || {
            let result = client.synthesize(&text);
            let _ = tx.send((id, result));
        });
    }

    fn settle(&mut self, id: EntryId, result: Result<EncodedAudio>) {
        match result {
            Ok(audio) => {
                if self.history.complete(id, audio) {
                    println!("[{id}] ready (:play {id})");
                }
            }
            Err(e) => {
                tracing::warn!(entry = %id, "speech generation failed: {e:#}");
                if self.history.fail(id, format!("{e:#}")) {
                    println!("[{id}] failed: {e:#}");
                }
            }
        }
    }

    fn list(&self) {
        if self.history.is_empty() {
            println!("no clips yet");
            return;
        }
        let playing = self.controller.current();
        for entry in self.history.iter() {
            let status = match &entry.status {
                EntryStatus::Pending => "generating".to_string(),
                EntryStatus::Ready(_) if playing == Some(entry.id) => "playing".to_string(),
                EntryStatus::Ready(_) => "ready".to_string(),
                EntryStatus::Failed(reason) => format!("failed: {reason}"),
            };
            println!(
                "[{}] {:>4}s ago  {:<10}  {}",
                entry.id,
                age_secs(entry.timestamp),
                status,
                entry.text
            );
        }
    }

    fn play(&mut self, id: EntryId) {
        let Some(entry) = self.history.get(id) else {
            println!("no clip {id}");
            return;
        };
        let Some(audio) = entry.audio() else {
            println!("clip {id} has no audio");
            return;
        };
        let playback = &self.settings.playback;
        let buffer = match audio.decode(playback.sample_rate, playback.channels) {
            Ok(buffer) => Arc::new(buffer),
            Err(e) => {
                tracing::warn!(entry = %id, "decode failed: {e}");
                println!("clip {id} could not be decoded: {e}");
                return;
            }
        };
        match self.controller.play(id, buffer) {
            Ok(PlayOutcome::Started(_)) => println!("[{id}] playing"),
            Ok(PlayOutcome::AlreadyPlaying) => println!("[{id}] already playing"),
            Ok(PlayOutcome::Rejected { active }) => {
                println!("[{active}] is playing; :stop it first")
            }
            Err(e) => {
                tracing::warn!(entry = %id, "playback failed: {e}");
                println!("playback failed: {e}");
            }
        }
    }

    fn remove(&mut self, id: EntryId) {
        if self.controller.current() == Some(id) {
            self.controller.stop();
        }
        match self.history.remove(id) {
            Some(_) => println!("[{id}] removed"),
            None => println!("no clip {id}"),
        }
    }
}

fn age_secs(timestamp: SystemTime) -> u64 {
    timestamp.elapsed().map(|d| d.as_secs()).unwrap_or(0)
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("stdin read failed: {e}");
                    break;
                }
            }
        }
    });
    rx
}

fn print_help() {
    println!("type text to synthesize it, or:");
    println!("  :list        show clips");
    println!("  :play N      play clip N");
    println!("  :stop        stop playback");
    println!("  :rm N        remove clip N");
    println!("  :quit        exit");
}
