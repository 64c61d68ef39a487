//! End-to-end voice command flow
//!
//! Drives the panel through a full listen → transcribe → match → select cycle
//! with an in-memory store and scripted capture/transcription backends, so no
//! microphone, model file or network is needed.
//!
//! The live-model test is ignored; run it with:
//! cargo test --test voice_pipeline_test -- --ignored

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::json;
use spice_rack::audio::convert::encode_wav;
use spice_rack::audio::UtteranceSource;
use spice_rack::config::PanelConfig;
use spice_rack::panel::{Panel, LISTEN_LABEL};
use spice_rack::positions::PositionStore;
use spice_rack::store::{Document, MemoryStore, CURRENT_POSITION_KEY};
use spice_rack::transcription::{SpeechToText, Transcriber, TranscriptionError};
use spice_rack::voice::{VoiceEvent, VoiceSession};

/// Plays back one canned result per capture
struct ScriptedMicrophone {
    takes: Mutex<VecDeque<anyhow::Result<Vec<f32>>>>,
}

impl ScriptedMicrophone {
    fn new(takes: Vec<anyhow::Result<Vec<f32>>>) -> Self {
        Self {
            takes: Mutex::new(takes.into()),
        }
    }
}

impl UtteranceSource for ScriptedMicrophone {
    fn capture_utterance(&self) -> anyhow::Result<Vec<u8>> {
        let take = self
            .takes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("no more scripted takes")));
        encode_wav(&take?)
    }
}

/// Returns one canned transcript per call
struct ScriptedWhisper {
    transcripts: Mutex<VecDeque<Vec<&'static str>>>,
}

impl ScriptedWhisper {
    fn new(transcripts: Vec<Vec<&'static str>>) -> Self {
        Self {
            transcripts: Mutex::new(transcripts.into()),
        }
    }
}

impl SpeechToText for ScriptedWhisper {
    fn transcribe(&self, audio_data: &[f32]) -> Result<Vec<String>, TranscriptionError> {
        assert!(!audio_data.is_empty());
        let segments = self.transcripts.lock().unwrap().pop_front().unwrap_or_default();
        Ok(segments.into_iter().map(str::to_owned).collect())
    }
}

fn panel_config() -> PanelConfig {
    PanelConfig {
        first_position: 1,
        position_count: 12,
        columns: 3,
        long_press_ms: 1000,
    }
}

fn seeded_store() -> MemoryStore {
    let mut document = Document::new();
    document.insert("1".to_owned(), json!("Salt"));
    document.insert("3".to_owned(), json!("Cumin"));
    document.insert("7".to_owned(), json!("Paprika"));
    document.insert(CURRENT_POSITION_KEY.to_owned(), json!(1));
    MemoryStore::with_document(document)
}

fn kiosk(
    store: MemoryStore,
    microphone: ScriptedMicrophone,
    whisper: ScriptedWhisper,
) -> Panel<MemoryStore> {
    let rack = PositionStore::open(store, panel_config().indices()).unwrap();
    let (tx, rx) = crossbeam_channel::unbounded();
    let transcriber = Transcriber::new(Arc::new(whisper)).with_vad_filter(false);
    let session = VoiceSession::new(
        Arc::new(microphone),
        Arc::new(transcriber),
        rack.shared_names(),
        tx,
    );
    Panel::new(rack, &panel_config(), rx).with_voice(session)
}

fn listen_until_done(panel: &mut Panel<MemoryStore>) {
    assert!(panel.start_listening());
    let deadline = Instant::now() + Duration::from_secs(5);
    while panel.is_listening() {
        assert!(Instant::now() < deadline, "voice session never finished");
        panel.tick(Instant::now());
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_spoken_name_moves_rack_and_persists() {
    let store = seeded_store();
    let mut panel = kiosk(
        store.clone(),
        ScriptedMicrophone::new(vec![Ok(vec![0.2; 8000])]),
        ScriptedWhisper::new(vec![vec!["Please add", "CUMIN."]]),
    );

    listen_until_done(&mut panel);

    assert_eq!(panel.rack().current(), Some(3));
    assert_eq!(store.snapshot().get(CURRENT_POSITION_KEY), Some(&json!(3)));
    assert_eq!(panel.listen_label(), LISTEN_LABEL);

    let rendered = panel.render();
    assert!(rendered.contains("*POS 3: Cumin"));
    assert!(rendered.contains(" POS 1: Salt"));
}

#[test]
fn test_unrecognized_speech_leaves_rack_alone() {
    let store = seeded_store();
    let mut panel = kiosk(
        store.clone(),
        ScriptedMicrophone::new(vec![Ok(vec![0.2; 8000])]),
        ScriptedWhisper::new(vec![vec!["what time is it"]]),
    );
    let writes = store.write_count();

    listen_until_done(&mut panel);

    assert_eq!(panel.rack().current(), Some(1));
    assert_eq!(store.write_count(), writes);
    assert_eq!(panel.status(), "No spice name recognized");
}

#[test]
fn test_microphone_failure_recovers_for_next_session() {
    let mut panel = kiosk(
        seeded_store(),
        ScriptedMicrophone::new(vec![
            Err(anyhow::anyhow!("no input device available")),
            Ok(vec![0.2; 8000]),
        ]),
        ScriptedWhisper::new(vec![vec!["paprika"]]),
    );

    listen_until_done(&mut panel);
    assert!(panel.status().contains("no input device available"));
    assert_eq!(panel.rack().current(), Some(1));

    listen_until_done(&mut panel);
    assert_eq!(panel.rack().current(), Some(7));
}

#[test]
fn test_rename_is_heard_by_next_session() {
    let mut panel = kiosk(
        seeded_store(),
        ScriptedMicrophone::new(vec![Ok(vec![0.2; 8000]), Ok(vec![0.2; 8000])]),
        ScriptedWhisper::new(vec![vec!["turmeric"], vec!["turmeric"]]),
    );

    listen_until_done(&mut panel);
    assert_eq!(panel.rack().current(), Some(1));

    panel.hold(5, Instant::now());
    panel.edit_input("Turmeric");
    panel.accept_edit();

    listen_until_done(&mut panel);
    assert_eq!(panel.rack().current(), Some(5));
}

#[test]
fn test_session_posts_exactly_one_completion() {
    let (tx, rx) = crossbeam_channel::unbounded();
    let rack = PositionStore::open(seeded_store(), panel_config().indices()).unwrap();
    let session = VoiceSession::new(
        Arc::new(ScriptedMicrophone::new(vec![Ok(vec![0.2; 8000])])),
        Arc::new(Transcriber::new(Arc::new(ScriptedWhisper::new(vec![vec!["salt salt salt"]]))).with_vad_filter(false)),
        rack.shared_names(),
        tx,
    );

    session.start().unwrap().join().unwrap();

    let events: Vec<VoiceEvent> = rx.try_iter().collect();
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, VoiceEvent::PositionSelected(1)))
            .count(),
        1
    );
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, VoiceEvent::Finished(_)))
            .count(),
        1
    );
}

#[test]
#[ignore = "requires actual model file"]
fn test_live_model_on_silence_selects_nothing() {
    use spice_rack::config::Config;
    use spice_rack::transcription::TranscriptionEngine;

    let Ok(model_path) = Config::expand_path("~/.spice-rack/models/ggml-tiny.en-q8_0.bin") else {
        return;
    };
    if !model_path.exists() {
        return;
    }

    let engine = TranscriptionEngine::new(&model_path, 4, 3).unwrap();
    let transcriber = Transcriber::new(Arc::new(engine));
    let rack = PositionStore::new(MemoryStore::new(), panel_config().indices());

    let transcript = transcriber.transcribe(&vec![0.0; 16_000], 16_000);
    assert_eq!(
        rack.shared_names()
            .read(|names| spice_rack::matcher::resolve(transcript, names)),
        None
    );
}
