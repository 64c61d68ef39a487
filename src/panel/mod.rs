//! Toolkit-independent kiosk surface: position grid, edit dialog, listen control
//!
//! The panel owns the rack and runs on the interactive thread. Input arrives as
//! timestamped press/release events; voice results arrive on a channel drained by
//! [`Panel::tick`].

pub mod edit;
pub mod gesture;

pub use edit::{EditAction, EditDialog};
pub use gesture::{Gesture, PressTracker};

use crossbeam_channel::Receiver;
use std::fmt::Write as _;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::PanelConfig;
use crate::positions::{PositionError, PositionStore};
use crate::store::DocumentStore;
use crate::voice::{SessionOutcome, VoiceEvent, VoiceSession};

/// Hint shown above the grid
pub const HINT_LABEL: &str = "Long Press to Modify Position";
/// Listen control while idle
pub const LISTEN_LABEL: &str = "Start Listening";
/// Listen control while a session runs
pub const LISTENING_LABEL: &str = "Listening...";

/// Label of one position control
#[must_use]
pub fn position_label(index: usize, name: &str) -> String {
    format!("POS {index}: {name}")
}

/// Interactive state of the kiosk
pub struct Panel<S> {
    rack: PositionStore<S>,
    columns: usize,
    press: PressTracker,
    dialog: Option<EditDialog>,
    voice: Option<VoiceSession>,
    voice_events: Receiver<VoiceEvent>,
    listening: bool,
    status: String,
}

impl<S: DocumentStore> Panel<S> {
    /// Creates a panel over a loaded rack
    ///
    /// `voice_events` is the receiving end of the channel voice sessions post to.
    pub fn new(
        rack: PositionStore<S>,
        config: &PanelConfig,
        voice_events: Receiver<VoiceEvent>,
    ) -> Self {
        Self {
            rack,
            columns: config.columns.max(1),
            press: PressTracker::new(Duration::from_millis(config.long_press_ms)),
            dialog: None,
            voice: None,
            voice_events,
            listening: false,
            status: String::new(),
        }
    }

    /// Enables the listen control
    #[must_use]
    pub fn with_voice(mut self, session: VoiceSession) -> Self {
        self.voice = Some(session);
        self
    }

    pub const fn rack(&self) -> &PositionStore<S> {
        &self.rack
    }

    pub fn into_rack(self) -> PositionStore<S> {
        self.rack
    }

    /// Last status message
    pub fn status(&self) -> &str {
        &self.status
    }

    pub const fn is_listening(&self) -> bool {
        self.listening
    }

    /// Text of the listen control
    pub const fn listen_label(&self) -> &'static str {
        if self.listening {
            LISTENING_LABEL
        } else {
            LISTEN_LABEL
        }
    }

    pub const fn editor(&self) -> Option<&EditDialog> {
        self.dialog.as_ref()
    }

    /// Moves the rack to `index` (tap or voice match)
    ///
    /// # Errors
    /// Returns error for an unknown index or if the store rejects the write. The
    /// local selection still moves when only the store write fails.
    pub fn select_position(&mut self, index: usize) -> Result<Option<usize>, PositionError> {
        let previous = self.rack.set_current(index);
        match &previous {
            Ok(_) => self.set_status(format!("Moved to POS {index}")),
            Err(e) => self.set_status(format!("Move to POS {index} failed: {e}")),
        }
        previous
    }

    /// Finger down on a position control
    pub fn press(&mut self, index: usize, now: Instant) {
        if self.dialog.is_some() {
            debug!(index, "press ignored while editing");
            return;
        }
        self.press.press(index, now);
    }

    /// Finger up on a position control
    pub fn release(&mut self, index: usize, now: Instant) {
        if let Some(gesture) = self.press.release(index, now) {
            self.apply_gesture(gesture);
        }
    }

    /// Press and release without delay
    pub fn tap(&mut self, index: usize, now: Instant) {
        self.press(index, now);
        self.release(index, now);
    }

    /// Press held past the long-press threshold, then released
    pub fn hold(&mut self, index: usize, now: Instant) {
        let held_until = now + self.press.threshold();
        self.press(index, now);
        self.tick(held_until);
        self.release(index, held_until);
    }

    /// Periodic work on the interactive thread
    ///
    /// Fires pending long presses and applies voice results. Returns the number
    /// of voice events handled.
    pub fn tick(&mut self, now: Instant) -> usize {
        if let Some(gesture) = self.press.poll(now) {
            self.apply_gesture(gesture);
        }
        self.drain_voice_events()
    }

    fn apply_gesture(&mut self, gesture: Gesture) {
        debug!(gesture = ?gesture, "gesture recognized");
        match gesture {
            Gesture::Tap(index) => {
                let _ = self.select_position(index);
            }
            Gesture::LongPress(index) => self.open_editor(index),
        }
    }

    /// Opens the edit dialog for `index`
    pub fn open_editor(&mut self, index: usize) {
        if !self.rack.indices().contains(&index) {
            self.set_status(format!("No such position: {index}"));
            return;
        }
        self.press.reset();
        self.dialog = Some(EditDialog::new(index));
        self.set_status(format!("Editing POS {index}"));
    }

    /// Types into the open dialog
    ///
    /// Returns `false` when no dialog is open.
    pub fn edit_input(&mut self, text: &str) -> bool {
        if let Some(dialog) = self.dialog.as_mut() {
            dialog.set_input(text);
            true
        } else {
            self.set_status("No edit dialog open; hold a position first".to_owned());
            false
        }
    }

    /// Presses OK in the open dialog
    pub fn accept_edit(&mut self) {
        if let Some(dialog) = self.dialog.take() {
            let index = dialog.index();
            self.apply_edit(index, dialog.accept());
        }
    }

    /// Presses "clear" in the open dialog
    pub fn clear_edit(&mut self) {
        if let Some(dialog) = self.dialog.take() {
            let index = dialog.index();
            self.apply_edit(index, dialog.clear());
        }
    }

    /// Dismisses the open dialog
    pub fn cancel_edit(&mut self) {
        if let Some(dialog) = self.dialog.take() {
            let index = dialog.index();
            self.apply_edit(index, dialog.cancel());
        }
    }

    fn apply_edit(&mut self, index: usize, action: EditAction) {
        let result = match action {
            EditAction::Rename(name) => self.rack.rename(index, &name).map(|renamed| {
                if renamed {
                    format!("POS {index} is now {name}")
                } else {
                    format!("POS {index} unchanged")
                }
            }),
            EditAction::Clear => self
                .rack
                .clear(index)
                .map(|()| format!("POS {index} cleared")),
            EditAction::Cancel => Ok(format!("Edit of POS {index} cancelled")),
        };

        match result {
            Ok(message) => self.set_status(message),
            Err(e) => {
                warn!(index, "edit not saved: {e}");
                self.set_status(format!("Saving POS {index} failed: {e}"));
            }
        }
    }

    /// Starts a voice session unless one is already running
    ///
    /// Returns whether a session was started.
    pub fn start_listening(&mut self) -> bool {
        if self.listening {
            debug!("listen ignored: already listening");
            return false;
        }
        let Some(voice) = &self.voice else {
            self.set_status("Voice control unavailable".to_owned());
            return false;
        };

        match voice.start() {
            Ok(_worker) => {
                self.listening = true;
                self.set_status(LISTENING_LABEL.to_owned());
                true
            }
            Err(e) => {
                self.set_status(format!("Cannot listen: {e}"));
                false
            }
        }
    }

    /// Applies every pending voice event
    pub fn drain_voice_events(&mut self) -> usize {
        let events: Vec<VoiceEvent> = self.voice_events.try_iter().collect();
        let handled = events.len();

        for event in events {
            match event {
                VoiceEvent::PositionSelected(index) => {
                    info!(index, "voice selected position");
                    let _ = self.select_position(index);
                }
                VoiceEvent::Finished(outcome) => {
                    self.listening = false;
                    match outcome {
                        SessionOutcome::Matched(_) => {}
                        SessionOutcome::NoMatch => {
                            self.set_status("No spice name recognized".to_owned());
                        }
                        SessionOutcome::Failed(reason) => {
                            self.set_status(format!("Listening failed: {reason}"));
                        }
                    }
                }
            }
        }

        handled
    }

    /// Reloads names and the current position from the store
    ///
    /// # Errors
    /// Returns error if the document cannot be fetched; local state is kept
    pub fn refresh(&mut self) -> Result<(), PositionError> {
        match self.rack.load() {
            Ok(_) => {
                self.set_status("Reloaded from store".to_owned());
                Ok(())
            }
            Err(e) => {
                self.set_status(format!("Reload failed: {e}"));
                Err(e.into())
            }
        }
    }

    /// Draws the panel as text
    ///
    /// Positions fill columns top to bottom, left to right; the current one is
    /// marked with `*`.
    pub fn render(&self) -> String {
        let positions = self.rack.positions();
        let rows = positions.len().div_ceil(self.columns);

        let cells: Vec<String> = positions
            .iter()
            .map(|p| {
                let marker = if p.selected { '*' } else { ' ' };
                format!("{marker}{}", position_label(p.index, &p.name))
            })
            .collect();
        let width = cells.iter().map(|c| c.chars().count()).max().unwrap_or(0);

        let mut out = format!("{HINT_LABEL} | [{}] | [Exit]\n", self.listen_label());
        for row in 0..rows {
            let line: Vec<String> = (0..self.columns)
                .filter_map(|column| cells.get(column * rows + row))
                .map(|cell| format!("[{cell:<width$}]"))
                .collect();
            let _ = writeln!(out, "{}", line.join(" "));
        }
        if let Some(dialog) = &self.dialog {
            let _ = writeln!(out, "{}", dialog.render());
        }
        if !self.status.is_empty() {
            let _ = writeln!(out, "{}", self.status);
        }
        out
    }

    fn set_status(&mut self, message: String) {
        debug!(status = %message, "panel status");
        self.status = message;
    }
}
