use anyhow::{anyhow, Context, Result};
use global_hotkey::{
    hotkey::{Code, HotKey, Modifiers},
    GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState,
};
use tracing::{debug, info};

use crate::config::HotkeyConfig;

/// Global shortcut that starts a voice session
pub struct ListenHotkey {
    manager: GlobalHotKeyManager,
    hotkey: HotKey,
}

impl ListenHotkey {
    /// Create and register the listen shortcut from config
    ///
    /// # Errors
    /// Returns error if the shortcut is malformed or the platform refuses the registration
    pub fn new(config: &HotkeyConfig) -> Result<Self> {
        let hotkey = Self::parse_hotkey(config)?;

        let manager = GlobalHotKeyManager::new().context("failed to create hotkey manager")?;
        manager
            .register(hotkey)
            .context("failed to register hotkey")?;

        info!("registered listen hotkey: {:?} + {}", config.modifiers, config.key);

        Ok(Self { manager, hotkey })
    }

    /// Whether an event is a press of the listen shortcut
    ///
    /// Releases and other shortcuts are ignored.
    #[must_use]
    pub fn is_trigger(&self, event: &GlobalHotKeyEvent) -> bool {
        if event.id != self.hotkey.id() {
            return false;
        }

        match event.state {
            HotKeyState::Pressed => {
                info!("listen hotkey pressed");
                true
            }
            HotKeyState::Released => {
                debug!("listen hotkey released (ignored)");
                false
            }
        }
    }

    fn parse_hotkey(config: &HotkeyConfig) -> Result<HotKey> {
        let modifiers = Self::parse_modifiers(&config.modifiers)?;
        let code = Self::parse_key(&config.key)?;
        Ok(HotKey::new(Some(modifiers), code))
    }

    fn parse_modifiers(modifiers: &[String]) -> Result<Modifiers> {
        let mut result = Modifiers::empty();
        for modifier in modifiers {
            match modifier.as_str() {
                "Control" | "Ctrl" => result |= Modifiers::CONTROL,
                "Option" | "Alt" => result |= Modifiers::ALT,
                "Command" | "Super" => result |= Modifiers::SUPER,
                "Shift" => result |= Modifiers::SHIFT,
                _ => return Err(anyhow!("unknown modifier: {}", modifier)),
            }
        }
        Ok(result)
    }

    fn parse_key(key: &str) -> Result<Code> {
        match key {
            "A" => Ok(Code::KeyA),
            "B" => Ok(Code::KeyB),
            "C" => Ok(Code::KeyC),
            "D" => Ok(Code::KeyD),
            "E" => Ok(Code::KeyE),
            "F" => Ok(Code::KeyF),
            "G" => Ok(Code::KeyG),
            "H" => Ok(Code::KeyH),
            "I" => Ok(Code::KeyI),
            "J" => Ok(Code::KeyJ),
            "K" => Ok(Code::KeyK),
            "L" => Ok(Code::KeyL),
            "M" => Ok(Code::KeyM),
            "N" => Ok(Code::KeyN),
            "O" => Ok(Code::KeyO),
            "P" => Ok(Code::KeyP),
            "Q" => Ok(Code::KeyQ),
            "R" => Ok(Code::KeyR),
            "S" => Ok(Code::KeyS),
            "T" => Ok(Code::KeyT),
            "U" => Ok(Code::KeyU),
            "V" => Ok(Code::KeyV),
            "W" => Ok(Code::KeyW),
            "X" => Ok(Code::KeyX),
            "Y" => Ok(Code::KeyY),
            "Z" => Ok(Code::KeyZ),
            "Space" => Ok(Code::Space),
            "F1" => Ok(Code::F1),
            "F2" => Ok(Code::F2),
            "F3" => Ok(Code::F3),
            "F4" => Ok(Code::F4),
            "F5" => Ok(Code::F5),
            "F6" => Ok(Code::F6),
            "F7" => Ok(Code::F7),
            "F8" => Ok(Code::F8),
            "F9" => Ok(Code::F9),
            "F10" => Ok(Code::F10),
            "F11" => Ok(Code::F11),
            "F12" => Ok(Code::F12),
            _ => Err(anyhow!("unsupported key: {}", key)),
        }
    }
}

impl Drop for ListenHotkey {
    fn drop(&mut self) {
        if let Err(e) = self.manager.unregister(self.hotkey) {
            tracing::error!("failed to unregister hotkey: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(modifiers: &[&str], key: &str) -> HotkeyConfig {
        HotkeyConfig {
            enabled: true,
            modifiers: modifiers.iter().map(|m| (*m).to_owned()).collect(),
            key: key.to_owned(),
        }
    }

    #[test]
    fn test_parse_modifiers_aliases() {
        let parsed =
            ListenHotkey::parse_modifiers(&["Ctrl".to_owned(), "Option".to_owned()]).unwrap();
        assert_eq!(parsed, Modifiers::CONTROL | Modifiers::ALT);
    }

    #[test]
    fn test_parse_unknown_modifier() {
        let err = ListenHotkey::parse_modifiers(&["Hyper".to_owned()]).unwrap_err();
        assert!(err.to_string().contains("unknown modifier: Hyper"));
    }

    #[test]
    fn test_parse_keys() {
        assert_eq!(ListenHotkey::parse_key("L").unwrap(), Code::KeyL);
        assert_eq!(ListenHotkey::parse_key("F9").unwrap(), Code::F9);
        assert!(ListenHotkey::parse_key("l").is_err());
        assert!(ListenHotkey::parse_key("Enter").is_err());
    }

    #[test]
    fn test_parse_default_hotkey() {
        let hotkey = ListenHotkey::parse_hotkey(&config(&["Control", "Alt"], "L")).unwrap();
        assert_eq!(
            hotkey,
            HotKey::new(Some(Modifiers::CONTROL | Modifiers::ALT), Code::KeyL)
        );
    }

    #[test]
    #[ignore = "requires a desktop session for global shortcuts"]
    fn test_trigger_only_on_press_of_own_id() {
        let hotkey = ListenHotkey::new(&config(&["Control", "Shift"], "F12")).unwrap();
        let press = GlobalHotKeyEvent {
            id: hotkey.hotkey.id(),
            state: HotKeyState::Pressed,
        };
        let release = GlobalHotKeyEvent {
            id: hotkey.hotkey.id(),
            state: HotKeyState::Released,
        };
        let other = GlobalHotKeyEvent {
            id: hotkey.hotkey.id().wrapping_add(1),
            state: HotKeyState::Pressed,
        };

        assert!(hotkey.is_trigger(&press));
        assert!(!hotkey.is_trigger(&release));
        assert!(!hotkey.is_trigger(&other));
    }
}
