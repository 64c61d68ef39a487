pub mod hotkey;

pub use hotkey::ListenHotkey;
