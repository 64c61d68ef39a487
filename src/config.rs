use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub panel: PanelConfig,
    pub voice: VoiceConfig,
    pub hotkey: HotkeyConfig,
    pub telemetry: TelemetryConfig,
}

/// Remote document store connection
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Database root URL, e.g. `https://<project>.firebaseio.com`
    pub url: String,
    /// Database secret or ID token appended as `?auth=`
    #[serde(default)]
    pub auth: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PanelConfig {
    pub first_position: usize,
    pub position_count: usize,
    pub columns: usize,
    pub long_press_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VoiceConfig {
    pub model: String,
    pub model_path: String,
    pub threads: usize,
    pub beam_size: usize,
    pub vad_silence_ms: u32,
    pub vad_preroll_ms: u32,
    pub max_utterance_secs: u32,
    #[serde(default)]
    pub save_debug_wav: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HotkeyConfig {
    pub enabled: bool,
    pub modifiers: Vec<String>,
    pub key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub log_path: String,
}

const fn default_timeout_secs() -> u64 {
    10
}

const DEFAULT_CONFIG: &str = r#"[store]
url = "https://YOUR-PROJECT-default-rtdb.firebaseio.com"
timeout_secs = 10

[panel]
first_position = 1
position_count = 12
columns = 3
long_press_ms = 1000

[voice]
model = "tiny.en-q8_0"
model_path = "~/.spice-rack/models/ggml-tiny.en-q8_0.bin"
threads = 4
beam_size = 3
vad_silence_ms = 800
vad_preroll_ms = 300
max_utterance_secs = 15
save_debug_wav = false

[hotkey]
enabled = true
modifiers = ["Control", "Alt"]
key = "L"

[telemetry]
enabled = false
log_path = "~/.spice-rack/spice-rack.log"
"#;

impl Config {
    /// Load config from `path`, or ~/.spice-rack.toml when `None`
    ///
    /// A missing file is created with defaults first; its path is returned so the
    /// caller can report it once logging is up.
    ///
    /// # Errors
    /// Returns error if the file cannot be read, parsed, or fails validation
    pub fn load(path: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };

        let created = if config_path.exists() {
            None
        } else {
            Self::create_default(&config_path).context("failed to create default config")?;
            Some(config_path.clone())
        };

        let contents = fs::read_to_string(&config_path).context("failed to read config file")?;

        Ok((Self::parse(&contents)?, created))
    }

    /// Parse and validate a TOML config document
    ///
    /// # Errors
    /// Returns error on malformed TOML or invalid values
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).context("failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.panel.position_count == 0 {
            bail!("panel.position_count must be > 0");
        }
        if self.panel.columns == 0 {
            bail!("panel.columns must be > 0");
        }
        if self.voice.threads == 0 {
            bail!("voice.threads must be > 0");
        }
        if self.voice.beam_size == 0 {
            bail!("voice.beam_size must be > 0");
        }
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME environment variable not set")?;
        Ok(PathBuf::from(home).join(".spice-rack.toml"))
    }

    fn create_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("failed to create config directory")?;
        }
        fs::write(path, DEFAULT_CONFIG).context("failed to write default config")?;
        Ok(())
    }

    /// Expand ~ in paths to home directory
    ///
    /// # Errors
    /// Returns error if the path starts with `~/` and HOME is unset
    pub fn expand_path(path: &str) -> Result<PathBuf> {
        if let Some(stripped) = path.strip_prefix("~/") {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            Ok(PathBuf::from(home).join(stripped))
        } else {
            Ok(PathBuf::from(path))
        }
    }
}

impl PanelConfig {
    /// Every valid position index, in ascending order
    #[must_use]
    pub fn indices(&self) -> std::ops::Range<usize> {
        self.first_position..self.first_position + self.position_count
    }
}
