//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.
//! Every section is `#[serde(default)]`, so a settings file only needs the
//! keys it wants to change.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// LiveConfig
// ---------------------------------------------------------------------------

/// Settings for the live speech session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Websocket endpoint of the bidirectional session.  The API key is
    /// appended as the `key` query parameter.
    pub endpoint: String,
    /// Model identifier, with or without the `models/` prefix.
    pub model: String,
    /// Prebuilt voice used for synthesized speech (e.g. `"Kore"`).
    pub voice: String,
    /// Free-text system instruction sent once when the session opens.
    pub system_instruction: String,
    /// Ask the server to stream a transcript of its own speech.
    pub output_transcription: bool,
    /// API key stored in the settings file.  The environment variable named by
    /// `api_key_env` takes precedence.
    pub api_key: Option<String>,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://generativelanguage.googleapis.com/ws/\
                       google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent"
                .into(),
            model: "gemini-2.5-flash-native-audio-preview-09-2025".into(),
            voice: "Kore".into(),
            system_instruction: "You are a concise, friendly voice assistant. \
                                 Answer in short spoken sentences."
                .into(),
            output_transcription: true,
            api_key: None,
            api_key_env: "GEMINI_API_KEY".into(),
        }
    }
}

impl LiveConfig {
    /// Resolve the API key from the process environment, then the settings
    /// file.  Read on every connect so a key exported after startup is seen.
    pub fn resolve_api_key(&self) -> Option<String> {
        pick_api_key(std::env::var(&self.api_key_env).ok(), self.api_key.as_deref())
    }
}

/// First non-blank candidate wins: environment, then configured value.
fn pick_api_key(from_env: Option<String>, configured: Option<&str>) -> Option<String> {
    from_env
        .as_deref()
        .into_iter()
        .chain(configured)
        .map(str::trim)
        .find(|key| !key.is_empty())
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for the microphone and speaker.
///
/// Wire sample rates are fixed (see [`crate::audio::CAPTURE_WIRE_RATE`] and
/// [`crate::audio::PLAYBACK_WIRE_RATE`]) and are not configurable here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Number of native-rate samples per capture frame.  Each frame yields
    /// one volume sample and one outbound packet.
    pub capture_block_size: usize,
    /// Input device name: `None` means the system default.
    pub input_device: Option<String>,
    /// Output device name: `None` means the system default.
    pub output_device: Option<String>,
    /// Linear gain applied to synthesized speech.
    pub output_gain: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            capture_block_size: 4096,
            input_device: None,
            output_device: None,
            output_gain: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use live_voice::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Live session settings.
    pub live: LiveConfig,
    /// Audio device settings.
    pub audio: AudioConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(original.live.endpoint, loaded.live.endpoint);
        assert_eq!(original.live.model, loaded.live.model);
        assert_eq!(original.live.voice, loaded.live.voice);
        assert_eq!(
            original.live.system_instruction,
            loaded.live.system_instruction
        );
        assert_eq!(
            original.live.output_transcription,
            loaded.live.output_transcription
        );
        assert_eq!(original.live.api_key, loaded.live.api_key);
        assert_eq!(original.live.api_key_env, loaded.live.api_key_env);

        assert_eq!(
            original.audio.capture_block_size,
            loaded.audio.capture_block_size
        );
        assert_eq!(original.audio.input_device, loaded.audio.input_device);
        assert_eq!(original.audio.output_gain, loaded.audio.output_gain);
    }

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config.live.voice, "Kore");
        assert_eq!(config.audio.capture_block_size, 4096);
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert!(cfg.live.endpoint.starts_with("wss://"));
        assert!(cfg.live.endpoint.ends_with("BidiGenerateContent"));
        assert!(!cfg.live.endpoint.contains(' '));
        assert_eq!(
            cfg.live.model,
            "gemini-2.5-flash-native-audio-preview-09-2025"
        );
        assert!(cfg.live.output_transcription);
        assert!(cfg.live.api_key.is_none());
        assert_eq!(cfg.live.api_key_env, "GEMINI_API_KEY");
        assert_eq!(cfg.audio.capture_block_size, 4096);
        assert_eq!(cfg.audio.output_gain, 1.0);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[live]\nvoice = \"Puck\"\n").unwrap();

        let cfg = AppConfig::load_from(&path).expect("load");
        assert_eq!(cfg.live.voice, "Puck");
        assert_eq!(cfg.live.api_key_env, "GEMINI_API_KEY");
        assert_eq!(cfg.audio.capture_block_size, 4096);
    }

    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modified.toml");

        let mut cfg = AppConfig::default();
        cfg.live.api_key = Some("secret".into());
        cfg.live.output_transcription = false;
        cfg.audio.input_device = Some("USB Mic".into());
        cfg.audio.capture_block_size = 2048;

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded.live.api_key.as_deref(), Some("secret"));
        assert!(!loaded.live.output_transcription);
        assert_eq!(loaded.audio.input_device.as_deref(), Some("USB Mic"));
        assert_eq!(loaded.audio.capture_block_size, 2048);
    }

    // ---- API key resolution ---

    #[test]
    fn env_key_wins_over_configured() {
        assert_eq!(
            pick_api_key(Some("from-env".into()), Some("from-file")).as_deref(),
            Some("from-env")
        );
    }

    #[test]
    fn configured_key_used_when_env_missing_or_blank() {
        assert_eq!(
            pick_api_key(None, Some("from-file")).as_deref(),
            Some("from-file")
        );
        assert_eq!(
            pick_api_key(Some("   ".into()), Some(" from-file ")).as_deref(),
            Some("from-file")
        );
    }

    #[test]
    fn blank_everywhere_is_absent() {
        assert!(pick_api_key(None, None).is_none());
        assert!(pick_api_key(Some(String::new()), Some("")).is_none());
    }

    #[test]
    fn unset_env_var_falls_back_to_file() {
        let cfg = LiveConfig {
            api_key: Some("file-key".into()),
            api_key_env: "LIVE_VOICE_TEST_KEY_THAT_IS_NEVER_SET".into(),
            ..LiveConfig::default()
        };
        assert_eq!(cfg.resolve_api_key().as_deref(), Some("file-key"));
    }
}
