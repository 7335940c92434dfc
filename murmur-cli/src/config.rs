use anyhow::{Context, Result, anyhow};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::state::ensure_murmur_home;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub owner_id: String,
    pub timezone: String,
    pub llm: LlmSection,
    pub transcription: TranscriptionSection,
    pub reminders: RemindersSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// Off by default; the heuristic parser and deterministic scorer need no key.
    pub enabled: bool,
    /// "openai" or "anthropic"
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionSection {
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemindersSection {
    pub sweep_interval_secs: u64,
    /// "desktop" or "stdout"
    pub notifier: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            owner_id: "me".to_string(),
            timezone: "UTC".to_string(),
            llm: LlmSection::default(),
            transcription: TranscriptionSection::default(),
            reminders: RemindersSection::default(),
        }
    }
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            timeout_secs: 20,
        }
    }
}

impl Default for TranscriptionSection {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            model: "whisper-1".to_string(),
        }
    }
}

impl Default for RemindersSection {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 30,
            notifier: "desktop".to_string(),
        }
    }
}

impl Config {
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("invalid timezone {:?} in config: {e}", self.timezone))
    }

    /// The loop never sleeps longer than a minute between sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.reminders.sweep_interval_secs.clamp(1, 60))
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs.max(1))
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_murmur_home()?.join("config.toml"))
}

pub fn load_config() -> Result<Config> {
    let p = config_path()?;
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    toml::from_str(&s).context("parse config.toml")
}

pub fn save_config(cfg: &Config) -> Result<()> {
    let p = config_path()?;
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn init_config(timezone: Option<String>) -> Result<()> {
    let p = config_path()?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    let mut cfg = Config::default();
    if let Some(tz) = timezone {
        cfg.timezone = tz;
        cfg.tz()?;
    }
    save_config(&cfg)?;
    println!("Wrote {}", p.display());
    Ok(())
}

pub fn show_config() -> Result<()> {
    let cfg = load_config()?;
    println!("# {}", config_path()?.display());
    print!("{}", toml::to_string_pretty(&cfg).context("serialize config")?);
    Ok(())
}
