use crate::errors::*;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_DATABASE_PATH: &str = "buildfarm.db";
pub const DEFAULT_CANDIDATE_LIMIT: i64 = 10;
/// Key of the global minimum score, per-processor floors use `minimum_score.<processor>`.
pub const MINIMUM_SCORE_KEY: &str = "minimum_score";

pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<ConfigFile> {
    let mut config = ConfigFile::default();

    if let Some(c) = load_from("/etc/buildfarm.conf")? {
        config.update(c);
    }

    if let Ok(path) = config_path() {
        if let Some(c) = load_from(path)? {
            config.update(c);
        }
    }

    if let Some(path) = path {
        let c = load_from(path)?.ok_or_else(|| format_err!("Failed to read config file"))?;
        config.update(c);
    }

    Ok(config)
}

fn config_path() -> Result<PathBuf> {
    let config_dir = dirs_next::config_dir().ok_or_else(|| format_err!("Failed to find config dir"))?;
    Ok(config_dir.join("buildfarm.conf"))
}

fn load_from<P: AsRef<Path>>(path: P) -> Result<Option<ConfigFile>> {
    if let Ok(buf) = fs::read_to_string(path.as_ref()) {
        debug!("loading config file {:?}", path.as_ref());
        let config = toml::from_str(&buf).context("Failed to load config")?;
        Ok(Some(config))
    } else {
        Ok(None)
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl ConfigFile {
    pub fn update(&mut self, c: ConfigFile) {
        self.database.update(c.database);
        self.schedule.update(c.schedule);
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: Option<String>,
}

impl DatabaseConfig {
    pub fn update(&mut self, c: DatabaseConfig) {
        if c.path.is_some() {
            self.path = c.path;
        }
    }

    pub fn path(&self) -> &str {
        self.path.as_deref().unwrap_or(DEFAULT_DATABASE_PATH)
    }
}

/// Scheduling knobs, read fresh for every candidate selection.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct ScheduleConfig {
    pub minimum_score: Option<i32>,
    #[serde(default)]
    pub minimum_scores: BTreeMap<String, i32>,
    pub candidate_limit: Option<i64>,
}

impl ScheduleConfig {
    pub fn update(&mut self, c: ScheduleConfig) {
        if c.minimum_score.is_some() {
            self.minimum_score = c.minimum_score;
        }
        self.minimum_scores.extend(c.minimum_scores);
        if c.candidate_limit.is_some() {
            self.candidate_limit = c.candidate_limit;
        }
    }

    /// Look up a setting by its flag name.
    ///
    /// `minimum_score` is the global floor and `minimum_score.<processor>` the
    /// floor of a single processor.
    pub fn lookup(&self, key: &str) -> Option<i32> {
        if key == MINIMUM_SCORE_KEY {
            self.minimum_score
        } else {
            key.strip_prefix(MINIMUM_SCORE_KEY)
                .and_then(|rest| rest.strip_prefix('.'))
                .and_then(|processor| self.minimum_scores.get(processor))
                .copied()
        }
    }

    /// The lowest score a build needs to be visible to builders of this processor.
    pub fn score_floor(&self, processor: &str) -> Option<i32> {
        let per_processor = self.lookup(&format!("{}.{}", MINIMUM_SCORE_KEY, processor));
        let global = self.lookup(MINIMUM_SCORE_KEY);
        per_processor.into_iter().chain(global).max()
    }

    pub fn candidate_limit(&self) -> i64 {
        self.candidate_limit.unwrap_or(DEFAULT_CANDIDATE_LIMIT)
    }
}
