use buildfarm_common::config::{self, ConfigFile, ScheduleConfig};
use buildfarm_common::errors::*;
use std::env;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub schedule: ScheduleConfig,
}

pub fn load(path: Option<&Path>) -> Result<Config> {
    let config = config::load(path)?;
    Ok(from_struct(config, env::var("DATABASE_URL").ok()))
}

pub fn from_struct(config: ConfigFile, database_url: Option<String>) -> Config {
    let database_url = if let Some(url) = database_url {
        url
    } else {
        config.database.path().to_string()
    };

    Config {
        database_url,
        schedule: config.schedule,
    }
}
