use config::{Config, Environment, File};
use serde::Deserialize;

use crate::CLIENT_NAME;

const CONFIG_NAME: &str = "config.toml";
const SESSION_FILE_NAME: &str = "session.json";

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub api_url: String,
    pub user_id: String,
    pub session_file: String,
}

impl Settings {
    pub fn new(config_path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut s = Config::builder()
            .set_default("session_file", default_session_path())?
            .add_source(Environment::with_prefix("MATCHBOOK"));

        if let Some(path) = config_path {
            s = s.add_source(File::with_name(path));
        } else {
            s = s.add_source(File::with_name(&default_config_path()));
        }

        s.build()?.try_deserialize()
    }
}

fn default_session_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| std::env::temp_dir()))
        .join(CLIENT_NAME)
        .join(SESSION_FILE_NAME)
        .display()
        .to_string()
}

pub(crate) fn default_config_path() -> String {
    dirs::config_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| std::env::temp_dir()))
        .join(CLIENT_NAME)
        .join(CONFIG_NAME)
        .display()
        .to_string()
}
