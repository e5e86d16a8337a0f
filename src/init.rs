use std::fs::OpenOptions;
use std::io::{stdin, stdout, Write};
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::settings;

#[derive(Debug, Serialize)]
struct ConfigSeed {
    api_url: String,
    user_id: String,
}

fn to_config(api_url: &str, user_id: &str) -> Result<ConfigSeed> {
    if api_url.is_empty() {
        return Err(anyhow!("backend API URL must not be empty"));
    }
    if user_id.is_empty() {
        return Err(anyhow!("user ID must not be empty"));
    }

    Ok(ConfigSeed {
        api_url: api_url.trim_end_matches('/').to_string(),
        user_id: user_id.to_string(),
    })
}

pub(crate) async fn run(conf_path: Option<&str>) -> Result<()> {
    let path: PathBuf = match conf_path {
        Some(p) => p.into(),
        None => settings::default_config_path().into(),
    };

    let mut buf = String::new();
    print!("Backend API URL: ");
    stdout().flush()?;

    let stdin = stdin();
    stdin.read_line(&mut buf)?;

    print!("User ID: ");
    stdout().flush()?;
    stdin.read_line(&mut buf)?;

    let mut lines = buf.lines();
    let api_url = lines.next().unwrap_or_default().trim();
    let user_id = lines.next().unwrap_or_default().trim();

    let seed = to_config(api_url, user_id)?;

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let mut fd = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)?;
    write!(fd, "{}", toml::to_string_pretty(&seed)?)?;

    println!("Wrote {}.", path.display());

    Ok(())
}
