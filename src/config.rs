use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;

use crate::library::selector::{SelectionPolicy, DEFAULT_RECENT_WINDOW};

pub struct Config {
    pub video_dir: PathBuf,
    pub static_dir: PathBuf,
    pub ffprobe_bin: String,
    pub host: String,
    pub port: u16,
    pub policy: SelectionPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let video_dir = PathBuf::from(get("VIDEO_DIR").unwrap_or("./videos".to_string()));
        let static_dir = PathBuf::from(get("STATIC_DIR").unwrap_or("./static".to_string()));
        let ffprobe_bin = get("FFPROBE_BIN").unwrap_or("ffprobe".to_string());

        let host = get("WEBSERVER_HOST").unwrap_or("127.0.0.1".to_string());
        let port = get("WEBSERVER_PORT")
            .unwrap_or("8080".to_string())
            .parse()
            .context("WEBSERVER_PORT must be a valid u16")?;

        let mut policy = match get("CLIP_POLICY").as_deref().unwrap_or("balanced") {
            "balanced" => SelectionPolicy::balanced(),
            "uniform" => SelectionPolicy::uniform(),
            other => bail!("CLIP_POLICY must be 'balanced' or 'uniform', got '{other}'"),
        };
        if policy.recent_window > 0 {
            policy.recent_window = get("CLIP_RECENT_WINDOW")
                .unwrap_or(DEFAULT_RECENT_WINDOW.to_string())
                .parse()
                .context("CLIP_RECENT_WINDOW must be a non-negative integer")?;
        }

        Ok(Self {
            video_dir,
            static_dir,
            ffprobe_bin,
            host,
            port,
            policy,
        })
    }
}
