use std::{env, path::PathBuf, time::Duration};

use crate::fileutils::{canonize_path, expand_user, is_directory};

pub const APPLICATION_NAME: &str = "dsandgrains";
pub const VIEWPORT_WIDTH: u32 = 800;
pub const VIEWPORT_HEIGHT: u32 = 600;
pub const FRAME_PERIOD_MS: u64 = 20;
pub const DEFAULT_HOME: &str = "~/.dsandgrains";
pub const DEFAULT_BACKGROUND: &str = "assets/dsandgrains_background.png";

#[derive(Clone, Debug)]
pub struct Settings {
    pub instances_root: PathBuf,
    pub frame_period: Duration,
    pub background: PathBuf,
}

impl Settings {
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(home) = env::var("DSANDGRAINS_HOME") {
            settings.instances_root = resolve_home(&home);
        }
        if let Some(ms) = env::var("DSANDGRAINS_FRAME_MS")
            .ok()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .filter(|ms| *ms > 0)
        {
            settings.frame_period = Duration::from_millis(ms);
        }
        if let Ok(path) = env::var("DSANDGRAINS_BACKGROUND") {
            settings.background = PathBuf::from(path);
        }
        settings
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            instances_root: resolve_home(DEFAULT_HOME),
            frame_period: Duration::from_millis(FRAME_PERIOD_MS),
            background: PathBuf::from(DEFAULT_BACKGROUND),
        }
    }
}

fn resolve_home(raw: &str) -> PathBuf {
    let path = if raw.contains('~') {
        expand_user(raw).unwrap_or_else(|| PathBuf::from(raw))
    } else {
        PathBuf::from(raw)
    };
    // A missing home is created later by the instances worker.
    match is_directory(&path) {
        Some(true) => canonize_path(&path).unwrap_or(path),
        _ => path,
    }
}
