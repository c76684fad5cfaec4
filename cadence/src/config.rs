use anyhow::{Context, Result};
use directories::ProjectDirs;
use ratatui::style::Color;
use serde::Deserialize;
use std::fs;

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "cadence", "Cadence")
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub theme: Theme,
    pub icons: Icons,
    pub runner: RunnerSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RunnerSettings {
    /// How often the host polls the engine.
    pub poll_interval_ms: u64,
    pub snapshot_interval_secs: i64,
    /// Running snapshots older than this are discarded on startup.
    pub staleness_secs: i64,
    /// Cycle count used when neither `--cycles` nor `--unlimited` is given.
    /// Zero means unlimited.
    pub default_cycles: u32,
    pub notifications: bool,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            snapshot_interval_secs: cadence_core::persistence::DEFAULT_WRITE_INTERVAL_SECS,
            staleness_secs: cadence_core::persistence::DEFAULT_STALENESS_SECS,
            default_cycles: 1,
            notifications: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Theme {
    #[serde(deserialize_with = "hex_to_color")]
    pub background: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub foreground: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub selection: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub black: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub red: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub green: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub yellow: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub blue: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub magenta: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub cyan: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub gray: Color,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Icons {
    pub timer: String,
    pub interval_list: String,
    pub work: String,
    pub rest: String,
    pub play: String,
    pub pause: String,
    pub stop: String,
    pub select: String,
    pub separator: String,
    pub header_left: String,
    pub header_right: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            background: Color::Rgb(9, 14, 19),
            foreground: Color::Rgb(197, 201, 199),
            selection: Color::Rgb(230, 195, 132),
            black: Color::Rgb(13, 12, 12),
            red: Color::Rgb(228, 104, 118),
            green: Color::Rgb(138, 154, 123),
            yellow: Color::Rgb(196, 178, 138),
            blue: Color::Rgb(127, 180, 202),
            magenta: Color::Rgb(162, 146, 163),
            cyan: Color::Rgb(122, 168, 159),
            gray: Color::Rgb(164, 167, 164),
        }
    }
}

impl Default for Icons {
    fn default() -> Self {
        Self {
            timer: "Δ".to_string(),
            interval_list: "⬢".to_string(),
            work: "●".to_string(),
            rest: "○".to_string(),
            play: "▶".to_string(),
            pause: "⏸".to_string(),
            stop: "■".to_string(),
            select: "▸".to_string(),
            separator: "│".to_string(),
            header_left: "⟪ ".to_string(),
            header_right: " ⟫".to_string(),
        }
    }
}

fn hex_to_color<'de, D>(deserializer: D) -> Result<Color, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = serde::Deserialize::deserialize(deserializer)?;
    if !s.starts_with('#') || s.len() != 7 {
        return Err(serde::de::Error::custom("invalid hex color format"));
    }
    let r = u8::from_str_radix(&s[1..3], 16).map_err(serde::de::Error::custom)?;
    let g = u8::from_str_radix(&s[3..5], 16).map_err(serde::de::Error::custom)?;
    let b = u8::from_str_radix(&s[5..7], 16).map_err(serde::de::Error::custom)?;
    Ok(Color::Rgb(r, g, b))
}

pub fn load_config() -> Result<Config> {
    match project_dirs() {
        Some(proj_dirs) => {
            let path = proj_dirs.config_dir().join("config.toml");
            if path.exists() {
                let config_str = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file at {:?}", path))?;
                toml::from_str(&config_str)
                    .with_context(|| format!("Failed to parse config file at {:?}", path))
            } else {
                Ok(Config::default())
            }
        }
        None => Ok(Config::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config: Config = toml::from_str(
            r##"
            [theme]
            red = "#ff0000"

            [runner]
            poll_interval_ms = 100
            default_cycles = 0
            "##,
        )
        .unwrap();

        assert_eq!(config.theme.red, Color::Rgb(255, 0, 0));
        assert_eq!(config.theme.green, Theme::default().green);
        assert_eq!(config.runner.poll_interval_ms, 100);
        assert_eq!(config.runner.default_cycles, 0);
        assert_eq!(config.runner.staleness_secs, 60);
        assert!(config.runner.notifications);
    }

    #[test]
    fn rejects_bad_hex_color() {
        let err = toml::from_str::<Config>("[theme]\nblue = \"blue\"\n").unwrap_err();
        assert!(err.to_string().contains("invalid hex color format"));
    }
}
