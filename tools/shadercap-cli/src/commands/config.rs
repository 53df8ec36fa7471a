//! Show and edit the persisted configuration.

use std::path::{Path, PathBuf};

use shadercap_common::config::{AppConfig, ExportPreferences};
use shadercap_session_model::{ExportSettings, JsonSettingsStore};

pub fn show(config: &AppConfig) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

pub fn set(config_path: &Path, key: &str, value: &str) -> anyhow::Result<()> {
    let store = JsonSettingsStore::open(config_path);

    let mut prefs = store.config().export;
    apply_preference(&mut prefs, key, value)?;
    ExportSettings::from(&prefs)
        .validate()
        .map_err(|e| anyhow::anyhow!("Rejected {key}={value}: {e}"))?;

    store.update(|export| *export = prefs);
    store
        .save()
        .map_err(|e| anyhow::anyhow!("Failed to save {}: {e}", config_path.display()))?;
    println!("{key} = {value}");
    Ok(())
}

/// Set one export preference from its textual form.
pub fn apply_preference(prefs: &mut ExportPreferences, key: &str, value: &str) -> anyhow::Result<()> {
    match key {
        "width" => prefs.width = parse(key, value)?,
        "height" => prefs.height = parse(key, value)?,
        "fps" => prefs.fps = parse(key, value)?,
        "start_time_secs" => prefs.start_time_secs = parse(key, value)?,
        "duration_secs" => prefs.duration_secs = parse(key, value)?,
        "output_directory" => prefs.output_directory = PathBuf::from(value),
        "crf" => prefs.crf = parse(key, value)?,
        "mp4" => prefs.mp4 = parse(key, value)?,
        "gif" => prefs.gif = parse(key, value)?,
        "gif_max_width" => prefs.gif_max_width = parse(key, value)?,
        "keep_frames" => prefs.keep_frames = parse(key, value)?,
        _ => {
            return Err(anyhow::anyhow!(
                "Unknown setting: {key}. Use: width, height, fps, start_time_secs, \
                 duration_secs, output_directory, crf, mp4, gif, gif_max_width, keep_frames"
            ))
        }
    }
    Ok(())
}

fn parse<T>(key: &str, value: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid value for {key}: {value} ({e})"))
}
