//! Configuration show/set.

use anyhow::{anyhow, bail, Result};

use dikta_core::model::registry::{self, EngineKind};
use dikta_core::{HotkeyConfig, Settings};

use crate::cli::ConfigSetArgs;

pub fn show() -> Result<()> {
    let settings = Settings::load();
    println!("{}", serde_json::to_string_pretty(&settings)?);
    println!("\nFile: {}", Settings::config_path().display());
    Ok(())
}

pub fn set(args: ConfigSetArgs) -> Result<()> {
    let mut settings = Settings::load();

    if let Some(language) = args.language {
        settings.language = language;
    }
    if let Some(model) = args.model {
        let desc = registry::get(&model)
            .ok_or_else(|| anyhow!("unknown model: {model} (see `dikta models list`)"))?;
        if !desc.engine.is_speech() {
            bail!("{model} is a correction model, not a recognition model");
        }
        settings.model_id = model;
    }
    if let Some(enabled) = args.correction {
        settings.correction.enabled = enabled;
    }
    if let Some(model) = args.correction_model {
        let desc = registry::get(&model)
            .ok_or_else(|| anyhow!("unknown model: {model} (see `dikta models list`)"))?;
        if desc.engine != EngineKind::Llm {
            bail!("{model} is not a correction model");
        }
        settings.correction.model_id = model;
    }
    if let Some(hotkey) = args.hotkey {
        settings.hotkey = parse_hotkey(&hotkey)?;
    }
    if let Some(notifications) = args.notifications {
        settings.notifications = notifications;
    }

    settings.save()?;
    println!("Saved to {}", Settings::config_path().display());
    Ok(())
}

/// Parse "ctrl+shift+space" into a hotkey binding.
fn parse_hotkey(s: &str) -> Result<HotkeyConfig> {
    let parts: Vec<&str> = s.split('+').map(str::trim).collect();
    let Some((key, modifiers)) = parts.split_last() else {
        bail!("empty hotkey");
    };
    if key.is_empty() {
        bail!("empty hotkey");
    }

    let mut mods = Vec::new();
    for m in modifiers {
        match m.to_lowercase().as_str() {
            "ctrl" | "shift" | "alt" | "super" => mods.push(m.to_lowercase()),
            other => bail!("unknown modifier: {other} (use ctrl, shift, alt, super)"),
        }
    }

    Ok(HotkeyConfig {
        modifiers: mods,
        key: key.to_lowercase(),
    })
}
