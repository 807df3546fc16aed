use anyhow::{Context, Result};

use crate::cli::output::OutputOptions;
use crate::core::settings::Settings;

/// Write a default config file, refusing to clobber an existing one.
pub fn init(opts: &OutputOptions) -> Result<()> {
    let path = Settings::config_path();
    if path.exists() {
        anyhow::bail!("Config already exists at {}", path.display());
    }
    let written = Settings::default()
        .save()
        .context("Failed to write config file")?;
    println!("Wrote {}", written.display());
    if opts.verbose {
        eprintln!("Edit thresholds and notification toggles there, then run `quotabar config check`.");
    }
    Ok(())
}

/// Validate the config file and report issues.
pub fn check(_opts: &OutputOptions) -> Result<()> {
    let settings = Settings::load().context("Failed to load config")?;
    let issues = settings.validate();
    if issues.is_empty() {
        println!("Config OK ({})", Settings::config_path().display());
        return Ok(());
    }
    for issue in &issues {
        eprintln!("  - {}", issue);
    }
    anyhow::bail!("{} issue(s) found", issues.len());
}
