use std::io::{BufRead, Write};

use anyhow::{Context, Result};

use crate::cli::output::OutputOptions;
use crate::cli::renderer;
use crate::cli::run_cmd::build_registry;
use crate::cli::selector;
use crate::core::providers::ProviderKind;

/// Add an account. The provider comes from `--provider` or the interactive
/// picker; cookie/token material is read from stdin for providers that
/// need it (Cursor reads the local editor database instead).
pub fn add(name: String, provider: Option<String>, opts: &OutputOptions) -> Result<()> {
    let kind = match provider {
        Some(id) => ProviderKind::from_id(&id)
            .with_context(|| format!("Unknown provider: '{}'", id))?,
        None => match selector::select_provider()? {
            Some(kind) => kind,
            None => anyhow::bail!("Not a terminal; pass --provider <claude|cursor|glm>"),
        },
    };

    let secret = match kind {
        ProviderKind::Cursor => None,
        _ => Some(prompt_secret(kind)?),
    };

    let (registry, _settings) = build_registry()?;
    let id = registry.add(&name, kind, secret.as_deref())?;

    if opts.verbose {
        eprintln!("Account id: {}", id);
    }
    println!("Added {} ({})", name, kind.display_name());
    Ok(())
}

fn prompt_secret(kind: ProviderKind) -> Result<String> {
    eprint!("Paste {}: ", kind.auth_hint());
    std::io::stderr().flush().ok();

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read credential from stdin")?;
    let secret = line.trim().to_string();
    if secret.is_empty() {
        anyhow::bail!("No credential provided");
    }
    Ok(secret)
}

/// Remove an account by id, or by display name when it is unambiguous.
pub fn remove(target: &str) -> Result<()> {
    let (registry, _settings) = build_registry()?;

    let id = {
        let sessions = registry.sessions();
        if sessions.iter().any(|s| s.id() == target) {
            target.to_string()
        } else {
            let matches: Vec<_> = sessions.iter().filter(|s| s.name() == target).collect();
            match matches.as_slice() {
                [only] => only.id().to_string(),
                [] => anyhow::bail!("No account with id or name '{}'", target),
                _ => anyhow::bail!(
                    "Multiple accounts named '{}'; remove by id instead",
                    target
                ),
            }
        }
    };

    registry.remove(&id)?;
    println!("Removed {}", target);
    Ok(())
}

pub fn list(opts: &OutputOptions) -> Result<()> {
    let (registry, _settings) = build_registry()?;

    if registry.is_empty() {
        println!("No accounts configured.");
        return Ok(());
    }

    let mut sections = Vec::new();
    for session in registry.sessions() {
        let snapshot = session.snapshot();
        let mut text = renderer::render_account(
            session.name(),
            session.kind(),
            snapshot.as_ref(),
            None,
            opts.use_color,
        );
        if opts.verbose {
            text.push_str(&format!("\n  id: {}", session.id()));
        }
        sections.push(text);
    }
    println!("{}", sections.join("\n\n"));
    Ok(())
}
