//! `vmemo config`: edit the configuration file in place.

use crate::config::{get_config_path, VmemoConfig};
use std::path::Path;
use std::process::Command;

const FALLBACK_EDITORS: [&str; 2] = ["nano", "vi"];

/// Editor program plus any arguments given in `$EDITOR`.
#[derive(Debug, PartialEq, Eq)]
struct EditorCommand {
    program: String,
    args: Vec<String>,
}

impl EditorCommand {
    fn parse(value: &str) -> Option<Self> {
        let mut words = value.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self {
            program,
            args: words.collect(),
        })
    }
}

/// Opens the config file in an editor and validates the result.
///
/// A missing file is created with defaults first. The editor is taken from
/// `$EDITOR` (arguments allowed, e.g. `code --wait`), else nano, else vi.
///
/// # Errors
/// - If no editor is available or it exits with a failure
/// - If the saved file no longer parses
pub fn handle_config() -> anyhow::Result<()> {
    let config_path = get_config_path()?;
    if !config_path.exists() {
        tracing::info!("Writing default config to {}", config_path.display());
        VmemoConfig::default().save_to(&config_path)?;
    }

    let editor = resolve_editor(std::env::var("EDITOR").ok(), on_path).ok_or_else(|| {
        anyhow::anyhow!("No editor found. Set $EDITOR or install nano or vi.")
    })?;
    tracing::debug!("Editing {} with {:?}", config_path.display(), editor);
    run_editor(&editor, &config_path)?;

    VmemoConfig::load_from(&config_path)
        .map_err(|e| anyhow::anyhow!("Config saved but invalid: {e}"))?;
    println!("Configuration OK: {}", config_path.display());
    Ok(())
}

fn run_editor(editor: &EditorCommand, path: &Path) -> anyhow::Result<()> {
    let status = Command::new(&editor.program)
        .args(&editor.args)
        .arg(path)
        .status()
        .map_err(|e| anyhow::anyhow!("Failed to launch '{}': {e}", editor.program))?;

    if status.success() {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "'{}' exited with code {}",
            editor.program,
            status.code().unwrap_or(-1)
        ))
    }
}

/// `$EDITOR` when set, otherwise the first fallback that `is_available`.
fn resolve_editor(
    env_editor: Option<String>,
    is_available: impl Fn(&str) -> bool,
) -> Option<EditorCommand> {
    if let Some(editor) = env_editor.as_deref().and_then(EditorCommand::parse) {
        return Some(editor);
    }
    FALLBACK_EDITORS
        .into_iter()
        .find(|name| is_available(*name))
        .and_then(EditorCommand::parse)
}

fn on_path(program: &str) -> bool {
    Command::new("which")
        .arg(program)
        .output()
        .is_ok_and(|output| output.status.success())
}
