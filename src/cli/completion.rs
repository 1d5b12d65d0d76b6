//! Shell completion generation for batch-export
//!
//! Generates completion scripts for bash, zsh, fish and PowerShell, and adds
//! dynamic completion of product names to the bash script.

use clap::CommandFactory;
use clap_complete::{Shell, generate};
use std::io::{self, Write};

use crate::cli::CliArgs;
use crate::error::{ConfigError, Result};

const BIN_NAME: &str = "batch-export";

/// Generate a shell completion script on stdout
///
/// # Arguments
/// * `shell_name` - Shell type (bash, zsh, fish, powershell)
///
/// # Returns
/// * `Result<()>` - Success or error
pub fn generate_completion(shell_name: &str) -> Result<()> {
    let script = completion_script(parse_shell(shell_name)?);
    io::stdout().write_all(script.as_bytes())?;
    Ok(())
}

/// Parse shell name string to Shell enum
fn parse_shell(shell_name: &str) -> Result<Shell> {
    match shell_name.to_lowercase().as_str() {
        "bash" => Ok(Shell::Bash),
        "zsh" => Ok(Shell::Zsh),
        "fish" => Ok(Shell::Fish),
        "powershell" | "pwsh" => Ok(Shell::PowerShell),
        _ => Err(ConfigError::InvalidValue {
            field: "shell".to_string(),
            value: format!("{shell_name} (supported: bash, zsh, fish, powershell)"),
        }
        .into()),
    }
}

/// Render the completion script for a shell
pub fn completion_script(shell: Shell) -> String {
    let mut cmd = CliArgs::command();
    let mut buffer = Vec::new();
    generate(shell, &mut cmd, BIN_NAME, &mut buffer);
    let script = String::from_utf8_lossy(&buffer).into_owned();

    match shell {
        Shell::Bash => format!("{script}{BASH_PRODUCT_COMPLETION}"),
        _ => script,
    }
}

/// Completes `--product` from `batch-export products --names`
const BASH_PRODUCT_COMPLETION: &str = r#"
# Dynamic completion for product names
_batch_export_enhanced() {
    local cur prev
    cur="${COMP_WORDS[COMP_CWORD]}"
    prev="${COMP_WORDS[COMP_CWORD-1]}"

    if [[ "$prev" == "--product" || "$prev" == "--data-source" ]]; then
        local products=$(batch-export products --names 2>/dev/null)
        COMPREPLY=($(compgen -W "$products" -- "$cur"))
        return 0
    fi

    _batch-export "$@"
}

complete -F _batch_export_enhanced -o bashdefault -o default batch-export
"#;
