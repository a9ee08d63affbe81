use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellInvocation {
    pub program: String,
    pub args: Vec<String>,
}

#[cfg(target_os = "macos")]
const FALLBACK_SHELL: &str = "/bin/zsh";
#[cfg(all(unix, not(target_os = "macos")))]
const FALLBACK_SHELL: &str = "/bin/bash";
#[cfg(windows)]
const FALLBACK_SHELL: &str = "powershell.exe";

/// Resolves the shell agents run in: configured override, then `$SHELL`,
/// then the platform default.
pub fn effective_shell(configured: Option<&str>) -> ShellInvocation {
    let env_shell = if cfg!(windows) {
        None
    } else {
        std::env::var("SHELL").ok()
    };
    resolve_shell(configured, env_shell.as_deref())
}

fn resolve_shell(configured: Option<&str>, env_shell: Option<&str>) -> ShellInvocation {
    let program = [configured, env_shell]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|candidate| !candidate.is_empty())
        .unwrap_or(FALLBACK_SHELL)
        .to_string();
    let args = login_args(&program);
    ShellInvocation { program, args }
}

fn login_args(program: &str) -> Vec<String> {
    let name = Path::new(program)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(program);
    match name {
        "bash" | "zsh" | "fish" => vec!["-l".to_string()],
        "powershell.exe" | "pwsh" | "pwsh.exe" => vec!["-NoLogo".to_string()],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_shell_wins() {
        let shell = resolve_shell(Some("/usr/local/bin/fish"), Some("/bin/bash"));
        assert_eq!(shell.program, "/usr/local/bin/fish");
        assert_eq!(shell.args, vec!["-l"]);
    }

    #[test]
    fn falls_back_to_env_then_default() {
        assert_eq!(resolve_shell(None, Some("/bin/zsh")).program, "/bin/zsh");
        assert_eq!(resolve_shell(Some("  "), None).program, FALLBACK_SHELL);
    }

    #[test]
    fn unknown_shells_get_no_login_flag() {
        assert!(resolve_shell(Some("/bin/dash"), None).args.is_empty());
    }
}
