use portable_pty::CommandBuilder;
use std::path::{Path, PathBuf};

use super::shell::ShellInvocation;

const TERM_PROGRAM_NAME: &str = "agentyard";
const COLORTERM_VALUE: &str = "truecolor";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    pub env_remove: Vec<String>,
}

impl CommandSpec {
    pub fn into_builder(self) -> CommandBuilder {
        let mut builder = CommandBuilder::new(self.program);
        for var in self.env_remove {
            builder.env_remove(var);
        }
        for arg in self.args {
            builder.arg(arg);
        }
        for (key, value) in self.env {
            builder.env(key, value);
        }
        builder.cwd(self.cwd);
        builder
    }
}

/// Interactive host shell for an agent session, started in `cwd`.
pub fn build_shell_command(
    shell: &ShellInvocation,
    cwd: &Path,
    cols: u16,
    rows: u16,
) -> CommandSpec {
    CommandSpec {
        program: shell.program.clone(),
        args: shell.args.clone(),
        cwd: cwd.to_path_buf(),
        env: build_environment(cols, rows),
        // Prompt hooks from the parent shell break prompt detection in the child.
        env_remove: vec!["PROMPT_COMMAND".to_string()],
    }
}

fn build_environment(cols: u16, rows: u16) -> Vec<(String, String)> {
    let mut env = vec![
        ("TERM".to_string(), "xterm-256color".to_string()),
        ("COLORTERM".to_string(), COLORTERM_VALUE.to_string()),
        ("TERM_PROGRAM".to_string(), TERM_PROGRAM_NAME.to_string()),
        ("LINES".to_string(), rows.to_string()),
        ("COLUMNS".to_string(), cols.to_string()),
    ];
    if std::env::var_os("LANG").is_none() {
        env.push(("LANG".to_string(), "en_US.UTF-8".to_string()));
    }
    env
}
