// src/process/command.rs

//! Launch commands for managed processes.
//!
//! Commands run through `sh -c "exec ..."` so the shell is replaced by the
//! real program and signals reach it directly.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

/// Values substituted into a launch template.
#[derive(Debug, Clone, Copy)]
pub struct LaunchContext<'a> {
    pub identity: &'a str,
    pub directory: &'a Path,
    pub filename: &'a str,
}

/// How to launch a managed process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandTemplate {
    /// Free-form shell command. `{name}`, `{dir}` and `{file}` are replaced
    /// with shell-quoted values.
    Shell(String),
    /// Container image run through a CLI runtime (`docker`, `podman`, ...).
    /// The target directory is mounted read-only at `/data`.
    Container { runtime: String, image: String },
}

impl CommandTemplate {
    /// The command line handed to `sh -c`, without the leading `exec`.
    pub fn render(&self, ctx: &LaunchContext<'_>) -> String {
        match self {
            CommandTemplate::Shell(template) => template
                .replace("{name}", &shell_quote(ctx.identity))
                .replace("{dir}", &shell_quote(&ctx.directory.to_string_lossy()))
                .replace("{file}", &shell_quote(ctx.filename)),
            CommandTemplate::Container { runtime, image } => format!(
                "{runtime} run --rm -i --name {name} -v {mount} -e {env} {image}",
                runtime = shell_quote(runtime),
                name = shell_quote(ctx.identity),
                mount = shell_quote(&format!("{}:/data:ro", ctx.directory.to_string_lossy())),
                env = shell_quote(&format!("TARGET_FILE=/data/{}", ctx.filename)),
                image = shell_quote(image),
            ),
        }
    }

    /// Build the process command with piped stdio.
    ///
    /// stdin is piped and held open by the caller; some runtimes (`-i`)
    /// stop the container when it closes.
    pub fn build(&self, ctx: &LaunchContext<'_>) -> Command {
        let rendered = self.render(ctx);
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(rendered);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(format!("exec {rendered}"));
            c
        };
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// The runtime binary a container template depends on.
    pub fn runtime_binary(&self) -> Option<&str> {
        match self {
            CommandTemplate::Shell(_) => None,
            CommandTemplate::Container { runtime, .. } => Some(runtime),
        }
    }
}

impl fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandTemplate::Shell(cmd) => write!(f, "command `{cmd}`"),
            CommandTemplate::Container { runtime, image } => {
                write!(f, "image `{image}` via {runtime}")
            }
        }
    }
}

/// Quote `value` for POSIX `sh`, leaving plain words untouched.
pub fn shell_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | '@' | '+' | ','));
    if plain {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

/// Locate `binary` the way the shell would: as a path if it contains a
/// separator, otherwise by searching `PATH`.
pub fn find_executable(binary: &str) -> Option<PathBuf> {
    let candidate = Path::new(binary);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(binary))
        .find(|full| full.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(dir: &'a Path) -> LaunchContext<'a> {
        LaunchContext {
            identity: "model-server",
            directory: dir,
            filename: "model.bin",
        }
    }

    #[test]
    fn container_template_mounts_directory_read_only() {
        let template = CommandTemplate::Container {
            runtime: "docker".into(),
            image: "acme/server:1".into(),
        };
        let rendered = template.render(&ctx(Path::new("/srv/models")));
        assert_eq!(
            rendered,
            "docker run --rm -i --name model-server -v /srv/models:/data:ro \
             -e TARGET_FILE=/data/model.bin acme/server:1"
        );
    }

    #[test]
    fn shell_placeholders_are_quoted() {
        let template = CommandTemplate::Shell("serve --model {dir}/{file}".into());
        let rendered = template.render(&ctx(Path::new("/tmp/with space")));
        assert_eq!(rendered, "serve --model '/tmp/with space'/model.bin");
    }

    #[test]
    fn quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("plain-word"), "plain-word");
    }

    #[cfg(unix)]
    #[test]
    fn shell_is_found_on_path() {
        assert!(find_executable("sh").is_some());
        assert!(find_executable("definitely-not-a-real-binary-xyz").is_none());
    }
}
