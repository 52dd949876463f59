// pm-backup/src/runner/mod.rs
use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::{debug, info, warn};

use crate::config::DbConfig;
use crate::errors::Result;
use crate::utils::find_executable;

/// Environment variable the PostgreSQL client tools read the password from.
pub const PASSWORD_ENV: &str = "PGPASSWORD";

/// Fast-path dump/restore through external client tools.
///
/// Both calls block until the tool exits and return its exit code. A
/// non-zero code is a normal outcome at this layer; only a tool that cannot
/// be launched at all is an `Err`.
pub trait ToolRunner: Send + Sync {
    fn run_dump(&self, db: &DbConfig, output_file: &Path) -> Result<i32>;

    fn run_restore_tool(&self, db: &DbConfig, input_file: &Path) -> Result<i32>;
}

#[derive(Debug, Clone)]
pub struct ProcessRunner {
    dump_tool: String,
    restore_tool: String,
}

impl ProcessRunner {
    pub fn new(dump_tool: impl Into<String>, restore_tool: impl Into<String>) -> Self {
        ProcessRunner {
            dump_tool: dump_tool.into(),
            restore_tool: restore_tool.into(),
        }
    }

    pub fn dump_tool(&self) -> &str {
        &self.dump_tool
    }

    pub fn restore_tool(&self) -> &str {
        &self.restore_tool
    }

    fn run(&self, tool: &str, args: Vec<OsString>, password: &str) -> Result<i32> {
        let executable = find_executable(tool)?;
        debug!(tool = %executable.display(), ?args, "Launching client tool");

        // The password only ever travels through the environment.
        let output = Command::new(&executable)
            .args(&args)
            .env(PASSWORD_ENV, password)
            .stdin(Stdio::null())
            .output()?;

        let code = output.status.code().unwrap_or(-1);
        if output.status.success() {
            info!(tool = %tool, "Client tool finished");
        } else {
            warn!(
                tool = %tool,
                code,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Client tool exited with failure status"
            );
        }
        Ok(code)
    }
}

impl ToolRunner for ProcessRunner {
    fn run_dump(&self, db: &DbConfig, output_file: &Path) -> Result<i32> {
        self.run(&self.dump_tool, dump_args(db, output_file), &db.password)
    }

    fn run_restore_tool(&self, db: &DbConfig, input_file: &Path) -> Result<i32> {
        self.run(&self.restore_tool, restore_args(db, input_file), &db.password)
    }
}

fn connection_args(db: &DbConfig) -> Vec<OsString> {
    vec![
        "-h".into(),
        db.host.clone().into(),
        "-p".into(),
        db.port.to_string().into(),
        "-U".into(),
        db.user.clone().into(),
        "-d".into(),
        db.name.clone().into(),
    ]
}

/// Data only: a restore truncates the existing tables and keeps the schema,
/// so the dump must not try to recreate it.
pub fn dump_args(db: &DbConfig, output_file: &Path) -> Vec<OsString> {
    let mut args = connection_args(db);
    args.push("-f".into());
    args.push(output_file.as_os_str().to_owned());
    args.push("--data-only".into());
    args.push("--no-password".into());
    args
}

/// psql exits 0 after failed statements unless told to stop on the first
/// one; with `ON_ERROR_STOP` a broken script yields exit code 3.
pub fn restore_args(db: &DbConfig, input_file: &Path) -> Vec<OsString> {
    let mut args = connection_args(db);
    args.push("-X".into());
    args.push("-v".into());
    args.push("ON_ERROR_STOP=1".into());
    args.push("-f".into());
    args.push(input_file.as_os_str().to_owned());
    args
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::errors::AppError;

    fn db() -> DbConfig {
        DbConfig {
            host: "db.local".to_string(),
            port: 6543,
            name: "estates".to_string(),
            user: "manager".to_string(),
            password: "s3cret".to_string(),
            ..DbConfig::default()
        }
    }

    #[test]
    fn test_dump_args() {
        let args = dump_args(&db(), Path::new("/tmp/b/out.sql"));
        let expected: Vec<OsString> = [
            "-h", "db.local", "-p", "6543", "-U", "manager", "-d", "estates", "-f",
            "/tmp/b/out.sql", "--data-only", "--no-password",
        ]
        .iter()
        .map(OsString::from)
        .collect();

        assert_eq!(args, expected);
    }

    #[test]
    fn test_restore_args_never_contain_password() {
        let args = restore_args(&db(), Path::new("in.sql"));

        assert_eq!(args.len(), 13);
        assert_eq!(args[11], OsString::from("-f"));
        assert_eq!(args[12], OsString::from("in.sql"));
        assert!(args.iter().all(|a| !a.to_string_lossy().contains("s3cret")));
    }

    #[test]
    fn test_restore_args_stop_on_first_error() {
        let args = restore_args(&db(), Path::new("in.sql"));

        let flag = args.iter().position(|a| a == "-v");
        assert_eq!(
            flag.and_then(|i| args.get(i + 1)),
            Some(&OsString::from("ON_ERROR_STOP=1"))
        );
    }

    /// Stand-in for psql that fails only when asked to stop on errors, the
    /// way real psql reports a script with a broken statement.
    #[cfg(unix)]
    #[test]
    fn test_restore_tool_failure_is_reported() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let tool = fake_psql(dir.path())?;
        let runner = ProcessRunner::new("false", tool.to_string_lossy());

        assert_eq!(runner.run_restore_tool(&db(), Path::new("in.sql"))?, 3);
        Ok(())
    }

    #[cfg(unix)]
    pub(crate) fn fake_psql(dir: &Path) -> anyhow::Result<std::path::PathBuf> {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("psql");
        std::fs::write(
            &path,
            "#!/bin/sh\ncase \"$*\" in *ON_ERROR_STOP=1*) exit 3 ;; esac\nexit 0\n",
        )?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        Ok(path)
    }

    #[test]
    fn test_missing_tool_is_an_error() {
        let runner = ProcessRunner::new("pm-backup-no-such-dump", "pm-backup-no-such-restore");

        let err = runner.run_dump(&db(), Path::new("out.sql")).unwrap_err();
        assert!(matches!(err, AppError::ToolNotFound { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_codes_are_returned() -> anyhow::Result<()> {
        let failing = ProcessRunner::new("false", "false");
        assert_ne!(failing.run_dump(&db(), Path::new("out.sql"))?, 0);

        let succeeding = ProcessRunner::new("true", "true");
        assert_eq!(succeeding.run_restore_tool(&db(), Path::new("in.sql"))?, 0);
        Ok(())
    }
}
