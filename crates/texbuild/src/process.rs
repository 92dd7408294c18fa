//! Running external programs.
//!
//! Programs run with standard input closed.
//! Their standard error is read line by line on a separate thread while the program runs,
//!     and the lines are handed to the caller, in order, before [run] returns.
//!
//! An interrupt from the user sets a process-wide flag (see [interrupt]).
//! The build stops at the next call to [run], or as soon as the running program exits.
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;

use crate::{files, Error, Result};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Records that the user asked the build to stop.
pub fn interrupt() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

pub fn is_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Returns [Error::Interrupted] if the user asked the build to stop.
pub fn check_interrupted() -> Result<()> {
    if is_interrupted() {
        Err(Error::Interrupted)
    } else {
        Ok(())
    }
}

/// Where the standard output of a program goes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Output {
    #[default]
    Discard,
    Capture,
    File(PathBuf),
}

/// A program invocation.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub argv: Vec<String>,
    pub env: Vec<(String, OsString)>,
    pub cwd: Option<PathBuf>,
    pub stdout: Output,
}

impl Invocation {
    pub fn new<I: IntoIterator<Item = S>, S: Into<String>>(argv: I) -> Invocation {
        Invocation {
            argv: argv.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn env<S: Into<OsString>>(mut self, name: &str, value: S) -> Invocation {
        self.env.push((name.to_string(), value.into()));
        self
    }

    pub fn cwd(mut self, cwd: PathBuf) -> Invocation {
        self.cwd = Some(cwd);
        self
    }

    pub fn stdout(mut self, stdout: Output) -> Invocation {
        self.stdout = stdout;
        self
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }
}

impl std::fmt::Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.argv.join(" "))
    }
}

/// Result of a finished program.
#[derive(Debug, Clone)]
pub struct Completed {
    pub status: Option<i32>,
    pub success: bool,
    pub stdout: Vec<u8>,
}

impl Completed {
    /// Converts an unsuccessful exit into [Error::Tool].
    pub fn check(self, program: &str) -> Result<Completed> {
        if self.success {
            Ok(self)
        } else {
            Err(Error::Tool {
                program: program.to_string(),
                status: self.status,
            })
        }
    }
}

/// Runs a program and waits for it.
///
/// Every line the program writes to standard error is passed to `on_stderr` before this function returns.
pub fn run(invocation: &Invocation, on_stderr: &mut dyn FnMut(&str)) -> Result<Completed> {
    check_interrupted()?;
    let program = invocation.program();
    if program.is_empty() {
        return Err(Error::config("empty command line"));
    }
    tracing::debug!("running: {invocation}");
    let mut command = Command::new(program);
    command
        .args(&invocation.argv[1..])
        .stdin(Stdio::null())
        .stderr(Stdio::piped());
    for (name, value) in &invocation.env {
        command.env(name, value);
    }
    if let Some(cwd) = &invocation.cwd {
        command.current_dir(cwd);
    }
    match &invocation.stdout {
        Output::Discard => {
            command.stdout(Stdio::null());
        }
        Output::Capture => {
            command.stdout(Stdio::piped());
        }
        Output::File(path) => {
            let file = std::fs::File::create(path).map_err(|e| Error::io(path, e))?;
            command.stdout(Stdio::from(file));
        }
    }
    let mut child = command.spawn().map_err(|source| Error::Spawn {
        program: program.to_string(),
        source,
    })?;

    let (sender, receiver) = mpsc::channel::<String>();
    let reader = child.stderr.take().map(|stderr| {
        std::thread::spawn(move || {
            for line in BufReader::new(stderr).lines().map_while(std::result::Result::ok) {
                if sender.send(line).is_err() {
                    break;
                }
            }
        })
    });
    let mut stdout = Vec::new();
    if let Some(mut out) = child.stdout.take() {
        if let Err(err) = out.read_to_end(&mut stdout) {
            tracing::warn!("failed to read the output of `{program}`: {err}");
        }
    }
    let status = child.wait().map_err(|source| Error::Spawn {
        program: program.to_string(),
        source,
    })?;
    if let Some(reader) = reader {
        if reader.join().is_err() {
            tracing::warn!("the reader of `{program}`'s error stream panicked");
        }
    }
    for line in receiver.try_iter() {
        on_stderr(&line);
    }
    check_interrupted()?;
    tracing::debug!("`{program}` exited with {status}");
    Ok(Completed {
        status: status.code(),
        success: status.success(),
        stdout,
    })
}

/// Runs a program and fails unless it exits successfully.
///
/// Standard error is logged as warnings.
pub fn run_checked(invocation: &Invocation) -> Result<Completed> {
    let program = invocation.program().to_string();
    run(invocation, &mut |line| tracing::warn!("{program}: {line}"))?.check(&program)
}

/// Builds a search path variable such as `TEXINPUTS`.
///
/// The result lists the given directories, then the inherited value of the variable,
///     and ends with a separator so that the tool's built-in default path is searched too.
pub fn search_path_var(name: &str, dirs: &[PathBuf]) -> OsString {
    let mut entries: Vec<PathBuf> = dirs.iter().map(|d| files::absolute(d)).collect();
    if let Some(inherited) = std::env::var_os(name) {
        entries.extend(std::env::split_paths(&inherited).filter(|p| !p.as_os_str().is_empty()));
    }
    let mut value = std::env::join_paths(&entries).unwrap_or_else(|err| {
        tracing::warn!("cannot build {name}: {err}");
        OsString::new()
    });
    value.push(if cfg!(windows) { ";" } else { ":" });
    value
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn stderr_lines_are_delivered_in_order() {
        let invocation = Invocation::new(["sh", "-c", "echo one >&2; echo two >&2; echo out"])
            .stdout(Output::Capture);
        let mut lines = Vec::new();
        let completed = run(&invocation, &mut |line| lines.push(line.to_string())).unwrap();
        assert!(completed.success);
        assert_eq!(lines, vec!["one", "two"]);
        assert_eq!(completed.stdout, b"out\n");
    }

    #[test]
    fn failure_status() {
        let invocation = Invocation::new(["sh", "-c", "exit 3"]);
        let completed = run(&invocation, &mut |_| {}).unwrap();
        assert!(!completed.success);
        assert_eq!(completed.status, Some(3));
        assert!(matches!(
            completed.check("sh"),
            Err(Error::Tool {
                status: Some(3),
                ..
            })
        ));
    }

    #[test]
    fn missing_program() {
        let invocation = Invocation::new(["texbuild-no-such-program"]);
        assert!(matches!(
            run(&invocation, &mut |_| {}),
            Err(Error::Spawn { .. })
        ));
    }

    #[test]
    fn output_to_file_and_environment() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let invocation = Invocation::new(["sh", "-c", "printf %s \"$GREETING\""])
            .env("GREETING", "hello")
            .stdout(Output::File(out.clone()));
        run_checked(&invocation).unwrap();
        assert_eq!(std::fs::read_to_string(out).unwrap(), "hello");
    }

    #[test]
    fn search_path_ends_with_separator() {
        let value = search_path_var("TEXBUILD_TEST_UNSET_PATH", &[PathBuf::from("/opt/styles")]);
        assert_eq!(value, OsString::from("/opt/styles:"));
    }
}
