use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use texbuild::graph::Outcome;
use texbuild::session::Session;

mod common;
use common::*;

const TEMP_PREFIX: &str = "texbuildtmp";

fn main() {
    if let Err(stop) = Cli::parse().run() {
        stop.exit();
    }
}

/// Build a LaTeX document read from standard input.
///
/// The source is saved to a temporary file in the current directory,
///     or in the directory given with --into,
///     and the built document is written to standard output.
/// Temporary files are removed afterwards.
#[derive(Debug, Parser)]
#[command(
    name = "texbuild-pipe",
    author = "The texbuild Project",
    version = "0.1",
    about,
    long_about,
    max_term_width(100)
)]
struct Cli {
    /// Keep the temporary files.
    #[arg(short = 'k', long)]
    keep: bool,

    #[command(flatten)]
    args: BuildArgs,
}

/// One more than the largest temporary number in use in the directory.
fn next_temp_number(dir: &Path) -> std::io::Result<u64> {
    let mut max = 0_u64;
    for entry in std::fs::read_dir(dir)? {
        let name = entry?.file_name();
        let Some(rest) = name.to_str().and_then(|n| n.strip_prefix(TEMP_PREFIX)) else {
            continue;
        };
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        if let Ok(n) = digits.parse::<u64>() {
            max = max.max(n);
        }
    }
    Ok(max + 1)
}

/// Creates a new temporary source file and returns its path.
///
/// The file is created exclusively, so concurrent runs in the same directory get distinct names.
fn create_temp_source(dir: &Path) -> std::io::Result<(PathBuf, File)> {
    let mut n = next_temp_number(dir)?;
    loop {
        let path = dir.join(format!("{TEMP_PREFIX}{n}.tex"));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => n += 1,
            Err(err) => return Err(err),
        }
    }
}

impl Cli {
    fn run(self) -> Result<(), Stop> {
        self.args.init();
        let dir = self.args.into.clone().unwrap_or_else(|| PathBuf::from("."));
        let io_error = |err: std::io::Error| Stop::Failed(err.to_string());
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text).map_err(io_error)?;
        let (source, mut file) = create_temp_source(&dir).map_err(io_error)?;
        if let Err(err) = file.write_all(text.as_bytes()) {
            texbuild::files::remove(&source);
            return Err(Stop::Failed(format!("cannot write {}: {err}", source.display())));
        }
        drop(file);
        tracing::debug!("saved the input as {}", source.display());

        let result = self.args.in_place(&source.display().to_string(), |source| {
            let mut session = Session::new(source, &self.args.options(true))?;
            let result = self.build(&mut session);
            if !self.keep {
                session.clean();
            }
            result
        });
        if !self.keep {
            if let Err(err) = std::fs::remove_file(&source) {
                tracing::warn!("cannot remove {}: {err}", source.display());
            }
        }
        result
    }

    fn build(&self, session: &mut Session) -> Result<(), Stop> {
        if session.build(false) == Outcome::Error {
            return Err(report_failure(session, &self.args));
        }
        let product = session
            .final_product()
            .ok_or_else(|| Stop::Failed("the build produced no document".to_string()))?;
        let bytes = std::fs::read(&product)
            .map_err(|err| Stop::Failed(format!("cannot read {}: {err}", product.display())))?;
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(&bytes)
            .and_then(|()| stdout.flush())
            .map_err(|err| Stop::Failed(err.to_string()))
    }
}
