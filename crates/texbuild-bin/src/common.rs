//! Flags and plumbing shared by the texbuild binaries.
//!
//! Every flag that changes the build becomes a directive line,
//!     run before (the prologue) or after (the epilogue) the source is scanned.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use texbuild::logparse::Select;
use texbuild::session::{self, Options, Session};
use tracing::metadata::LevelFilter;

#[derive(Clone, Debug, clap::Args)]
pub struct BuildArgs {
    /// Compress the final document with bzip2.
    #[arg(short = 'b', long)]
    pub bzip2: bool,

    /// Compress the final document with gzip.
    #[arg(short = 'z', long)]
    pub gzip: bool,

    /// Run the directive CMD before scanning the source.
    ///
    /// For example `-c 'set program xelatex'`.
    /// May be repeated.
    #[arg(short = 'c', long = "command", value_name = "CMD")]
    pub commands: Vec<String>,

    /// Run the directive CMD after scanning the source.
    #[arg(short = 'e', long = "epilogue", value_name = "CMD")]
    pub epilogue: Vec<String>,

    /// Job name of the first document.
    #[arg(long, value_name = "NAME")]
    pub jobname: Option<String>,

    /// Typeset in landscape mode.
    #[arg(short = 'l', long)]
    pub landscape: bool,

    /// Display at most this many errors.
    #[arg(short = 'n', long, value_name = "N", default_value_t = 10)]
    pub maxerr: usize,

    /// Use the module MOD, with the comma separated options OPTS.
    #[arg(short = 'm', long = "module", value_name = "MOD[:OPTS]")]
    pub modules: Vec<String>,

    /// Post-process the output with the module MOD, with the comma separated options OPTS.
    #[arg(short = 'o', long = "post", value_name = "MOD[:OPTS]")]
    pub post: Vec<String>,

    /// Produce PDF output.
    ///
    /// With --ps the PostScript output is converted with ps2pdf,
    ///     otherwise the document is typeset with pdfTeX.
    #[arg(short = 'd', long)]
    pub pdf: bool,

    /// Produce PostScript output with dvips.
    #[arg(short = 'p', long)]
    pub ps: bool,

    /// Print less. May be repeated.
    #[arg(short = 'q', long, action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Print more. May be repeated.
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Read directives from FILE before scanning the source.
    #[arg(short = 'r', long = "read", value_name = "FILE")]
    pub read: Vec<PathBuf>,

    /// Insert source specials into the DVI output.
    #[arg(short = 'S', long)]
    pub src_specials: bool,

    /// Display errors in a compact form.
    #[arg(short = 's', long)]
    pub short: bool,

    /// Add DIR to the search path of the typesetter.
    #[arg(short = 'I', long = "texpath", value_name = "DIR")]
    pub texpath: Vec<PathBuf>,

    /// Only compile the included files in this comma separated list.
    #[arg(long, value_name = "LIST")]
    pub only: Option<String>,

    /// Build in the directory of each source.
    #[arg(long, conflicts_with = "into")]
    pub inplace: bool,

    /// Build in DIR.
    #[arg(long, value_name = "DIR")]
    pub into: Option<PathBuf>,
}

/// Quotes a word for the directive language.
fn quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', r#"'"'"'"#))
}

fn path_word(path: &Path) -> String {
    quote(&path.display().to_string())
}

/// Turns `MOD:OPTS` into a `module` directive.
fn module_directive(spec: &str) -> String {
    match spec.split_once(':') {
        Some((name, options)) => format!("module {} {}", quote(name), quote(options)),
        None => format!("module {}", quote(spec)),
    }
}

impl BuildArgs {
    pub fn prologue(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for dir in &self.texpath {
            lines.push(format!("path {}", path_word(dir)));
        }
        for module in &self.modules {
            lines.push(module_directive(module));
        }
        for file in &self.read {
            lines.push(format!("read {}", path_word(file)));
        }
        if self.src_specials {
            lines.push("set src-specials yes".to_string());
        }
        if self.landscape {
            lines.push("paper landscape".to_string());
        }
        if self.pdf && !self.ps {
            lines.push("module pdftex".to_string());
        }
        lines.extend(self.commands.iter().cloned());
        lines
    }

    pub fn epilogue(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if self.ps {
            lines.push("module dvips".to_string());
            if self.pdf {
                lines.push("module ps2pdf".to_string());
            }
        }
        for module in &self.post {
            lines.push(module_directive(module));
        }
        lines.extend(self.epilogue.iter().cloned());
        if self.gzip {
            lines.push("module gzip".to_string());
        }
        if self.bzip2 {
            lines.push("module bzip2".to_string());
        }
        lines
    }

    /// Options for the session of a document; the job name only applies to the first.
    pub fn options(&self, first: bool) -> Options {
        Options {
            jobname: self.jobname.clone().filter(|_| first),
            prologue: self.prologue(),
            epilogue: self.epilogue(),
            include_only: self.only.as_ref().map(|list| {
                list.split(',')
                    .map(|name| name.trim().to_string())
                    .filter(|name| !name.is_empty())
                    .collect()
            }),
        }
    }

    pub fn level(&self) -> LevelFilter {
        match 1 + self.verbose as i32 - self.quiet as i32 {
            i32::MIN..=0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    /// Sets up logging, colors and the interrupt handler.
    pub fn init(&self) {
        tracing_subscriber::fmt()
            .without_time()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_max_level(self.level())
            .init();
        texbuild_stdext::color::set_enabled(std::io::stderr().is_terminal());
        if let Err(err) = ctrlc::set_handler(texbuild::process::interrupt) {
            tracing::warn!("cannot install the interrupt handler: {err}");
        }
    }

    /// Runs `f` on a document, from the directory the flags ask for.
    ///
    /// `f` receives the path of the source relative to that directory.
    pub fn in_place<T>(&self, name: &str, f: impl FnOnce(&Path) -> Result<T, Stop>) -> Result<T, Stop> {
        let source = session::find_source(name)?;
        let (dir, source) = if self.inplace {
            let dir = source.parent().map(Path::to_path_buf).unwrap_or_default();
            let file = source.file_name().map(PathBuf::from).unwrap_or(source);
            (dir, file)
        } else if let Some(dir) = &self.into {
            (dir.clone(), texbuild::files::absolute(&source))
        } else {
            return f(&source);
        };
        if dir.as_os_str().is_empty() {
            return f(&source);
        }
        let cwd = std::env::current_dir().map_err(|err| Stop::Failed(err.to_string()))?;
        std::env::set_current_dir(&dir)
            .map_err(|err| Stop::Failed(format!("cannot change to {}: {err}", dir.display())))?;
        let result = f(&source);
        std::env::set_current_dir(&cwd)
            .map_err(|err| Stop::Failed(format!("cannot change to {}: {err}", cwd.display())))?;
        result
    }
}

/// Why a command stopped early.
#[derive(Debug)]
pub enum Stop {
    /// The message is printed unless it is empty.
    Failed(String),
    Interrupted,
}

impl Stop {
    pub fn exit(self) -> ! {
        match self {
            Stop::Failed(message) => {
                if !message.is_empty() {
                    eprintln!("{message}");
                }
                std::process::exit(1)
            }
            Stop::Interrupted => {
                eprintln!("interrupted");
                std::process::exit(2)
            }
        }
    }
}

impl From<texbuild::Error> for Stop {
    fn from(err: texbuild::Error) -> Self {
        match err {
            texbuild::Error::Interrupted => Stop::Interrupted,
            err => Stop::Failed(err.to_string()),
        }
    }
}

/// Prints the cause of a failed build.
#[allow(dead_code)] // not used by texbuild-info
pub fn report_failure(session: &Session, args: &BuildArgs) -> Stop {
    let Some(failure) = session.failure() else {
        return Stop::Failed(String::new());
    };
    if failure.interrupted() {
        return Stop::Interrupted;
    }
    if failure.messages.is_empty() {
        return match failure.error {
            Some(err) => Stop::Failed(format!("{}: {err}", failure.node)),
            None => Stop::Failed(format!("cannot make {}", failure.node)),
        };
    }
    print_limited(&failure.messages, args);
    Stop::Failed(format!("there were errors making {}", failure.node))
}

/// Prints at most `--maxerr` messages.
pub fn print_limited(messages: &[texbuild::logparse::Message], args: &BuildArgs) {
    let shown = messages.len().min(args.maxerr);
    texbuild::report::print_messages(&messages[..shown], args.short);
    if shown < messages.len() {
        tracing::info!("{} more messages not shown", messages.len() - shown);
    }
}

/// The messages asked for by `-W`/`--warn`.
#[allow(dead_code)] // only used by texbuild
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum WarningKind {
    All,
    Boxes,
    Misc,
    Refs,
}

#[allow(dead_code)]
pub fn warning_select(kinds: &[WarningKind]) -> Select {
    let mut select = Select::default();
    for kind in kinds {
        match kind {
            WarningKind::All => {
                select.boxes = true;
                select.refs = true;
                select.warnings = true;
            }
            WarningKind::Boxes => select.boxes = true,
            WarningKind::Misc => select.warnings = true,
            WarningKind::Refs => select.refs = true,
        }
    }
    select
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Cli {
        #[command(flatten)]
        args: BuildArgs,
    }

    fn parse(argv: &[&str]) -> BuildArgs {
        Cli::parse_from(std::iter::once("texbuild").chain(argv.iter().copied())).args
    }

    #[test]
    fn flags_become_directives() {
        let args = parse(&["-d", "-l", "-I", "figures", "-m", "graphicx:dvips", "-c", "set a b"]);
        assert_eq!(
            args.prologue(),
            vec![
                "path 'figures'",
                "module 'graphicx' 'dvips'",
                "paper landscape",
                "module pdftex",
                "set a b",
            ]
        );
        assert!(args.epilogue().is_empty());
    }

    #[test]
    fn postscript_to_pdf() {
        let args = parse(&["-p", "-d", "-z", "-o", "expand"]);
        assert_eq!(args.prologue(), Vec::<String>::new());
        assert_eq!(
            args.epilogue(),
            vec!["module dvips", "module ps2pdf", "module 'expand'", "module gzip"]
        );
    }

    #[test]
    fn jobname_applies_to_the_first_document() {
        let args = parse(&["--jobname", "out", "--only", "one, two"]);
        assert_eq!(args.options(true).jobname.as_deref(), Some("out"));
        assert_eq!(args.options(false).jobname, None);
        assert_eq!(
            args.options(false).include_only,
            Some(vec!["one".to_string(), "two".to_string()])
        );
    }

    #[test]
    fn verbosity() {
        assert_eq!(parse(&[]).level(), LevelFilter::INFO);
        assert_eq!(parse(&["-q"]).level(), LevelFilter::WARN);
        assert_eq!(parse(&["-qqq"]).level(), LevelFilter::WARN);
        assert_eq!(parse(&["-v"]).level(), LevelFilter::DEBUG);
        assert_eq!(parse(&["-vvv"]).level(), LevelFilter::TRACE);
    }

    #[test]
    fn quoting() {
        assert_eq!(quote("it's"), r#"'it'"'"'s'"#);
    }

    #[test]
    fn warning_kinds() {
        assert_eq!(warning_select(&[WarningKind::All]), {
            let mut all = Select::ALL;
            all.errors = false;
            all
        });
        assert_eq!(warning_select(&[WarningKind::Refs]), Select::REFS);
    }
}
