use clap::Parser;
use texbuild::graph::Outcome;
use texbuild::session::Session;

mod common;
use common::*;

fn main() {
    if let Err(stop) = Cli::parse().run() {
        stop.exit();
    }
}

/// Build LaTeX documents.
///
/// Runs the typesetter as many times as needed for cross references,
///     tables of contents and bibliographies to settle,
///     with the tools each document needs in between,
///     like BibTeX, makeindex or figure converters.
///
/// Build instructions can be given on the command line as directives (see --command),
///     or in the source as comments of the form
///
///     % texbuild: module pdftex
#[derive(Debug, Parser)]
#[command(
    name = "texbuild",
    author = "The texbuild Project",
    version = "0.1",
    about,
    long_about,
    max_term_width(100)
)]
struct Cli {
    /// The documents to build; the .tex suffix may be omitted.
    #[arg(required = true, value_name = "SOURCE")]
    sources: Vec<String>,

    /// Remove the files the build produces instead of building.
    #[arg(long)]
    clean: bool,

    /// Typeset at least once, even if nothing changed.
    #[arg(short = 'f', long)]
    force: bool,

    /// Report warnings of this type after a successful build. May be repeated.
    #[arg(short = 'W', long = "warn", value_name = "TYPE", value_enum)]
    warn: Vec<WarningKind>,

    #[command(flatten)]
    args: BuildArgs,
}

impl Cli {
    fn run(self) -> Result<(), Stop> {
        self.args.init();
        for (i, name) in self.sources.iter().enumerate() {
            self.args.in_place(name, |source| {
                let mut session = Session::new(source, &self.args.options(i == 0))?;
                if self.clean {
                    session.clean();
                    return Ok(());
                }
                self.build(&mut session)
            })?;
        }
        Ok(())
    }

    fn build(&self, session: &mut Session) -> Result<(), Stop> {
        match session.build(self.force) {
            Outcome::Error => return Err(report_failure(session, &self.args)),
            Outcome::Unchanged => match session.final_product() {
                Some(product) => {
                    tracing::info!("nothing to be done for {}", texbuild::files::display(&product))
                }
                None => tracing::info!("nothing to be done"),
            },
            Outcome::Changed => {}
        }
        if !self.warn.is_empty() {
            let messages = session.messages(warning_select(&self.warn))?;
            texbuild::report::print_messages(&messages, self.args.short);
        }
        Ok(())
    }
}
