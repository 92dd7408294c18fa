use clap::Parser;
use texbuild::logparse::Select;
use texbuild::session::Session;

mod common;
use common::*;

fn main() {
    if let Err(stop) = Cli::parse().run() {
        stop.exit();
    }
}

/// Report on the build of a LaTeX document.
///
/// Reads the document and the log of the last typesetter run,
///     without running anything.
#[derive(Debug, Parser)]
#[command(
    name = "texbuild-info",
    author = "The texbuild Project",
    version = "0.1",
    about,
    long_about,
    max_term_width(100)
)]
struct Cli {
    /// The document; the .tex suffix may be omitted.
    #[arg(value_name = "SOURCE")]
    source: String,

    #[command(flatten)]
    action: Action,

    #[command(flatten)]
    args: BuildArgs,
}

#[derive(Clone, Debug, clap::Args)]
#[group(multiple = false)]
struct Action {
    /// Report bad boxes.
    #[arg(long)]
    boxes: bool,

    /// Report errors, or reference problems if there are no errors. This is the default.
    #[arg(long)]
    check: bool,

    /// Print the files the document depends on.
    #[arg(long)]
    deps: bool,

    /// Report errors.
    #[arg(long)]
    errors: bool,

    /// Report undefined and multiply defined references.
    #[arg(long)]
    refs: bool,

    /// Print the build steps, one `products : sources` line each.
    #[arg(long)]
    rules: bool,

    /// Report warnings other than bad boxes and references.
    #[arg(long)]
    warnings: bool,
}

impl Cli {
    fn run(self) -> Result<(), Stop> {
        self.args.init();
        self.args.in_place(&self.source, |source| {
            let mut session = Session::new(source, &self.args.options(true))?;
            self.report(&mut session)
        })
    }

    fn report(&self, session: &mut Session) -> Result<(), Stop> {
        let action = &self.action;
        if action.deps {
            let deps: Vec<String> = session
                .deps()
                .iter()
                .map(|path| texbuild::files::display(path))
                .collect();
            println!("{}", deps.join(" "));
            return Ok(());
        }
        if action.rules {
            for (products, sources) in session.rules() {
                let join = |paths: &[std::path::PathBuf]| {
                    paths
                        .iter()
                        .map(|path| texbuild::files::display(path))
                        .collect::<Vec<_>>()
                        .join(" ")
                };
                println!("{} : {}", join(&products), join(&sources));
            }
            return Ok(());
        }
        let select = match action {
            Action { boxes: true, .. } => Select::BOXES,
            Action { errors: true, .. } => Select::ERRORS,
            Action { refs: true, .. } => Select::REFS,
            Action { warnings: true, .. } => Select::WARNINGS,
            _ => return self.check(session),
        };
        let messages = session.messages(select)?;
        print_limited(&messages, &self.args);
        Ok(())
    }

    fn check(&self, session: &mut Session) -> Result<(), Stop> {
        let errors = session.messages(Select::ERRORS)?;
        if !errors.is_empty() {
            print_limited(&errors, &self.args);
            return Err(Stop::Failed(String::new()));
        }
        let refs = session.messages(Select::REFS)?;
        if refs.is_empty() {
            tracing::info!("there was no error");
        } else {
            print_limited(&refs, &self.args);
        }
        Ok(())
    }
}
