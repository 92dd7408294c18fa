//! Whole builds with stand-in tools.
#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tempfile::TempDir;
use texbuild::graph::Outcome;
use texbuild::logparse::{Kind, Select};
use texbuild::session::{Options, Session};

mod common;

const MINIMAL: &str = "\\documentclass{article}\n\\begin{document}\nHello.\n\\end{document}\n";

const CITATION: &str = "\\documentclass{article}\n\\begin{document}\n\\cite{x}\n\
                        \\bibliography{DIR/refs}\n\\end{document}\n";

const CONTENTS: &str = "\\documentclass{article}\n\\begin{document}\n\\tableofcontents\n\
                        \\section{One}\n\\section{Two}\n\\end{document}\n";

struct Fixture {
    dir: TempDir,
    tools: PathBuf,
}

impl Fixture {
    /// Writes the files, with `DIR` in their content replaced by the directory.
    fn new(files: &[(&str, &str)]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let tools = common::install_tools(dir.path());
        let fixture = Fixture { dir, tools };
        for (name, content) in files {
            let content = content.replace("DIR", &fixture.dir.path().display().to_string());
            std::fs::write(fixture.path(name), content).unwrap();
        }
        fixture
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn tool(&self, name: &str) -> String {
        self.tools.join(name).display().to_string()
    }

    fn options(&self, prologue: &[String], epilogue: &[String]) -> Options {
        let mut all = prologue.to_vec();
        all.push(format!("bibtex.tool {}", self.tool("bibtex")));
        Options {
            jobname: Some(self.path("doc").display().to_string()),
            prologue: all,
            epilogue: epilogue.to_vec(),
            include_only: None,
        }
    }

    /// A session that typesets `doc.tex` with the fake `latex`.
    fn session(&self) -> Session {
        let prologue = vec![format!("set program {}", self.tool("latex"))];
        Session::new(&self.path("doc.tex"), &self.options(&prologue, &[])).unwrap()
    }

    fn runs(&self) -> usize {
        common::runs(&self.path("doc"))
    }
}

fn set_mtime(path: &Path, time: SystemTime) {
    std::fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(time)
        .unwrap();
}

#[test]
fn minimal_document_runs_once() {
    let fixture = Fixture::new(&[("doc.tex", MINIMAL)]);
    let mut session = fixture.session();
    assert_eq!(session.build(false), Outcome::Changed);
    assert_eq!(session.passes(), 1);
    assert!(fixture.path("doc.dvi").exists());
    assert_eq!(session.final_product(), Some(fixture.path("doc.dvi")));

    let mut session = fixture.session();
    assert_eq!(session.build(false), Outcome::Unchanged);
    assert_eq!(fixture.runs(), 1);
}

#[test]
fn forced_build_runs_the_typesetter() {
    let fixture = Fixture::new(&[("doc.tex", MINIMAL)]);
    assert_eq!(fixture.session().build(false), Outcome::Changed);
    let mut session = fixture.session();
    assert_eq!(session.build(true), Outcome::Changed);
    assert_eq!(session.passes(), 1);
    assert_eq!(fixture.runs(), 2);
}

#[test]
fn modified_source_is_compiled_again() {
    let fixture = Fixture::new(&[("doc.tex", MINIMAL)]);
    assert_eq!(fixture.session().build(false), Outcome::Changed);
    set_mtime(
        &fixture.path("doc.tex"),
        SystemTime::now() + Duration::from_secs(10),
    );
    let mut session = fixture.session();
    assert_eq!(session.build(false), Outcome::Changed);
    assert_eq!(session.passes(), 1);
    assert_eq!(fixture.runs(), 2);
}

#[test]
fn bibliography_takes_three_runs() {
    let fixture = Fixture::new(&[
        ("doc.tex", CITATION),
        ("refs.bib", "@book{x, title={X}, author={A}, year={2000}}\n"),
    ]);
    let mut session = fixture.session();
    assert_eq!(session.build(false), Outcome::Changed);
    assert_eq!(session.passes(), 3);
    assert!(fixture.path("doc.bbl").exists());
    assert_eq!(
        session.deps(),
        vec![fixture.path("doc.tex"), fixture.path("refs.bib")]
    );

    let mut session = fixture.session();
    assert_eq!(session.build(false), Outcome::Unchanged);
    assert_eq!(fixture.runs(), 3);
}

#[test]
fn table_of_contents_takes_two_runs() {
    let fixture = Fixture::new(&[("doc.tex", CONTENTS)]);
    let mut session = fixture.session();
    assert_eq!(session.build(false), Outcome::Changed);
    assert_eq!(session.passes(), 2);

    assert_eq!(fixture.session().build(false), Outcome::Unchanged);
    assert_eq!(fixture.runs(), 2);
}

#[test]
fn unstable_document_stops_after_the_maximum() {
    let fixture = Fixture::new(&[("doc.tex", "\\documentclass{article}\n% oscillate\n")]);
    let mut session = fixture.session();
    assert_eq!(session.build(false), Outcome::Changed);
    assert_eq!(session.passes(), texbuild::document::DEFAULT_MAX_PASSES);
}

#[test]
fn figure_is_converted() {
    let fixture = Fixture::new(&[
        (
            "doc.tex",
            "\\documentclass{article}\n\\usepackage{graphicx}\n\\begin{document}\n\
             \\includegraphics[width=3cm]{DIR/fig}\n\\end{document}\n",
        ),
        ("fig.eps", "%!PS-Adobe-3.0 EPSF-3.0\n"),
        (
            "rules.ini",
            "[local-eps-to-pdf]\ntarget = (.*)\\.pdf$\nsource = \\1.eps\ncost = 0\n\
             rule = shell\ncommand = TOOLS/epstopdf --outfile=$target $source\n",
        ),
    ]);
    let rules = std::fs::read_to_string(fixture.path("rules.ini"))
        .unwrap()
        .replace("TOOLS", &fixture.tools.display().to_string());
    std::fs::write(fixture.path("rules.ini"), rules).unwrap();
    let prologue = vec![
        "module pdftex".to_string(),
        format!("set program {}", fixture.tool("pdflatex")),
        format!("rules {}", fixture.path("rules.ini").display()),
    ];
    let session = || Session::new(&fixture.path("doc.tex"), &fixture.options(&prologue, &[])).unwrap();

    let mut first = session();
    assert_eq!(
        first.deps(),
        vec![fixture.path("doc.tex"), fixture.path("fig.eps")]
    );
    assert_eq!(first.build(false), Outcome::Changed);
    assert!(fixture.path("fig.pdf").exists());
    assert!(fixture.path("doc.pdf").exists());

    assert_eq!(session().build(false), Outcome::Unchanged);
    assert_eq!(fixture.runs(), 1);

    set_mtime(
        &fixture.path("fig.eps"),
        SystemTime::now() + Duration::from_secs(10),
    );
    assert_eq!(session().build(false), Outcome::Changed);
    assert_eq!(fixture.runs(), 2);
}

#[test]
fn typesetter_errors_fail_the_build() {
    let fixture = Fixture::new(&[(
        "doc.tex",
        "\\documentclass{article}\n\\begin{document}\n\\undefinedmacro\n\\end{document}\n",
    )]);
    let mut session = fixture.session();
    assert_eq!(session.build(false), Outcome::Error);
    let messages = {
        let failure = session.failure().unwrap();
        assert_eq!(failure.node, texbuild::files::display(&fixture.path("doc.dvi")));
        assert!(!failure.interrupted());
        failure.messages
    };
    assert!(!messages.is_empty());
    assert!(messages.iter().all(|m| m.kind == Kind::Error));
    let errors = session.messages(Select::ERRORS).unwrap();
    assert_eq!(errors, messages);
}

#[test]
fn onchange_runs_when_the_file_changes() {
    let fixture = Fixture::new(&[("doc.tex", CONTENTS)]);
    let flag = fixture.path("flag");
    let prologue = vec![
        format!("set program {}", fixture.tool("latex")),
        format!(
            "onchange {} touch {}",
            fixture.path("doc.toc").display(),
            flag.display()
        ),
    ];
    let mut session = Session::new(&fixture.path("doc.tex"), &fixture.options(&prologue, &[])).unwrap();
    assert_eq!(session.build(false), Outcome::Changed);
    assert!(flag.exists());
}

#[test]
fn clean_removes_products() {
    let fixture = Fixture::new(&[
        ("doc.tex", CITATION.replace("\\cite{x}", "\\cite{x}\n\\tableofcontents").as_str()),
        ("refs.bib", "@book{x, title={X}}\n"),
    ]);
    assert_eq!(fixture.session().build(false), Outcome::Changed);
    let products = ["doc.dvi", "doc.aux", "doc.log", "doc.toc", "doc.bbl", "doc.blg"];
    for product in products {
        assert!(fixture.path(product).exists(), "{product}");
    }

    fixture.session().clean();
    for product in products {
        assert!(!fixture.path(product).exists(), "{product}");
    }
    for source in ["doc.tex", "refs.bib"] {
        assert!(fixture.path(source).exists(), "{source}");
    }

    fixture.session().clean();
    assert!(fixture.path("doc.tex").exists());
}
