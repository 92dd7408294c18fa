//! Stand-ins for the TeX tools, for tests that run whole builds.
//!
//! The fake typesetter writes the files a LaTeX run would write for a few known inputs:
//!
//! - a `.aux` file, with citation data if the source uses `\cite`,
//!     and the resolved citation once the `.bbl` file exists;
//! - a `.log` file that reports undefined citations, asks for a rerun when citations
//!     got resolved, and reports an error if the source uses `\undefinedmacro`;
//! - a `.toc` file if the source uses `\tableofcontents`;
//! - the output, `.pdf` when the script is called `pdflatex` and `.dvi` otherwise.
//!
//! A source containing `oscillate` never stabilizes.
//! Each run increments the number in the `.count` file.
#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const LATEX: &str = r#"#!/bin/sh
for arg; do last=$arg; done
src=$(printf '%s\n' "$last" | sed -n 's/.*\\input{\(.*\)}$/\1/p')
job=${src%.tex}
for arg; do
  case $arg in
    -jobname=*) job=${arg#-jobname=} ;;
  esac
done
case $(basename "$0") in
  pdf*) ext=pdf ;;
  *) ext=dvi ;;
esac
count=$(cat "$job.count" 2>/dev/null || echo 0)
count=$((count + 1))
echo $count > "$job.count"
old_aux=$(cat "$job.aux" 2>/dev/null)
{
  printf '%s\n' '\relax'
  if grep -q 'cite{' "$src"; then
    printf '%s\n' '\citation{x}' '\bibdata{refs}'
    if [ -f "$job.bbl" ]; then
      printf '%s\n' '\bibcite{x}{1}'
    fi
  fi
  if grep -q oscillate "$src"; then
    printf '%% pass %s\n' "$count"
  fi
} > "$job.aux"
new_aux=$(cat "$job.aux")
{
  echo 'This is pdfTeX, Version 3.14 (fake)'
  if grep -q 'cite{' "$src" && [ ! -f "$job.bbl" ]; then
    echo "LaTeX Warning: Citation \`x' on page 1 undefined on input line 3."
  fi
  if grep -q oscillate "$src" || { [ -f "$job.bbl" ] && [ "$old_aux" != "$new_aux" ]; }; then
    echo 'LaTeX Warning: Label(s) may have changed. Rerun to get cross-references right.'
  fi
  if grep -q undefinedmacro "$src"; then
    printf '%s\n' '! Undefined control sequence.' 'l.3 \undefinedmacro' ''
  fi
} > "$job.log"
if grep -q tableofcontents "$src"; then
  printf '%s\n' '\contentsline {section}{1}{1}' > "$job.toc"
fi
if grep -q undefinedmacro "$src"; then
  exit 1
fi
echo "output of pass $count" > "$job.$ext"
"#;

const BIBTEX: &str = r#"#!/bin/sh
for arg; do base=$arg; done
printf '%s\n' '\begin{thebibliography}{1}' '\bibitem{x} X.' '\end{thebibliography}' > "$base.bbl"
echo 'This is BibTeX, Version 0.99d (fake)' > "$base.blg"
"#;

const EPSTOPDF: &str = r#"#!/bin/sh
for arg; do
  case $arg in
    --outfile=*) out=${arg#--outfile=} ;;
    *) src=$arg ;;
  esac
done
cat "$src" > "$out"
"#;

/// Writes the fake tools into `dir/bin` and returns that directory.
pub fn install_tools(dir: &Path) -> PathBuf {
    let bin = dir.join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    for (name, script) in [
        ("latex", LATEX),
        ("pdflatex", LATEX),
        ("bibtex", BIBTEX),
        ("epstopdf", EPSTOPDF),
    ] {
        let path = bin.join(name);
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    bin
}

/// Number of times the fake typesetter ran for a job.
pub fn runs(job: &Path) -> usize {
    let count = PathBuf::from(format!("{}.count", job.display()));
    std::fs::read_to_string(count)
        .map(|s| s.trim().parse().unwrap())
        .unwrap_or(0)
}
