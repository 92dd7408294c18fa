use std::path::PathBuf;

/// Errors produced while configuring or running a build.
#[derive(Debug)]
pub enum Error {
    /// Invalid flags, directives, module options or rules.
    Config(String),
    /// A file could not be read or written.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// A source file required by the build does not exist.
    MissingSource(PathBuf),
    /// An external program could not be started.
    Spawn {
        program: String,
        source: std::io::Error,
    },
    /// An external program exited unsuccessfully. The status is `None` if it was killed by a signal.
    Tool {
        program: String,
        status: Option<i32>,
    },
    /// A module failed in one of its compilation hooks.
    Module { module: String, message: String },
    /// The typesetter failed; details are in its log.
    Typesetter(String),
    /// A path was declared as the product of two build nodes.
    DuplicateProduct(PathBuf),
    /// The build was interrupted by the user.
    Interrupted,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config<S: Into<String>>(message: S) -> Error {
        Error::Config(message.into())
    }

    pub fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Error {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub fn module<S: Into<String>, T: Into<String>>(module: S, message: T) -> Error {
        Error::Module {
            module: module.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Config(message) => write!(f, "{message}"),
            Error::Io { path, source } => {
                write!(f, "failed to access `{}`: {}", crate::files::display(path), source)
            }
            Error::MissingSource(path) => {
                write!(f, "`{}` does not exist", crate::files::display(path))
            }
            Error::Spawn { program, source } => {
                write!(f, "failed to run `{program}`: {source}")
            }
            Error::Tool { program, status } => match status {
                Some(code) => write!(f, "`{program}` failed with exit status {code}"),
                None => write!(f, "`{program}` was terminated by a signal"),
            },
            Error::Module { module, message } => write!(f, "{module}: {message}"),
            Error::Typesetter(message) => write!(f, "{message}"),
            Error::DuplicateProduct(path) => write!(
                f,
                "`{}` is already produced by another build step",
                crate::files::display(path)
            ),
            Error::Interrupted => write!(f, "interrupted"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io { source, .. } | Error::Spawn { source, .. } => Some(source),
            _ => None,
        }
    }
}
