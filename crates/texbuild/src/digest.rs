//! Content digests used to detect whether auxiliary files changed between runs.
use sha2::{Digest as _, Sha256};
use std::path::Path;

/// SHA-256 digest of some content.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    pub fn of_bytes(bytes: &[u8]) -> Digest {
        Digest(Sha256::digest(bytes).into())
    }

    /// Digest of a file's content, or `None` if the file cannot be read.
    pub fn of_file(path: &Path) -> Option<Digest> {
        std::fs::read(path).ok().map(|b| Digest::of_bytes(&b))
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Digest({})", &self.to_string()[..12])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_value() {
        assert_eq!(
            Digest::of_bytes(b"abc").to_string(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Digest::of_file(&dir.path().join("missing.aux")), None);
    }

    #[test]
    fn file_digest_tracks_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.aux");
        std::fs::write(&path, "\\relax\n").unwrap();
        let first = Digest::of_file(&path);
        std::fs::write(&path, "\\relax\n").unwrap();
        assert_eq!(Digest::of_file(&path), first);
        std::fs::write(&path, "\\relax\n\\citation{knuth}\n").unwrap();
        assert_ne!(Digest::of_file(&path), first);
    }
}
