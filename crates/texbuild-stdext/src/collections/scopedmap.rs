//! Maps organized as a stack of scopes.
//!
//! A [ScopedMap] is a stack of frames.
//! Lookups search the frames from the innermost one outwards,
//!     so a binding in an inner frame shadows bindings of the same key in outer frames.
//! New keys are only ever created with [define](ScopedMap::define), which writes into the innermost frame,
//!     or by pushing a frame with initial bindings.
//! Writing with [set](ScopedMap::set) updates the frame that owns the key,
//!     and fails if no frame does.
//!
//! ```
//! # use texbuild_stdext::collections::scopedmap::ScopedMap;
//! let mut vars = ScopedMap::default();
//! vars.define("engine", "TeX");
//! vars.push_scope([("file", "main.tex")]);
//! vars.set(&"engine", "pdfTeX").unwrap();
//! assert_eq!(vars.get(&"file"), Some(&"main.tex"));
//! vars.pop_scope().unwrap();
//! assert_eq!(vars.get(&"file"), None);
//! assert_eq!(vars.get(&"engine"), Some(&"pdfTeX"));
//! ```
//!
//! Scopes can also be acquired as a guard, which pops the scope when dropped:
//! ```
//! # use texbuild_stdext::collections::scopedmap::ScopedMap;
//! let mut vars = ScopedMap::default();
//! vars.define("line", 1);
//! {
//!     let mut inner = vars.scope([("line", 7)]);
//!     assert_eq!(inner.get(&"line"), Some(&7));
//!     inner.set(&"line", 8).unwrap();
//! }
//! assert_eq!(vars.get(&"line"), Some(&1));
//! ```
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

/// Error returned when writing a key that is not bound in any frame.
#[derive(Debug, PartialEq, Eq)]
pub struct UndefinedKey;

impl std::fmt::Display for UndefinedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "the key is not bound in any scope")
    }
}

impl std::error::Error for UndefinedKey {}

/// Error returned when popping the root frame.
#[derive(Debug, PartialEq, Eq)]
pub struct NoScopeToPop;

impl std::fmt::Display for NoScopeToPop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "there is no scope to pop")
    }
}

impl std::error::Error for NoScopeToPop {}

/// A map whose bindings live in a stack of frames.
#[derive(Debug, Clone)]
pub struct ScopedMap<K, V> {
    frames: Vec<HashMap<K, V>>,
}

impl<K, V> Default for ScopedMap<K, V> {
    fn default() -> Self {
        ScopedMap {
            frames: vec![HashMap::new()],
        }
    }
}

impl<K: Eq + Hash, V> ScopedMap<K, V> {
    /// Returns the innermost value bound to the key.
    pub fn get<Q>(&self, k: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.frames.iter().rev().find_map(|frame| frame.get(k))
    }

    /// Returns a mutable reference to the innermost value bound to the key.
    pub fn get_mut<Q>(&mut self, k: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.frames
            .iter_mut()
            .rev()
            .find_map(|frame| frame.get_mut(k))
    }

    pub fn contains_key<Q>(&self, k: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(k).is_some()
    }

    /// Binds the key in the innermost frame, returning the value it shadowed in that frame.
    pub fn define(&mut self, k: K, v: V) -> Option<V> {
        self.innermost().insert(k, v)
    }

    /// Updates the value of a key in the frame that owns it.
    pub fn set<Q>(&mut self, k: &Q, v: V) -> Result<(), UndefinedKey>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.get_mut(k) {
            None => Err(UndefinedKey),
            Some(slot) => {
                *slot = v;
                Ok(())
            }
        }
    }

    /// Pushes a new frame containing the provided bindings.
    pub fn push_scope<I: IntoIterator<Item = (K, V)>>(&mut self, bindings: I) {
        self.frames.push(bindings.into_iter().collect());
    }

    /// Pops the innermost frame. The root frame can never be popped.
    pub fn pop_scope(&mut self) -> Result<(), NoScopeToPop> {
        if self.frames.len() <= 1 {
            return Err(NoScopeToPop);
        }
        self.frames.pop();
        Ok(())
    }

    /// Number of frames pushed on top of the root frame.
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    /// Pushes a frame and returns a guard that pops it when dropped.
    pub fn scope<I: IntoIterator<Item = (K, V)>>(&mut self, bindings: I) -> ScopeGuard<'_, K, V> {
        self.push_scope(bindings);
        ScopeGuard { map: self }
    }

    /// Runs the closure with a frame pushed, popping the frame afterwards.
    pub fn with_scope<I, F, R>(&mut self, bindings: I, f: F) -> R
    where
        I: IntoIterator<Item = (K, V)>,
        F: FnOnce(&mut Self) -> R,
    {
        let mut guard = self.scope(bindings);
        f(&mut *guard)
    }

    /// Iterates over all visible bindings; shadowed bindings are skipped.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.frames.iter().enumerate().flat_map(move |(i, frame)| {
            frame.iter().filter(move |(k, _)| {
                self.frames[i + 1..]
                    .iter()
                    .all(|inner| !inner.contains_key(*k))
            })
        })
    }

    fn innermost(&mut self) -> &mut HashMap<K, V> {
        let n = self.frames.len();
        &mut self.frames[n - 1]
    }
}

/// Guard returned by [ScopedMap::scope].
pub struct ScopeGuard<'a, K: Eq + Hash, V> {
    map: &'a mut ScopedMap<K, V>,
}

impl<'a, K: Eq + Hash, V> std::ops::Deref for ScopeGuard<'a, K, V> {
    type Target = ScopedMap<K, V>;

    fn deref(&self) -> &Self::Target {
        self.map
    }
}

impl<'a, K: Eq + Hash, V> std::ops::DerefMut for ScopeGuard<'a, K, V> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.map
    }
}

impl<'a, K: Eq + Hash, V> Drop for ScopeGuard<'a, K, V> {
    fn drop(&mut self) {
        // The guard's frame is always above the root frame.
        let _ = self.map.pop_scope();
    }
}
