//! Converters: the build steps that conversion rules create.
//!
//! A [rule](crate::rules::Rule) names a converter.
//! When [Environment::convert] chooses a rule for a target,
//!     the converter first [checks](Converter::check) that it can handle the concrete instance
//!     and then adds a node to the graph that produces the target.
use std::rc::Rc;

use indexmap::IndexMap;

use crate::environment::Environment;
use crate::graph::NodeId;
use crate::rules::RuleInstance;
use crate::Result;

mod compress;
mod fig2dev;
mod mpost;
mod shell;

pub use compress::Compress;
pub use fig2dev::Fig2Dev;
pub use mpost::MetaPost;
pub use shell::ShellCommand;

/// A way of producing files from rule instances.
pub trait Converter {
    /// Whether this converter can produce the instance's target.
    fn check(&self, instance: &RuleInstance, env: &Environment) -> bool {
        _ = (instance, env);
        true
    }

    /// Adds the node producing the instance's target and returns it.
    fn convert(&self, instance: &RuleInstance, env: &mut Environment) -> Result<NodeId>;
}

/// Converters by name.
pub struct ConverterRegistry {
    converters: IndexMap<&'static str, Rc<dyn Converter>>,
}

impl ConverterRegistry {
    /// The built-in converters.
    pub fn builtin() -> ConverterRegistry {
        let mut converters: IndexMap<&'static str, Rc<dyn Converter>> = IndexMap::new();
        converters.insert("shell", Rc::new(ShellCommand));
        converters.insert("fig2dev", Rc::new(Fig2Dev));
        converters.insert("mpost", Rc::new(MetaPost));
        converters.insert("compress", Rc::new(Compress));
        ConverterRegistry { converters }
    }

    pub fn get(&self, name: &str) -> Option<Rc<dyn Converter>> {
        self.converters.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.converters.keys().copied()
    }
}
