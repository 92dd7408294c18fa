use super::Converter;
use crate::environment::Environment;
use crate::graph::{BuildState, NodeId};
use crate::nodes::{Compressed, Compression};
use crate::rules::RuleInstance;
use crate::Result;

/// Compresses the source with the program named by the rule's `tool`, `gzip` by default.
pub struct Compress;

fn compression(instance: &RuleInstance) -> Option<Compression> {
    match instance.param("tool").unwrap_or("gzip") {
        "gzip" => Some(Compression::Gzip),
        "bzip2" => Some(Compression::Bzip2),
        _ => None,
    }
}

impl Converter for Compress {
    fn check(&self, instance: &RuleInstance, _: &Environment) -> bool {
        compression(instance).is_some()
    }

    fn convert(&self, instance: &RuleInstance, env: &mut Environment) -> Result<NodeId> {
        let compression = compression(instance).unwrap_or(Compression::Gzip);
        env.graph_mut().add_node(
            vec![instance.target.clone()],
            vec![instance.source.clone()],
            Box::new(Compressed::new(
                compression,
                instance.source.clone(),
                instance.target.clone(),
            )),
        )
    }
}
