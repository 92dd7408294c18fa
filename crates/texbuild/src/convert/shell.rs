use texscan::cmdline;
use texscan::variable::Chain;

use super::Converter;
use crate::environment::Environment;
use crate::graph::{BuildState, NodeId};
use crate::nodes::Shell;
use crate::process::Invocation;
use crate::rules::RuleInstance;
use crate::Result;

/// Runs the rule's `command`, a command line in which `$source` and `$target` are expanded.
///
/// The optional `message` is shown when the command runs.
pub struct ShellCommand;

impl Converter for ShellCommand {
    fn check(&self, instance: &RuleInstance, _: &Environment) -> bool {
        instance.param("command").is_some()
    }

    fn convert(&self, instance: &RuleInstance, env: &mut Environment) -> Result<NodeId> {
        let vars = Chain(instance, &env.vars);
        let argv = cmdline::split(instance.param("command").unwrap_or_default(), &vars);
        let message = cmdline::expand_variables(
            instance
                .param("message")
                .unwrap_or("converting $source into $target"),
            &vars,
        );
        env.graph_mut().add_node(
            vec![instance.target.clone()],
            vec![instance.source.clone()],
            Box::new(Shell::converter(Invocation::new(argv), message)),
        )
    }
}
