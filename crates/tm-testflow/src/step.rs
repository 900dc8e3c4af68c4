use crate::error::{FlowError, Result};
use crate::node::{Graph, Node, NodeSet};
use tm_core::elements::{new_elements, Element, Level};
use tm_core::locations::LocationResolver;
use tm_core::model::{Behavior, DagStep};

/// A step of the flow and the nodes it expanded into.
#[derive(Debug, Clone)]
pub struct Step {
    pub info: DagStep,
    pub nodes: NodeSet,
}

/// Resolves the test definitions of a step and adds one node per definition to the graph.
///
/// Step config enters at [`Level::Step`], the global config at [`Level::Global`].
/// A disruptive definition turns off `continueOnError` for the whole step.
pub fn create_nodes_from_step(
    graph: &mut Graph,
    step: &DagStep,
    resolver: &dyn LocationResolver,
    global_config: &[Element],
    flow: &str,
) -> Result<Step> {
    let test_definitions = resolver
        .get_test_definitions(&step.definition)
        .map_err(|source| FlowError::Resolve {
            step: step.name.clone(),
            source,
        })?;

    let mut info = step.clone();
    if info.definition.continue_on_error
        && test_definitions
            .iter()
            .any(|td| td.has_behavior(Behavior::Disruptive))
    {
        tracing::debug!(
            "Step '{}' contains a disruptive test definition, ignoring continueOnError",
            step.name
        );
        info.definition.continue_on_error = false;
    }

    let mut nodes = NodeSet::new();
    for mut td in test_definitions {
        td.add_config(new_elements(&info.definition.config, Level::Step));
        td.add_config(global_config.iter().cloned());
        let id = graph.add(Node::new(td, Some(info.clone()), flow));
        nodes.insert(id);
    }
    tracing::debug!("Step '{}' expanded into {} nodes", step.name, nodes.len());

    Ok(Step { info, nodes })
}
