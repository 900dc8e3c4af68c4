use crate::error::{FlowError, Result};
use crate::node::{Graph, Node, NodeId};
use crate::operations;
use crate::step::{create_nodes_from_step, Step};
use std::collections::BTreeMap;
use std::fmt;
use tm_core::constants::{artifacts, conditions, phases};
use tm_core::elements::{new_elements, Level};
use tm_core::locations::LocationResolver;
use tm_core::model::{
    ConditionType, ConfigElement, DagStep, LocationType, Phase, StepStatus, StepStatusPosition,
    StepStatusTestDefinition, TestLocation,
};
use tm_core::testdefinition::prepare::PrepareDefinition;
use tm_core::workflow::{Arguments, Artifact, DagTask, Parameter, Suspend, Template, Volume};

const PAUSE_SUFFIX: &str = "pause";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowIdentifier {
    Test,
    Exit,
}

impl FlowIdentifier {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowIdentifier::Test => "testflow",
            FlowIdentifier::Exit => "exit",
        }
    }

    /// Value of the `phase` parameter handed to every task of the flow.
    pub fn phase(&self) -> &'static str {
        match self {
            FlowIdentifier::Test => phases::RUNNING,
            FlowIdentifier::Exit => phases::EXIT,
        }
    }
}

impl fmt::Display for FlowIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The compiled graph of one flow.
#[derive(Debug, Clone)]
pub struct Flow {
    pub id: FlowIdentifier,
    graph: Graph,
    root: NodeId,
    steps: BTreeMap<String, Step>,
    used_locations: BTreeMap<String, TestLocation>,
}

impl Flow {
    pub fn new(
        id: FlowIdentifier,
        mut prepare: PrepareDefinition,
        steps: &[DagStep],
        resolver: &dyn LocationResolver,
        global_config: &[ConfigElement],
        ignore_empty_flow: bool,
    ) -> Result<Self> {
        let global = new_elements(global_config, Level::Global);
        let mut graph = Graph::new();
        let mut step_map = BTreeMap::new();
        let mut used_locations = BTreeMap::new();

        for dag_step in steps {
            let step =
                create_nodes_from_step(&mut graph, dag_step, resolver, &global, id.as_str())?;
            if step.nodes.is_empty() {
                if !ignore_empty_flow {
                    return Err(FlowError::EmptyStep(dag_step.name.clone()));
                }
                tracing::warn!("Step '{}' of flow '{}' is empty", dag_step.name, id);
            }
            for node in step.nodes.iter() {
                if let Some(location) = &graph.node(node).test_definition.location {
                    used_locations.insert(location.name(), location.clone());
                }
            }
            step_map.insert(dag_step.name.clone(), step);
        }

        for location in used_locations.values() {
            prepare.add_location(location);
        }
        prepare.finish()?;
        let mut root_definition = prepare.test_definition;
        root_definition.add_config(global);
        let root = graph.add(Node::new(root_definition, None, id.as_str()));

        operations::create_initial_dag(&mut graph, &step_map, root)?;
        operations::reorder_children_of_nodes(&mut graph, &[root].into_iter().collect());
        operations::apply_output_scope(&mut graph, &step_map)?;
        operations::apply_config_scope(&mut graph, &step_map);
        operations::set_serial_nodes(&mut graph, root);

        tracing::info!(
            "Built flow '{}' with {} steps and {} nodes",
            id,
            step_map.len(),
            graph.len()
        );

        Ok(Self {
            id,
            graph,
            root,
            steps: step_map,
            used_locations,
        })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.get(name)
    }

    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.values()
    }

    /// Root first, then the nodes of every step in step and name order.
    fn node_ids(&self) -> Vec<NodeId> {
        let mut ids = vec![self.root];
        for step in self.steps.values() {
            ids.extend(self.graph.list(&step.nodes));
        }
        ids
    }

    /// Task list for the DAG template.
    pub fn tasks(&self) -> Vec<DagTask> {
        let mut tasks = Vec::new();
        for id in self.node_ids() {
            let node = self.graph.node(id);
            let mut task = DagTask {
                name: node.name().to_string(),
                template: node.name().to_string(),
                dependencies: self.graph.names(node.parents()),
                arguments: Arguments {
                    parameters: vec![self.phase_parameter()],
                    artifacts: self.input_artifacts(node),
                },
                when: None,
                continue_on_error: node.continue_on_error(),
            };

            if let Some(step) = &node.step {
                task.when = match step.definition.condition {
                    ConditionType::Always => None,
                    ConditionType::Success => Some(conditions::SUCCESS.to_string()),
                    ConditionType::Error => Some(conditions::ERROR.to_string()),
                };
                if step.pause_enabled() {
                    let pause = pause_name(node);
                    tasks.push(DagTask {
                        name: pause.clone(),
                        template: pause.clone(),
                        dependencies: std::mem::replace(&mut task.dependencies, vec![pause]),
                        ..Default::default()
                    });
                }
            }
            tasks.push(task);
        }
        tasks
    }

    fn phase_parameter(&self) -> Parameter {
        Parameter {
            name: phases::PARAMETER.to_string(),
            value: Some(self.id.phase().to_string()),
        }
    }

    fn input_artifacts(&self, node: &Node) -> Vec<Artifact> {
        let mut inputs = Vec::new();
        if let (Some(source), Some(step)) = (node.input_source(), &node.step) {
            let source = self.graph.node(source).name();
            let reference = |output: &str| {
                if step.use_global_artifacts {
                    format!("{{{{workflow.outputs.artifacts.{}}}}}", output)
                } else {
                    format!("{{{{tasks.{}.outputs.artifacts.{}}}}}", source, output)
                }
            };
            let kubeconfigs = if node.is_untrusted() {
                artifacts::UNTRUSTED_KUBECONFIGS
            } else {
                artifacts::KUBECONFIGS
            };
            inputs.push(Artifact::from_ref(artifacts::KUBECONFIGS, reference(kubeconfigs)));
            inputs.push(Artifact::from_ref(
                artifacts::SHARED_FOLDER,
                reference(artifacts::SHARED_FOLDER),
            ));
        }
        if let Some(location) = &node.test_definition.location {
            if location.location_type == LocationType::Git {
                inputs.push(Artifact::from_ref(
                    artifacts::REPO,
                    format!("{{{{workflow.outputs.artifacts.{}}}}}", location.name()),
                ));
            }
        }
        inputs
    }

    /// One template per node plus the suspend templates of paused steps.
    pub fn templates(&self) -> Result<Vec<Template>> {
        let mut templates = Vec::new();
        for id in self.node_ids() {
            let node = self.graph.node(id);
            if let Some(step) = node.step.as_ref().filter(|s| s.pause_enabled()) {
                let duration = step
                    .pause
                    .as_ref()
                    .and_then(|p| p.resume_timeout_seconds)
                    .map(|s| s.to_string());
                templates.push(Template {
                    name: pause_name(node),
                    suspend: Some(Suspend { duration }),
                    ..Default::default()
                });
            }
            templates.push(node.test_definition.template()?);
        }
        Ok(templates)
    }

    /// Host path volumes of local locations and the volumes of file configs.
    pub fn volumes(&self) -> Result<Vec<Volume>> {
        let mut volumes = BTreeMap::new();
        for location in self.used_locations.values() {
            if let Some(volume) = location.volume() {
                volumes.insert(volume.name.clone(), volume);
            }
        }
        for id in self.node_ids() {
            for volume in self.graph.node(id).test_definition.volumes()? {
                volumes.insert(volume.name.clone(), volume);
            }
        }
        Ok(volumes.into_values().collect())
    }

    /// Initial status of every node. The root is not reported.
    pub fn status(&self) -> Vec<StepStatus> {
        let mut status = Vec::new();
        for step in self.steps.values() {
            for id in self.graph.list(&step.nodes) {
                let td = &self.graph.node(id).test_definition;
                status.push(StepStatus {
                    name: self.graph.node(id).name().to_string(),
                    position: StepStatusPosition {
                        step: Some(step.info.name.clone()),
                        depends_on: step.info.depends_on.clone(),
                        flow: self.id.to_string(),
                    },
                    phase: Phase::Init,
                    test_definition: StepStatusTestDefinition {
                        name: td.info.name.clone(),
                        owner: td.info.owner.clone(),
                        recipients_on_failure: td.info.recipients_on_failure.clone(),
                        active_deadline_seconds: td.info.active_deadline_seconds,
                        location: td.location.clone(),
                        config: td.config().raw_list(),
                    },
                });
            }
        }
        status
    }
}

fn pause_name(node: &Node) -> String {
    format!("{}-{}", node.name(), PAUSE_SUFFIX)
}
