use std::collections::BTreeSet;
use tm_core::config::Settings;
use tm_core::locations::StaticLocations;
use tm_core::model::{Behavior, ConfigElement, DagStep, StepDefinition, TestDefinitionSpec};
use tm_core::testdefinition::prepare::PrepareDefinition;
use tm_testflow::{Flow, FlowIdentifier, NodeId, NodeSet};

pub const ROOT: &str = "root";

/// Builds flows from steps that each select one test definition of the same name.
pub struct FlowHarness {
    pub settings: Settings,
    pub locations: StaticLocations,
    pub steps: Vec<DagStep>,
    pub global_config: Vec<ConfigElement>,
    pub ignore_empty_flow: bool,
    registered: BTreeSet<String>,
}

impl Default for FlowHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowHarness {
    pub fn new() -> Self {
        let settings = Settings::default();
        Self {
            locations: StaticLocations::new(settings.clone()),
            settings,
            steps: Vec::new(),
            global_config: Vec::new(),
            ignore_empty_flow: false,
            registered: BTreeSet::new(),
        }
    }

    pub fn definition(mut self, spec: TestDefinitionSpec) -> Self {
        if self.registered.insert(spec.name.clone()) {
            self.locations.add(spec, None);
        }
        self
    }

    /// Step `name` selecting the definition `name`.
    pub fn step(self, name: &str, depends_on: &[&str]) -> Self {
        self.step_with(name, depends_on, &[])
    }

    /// Like [`FlowHarness::step`] but the definition carries the serial behavior.
    pub fn serial_step(self, name: &str, depends_on: &[&str]) -> Self {
        self.step_with(name, depends_on, &[Behavior::Serial])
    }

    pub fn step_with(self, name: &str, depends_on: &[&str], behaviors: &[Behavior]) -> Self {
        let spec = TestDefinitionSpec {
            name: name.to_string(),
            behavior: behaviors.iter().copied().collect(),
            ..Default::default()
        };
        let step = DagStep {
            name: name.to_string(),
            definition: StepDefinition {
                name: Some(name.to_string()),
                ..Default::default()
            },
            depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        };
        self.definition(spec).dag_step(step)
    }

    pub fn dag_step(mut self, step: DagStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn continue_on_error(self, step: &str) -> Self {
        self.modify(step, |s| s.definition.continue_on_error = true)
    }

    pub fn untrusted(self, step: &str) -> Self {
        self.modify(step, |s| s.definition.untrusted = true)
    }

    pub fn step_config(self, step: &str, config: ConfigElement) -> Self {
        self.modify(step, |s| s.definition.config.push(config))
    }

    pub fn global_config(mut self, config: ConfigElement) -> Self {
        self.global_config.push(config);
        self
    }

    pub fn ignore_empty_flow(mut self) -> Self {
        self.ignore_empty_flow = true;
        self
    }

    pub fn modify(mut self, step: &str, f: impl FnOnce(&mut DagStep)) -> Self {
        let found = self
            .steps
            .iter_mut()
            .find(|s| s.name == step)
            .unwrap_or_else(|| panic!("step '{}' is not defined", step));
        f(found);
        self
    }

    pub fn try_build(&self, id: FlowIdentifier) -> tm_testflow::Result<Flow> {
        Flow::new(
            id,
            PrepareDefinition::new("prepare", &self.settings),
            &self.steps,
            &self.locations,
            &self.global_config,
            self.ignore_empty_flow,
        )
    }

    pub fn build(&self) -> Flow {
        self.try_build(FlowIdentifier::Test)
            .expect("Failed to build flow")
    }
}

/// First node of `step`.
pub fn node(flow: &Flow, step: &str) -> NodeId {
    let step_info = flow
        .step(step)
        .unwrap_or_else(|| panic!("step '{}' is not part of the flow", step));
    flow.graph()
        .list(&step_info.nodes)
        .first()
        .copied()
        .unwrap_or_else(|| panic!("step '{}' has no nodes", step))
}

/// Step names of the members of `set`, sorted. The root is reported as [`ROOT`].
pub fn step_names(flow: &Flow, set: &NodeSet) -> Vec<String> {
    let mut names: Vec<String> = set
        .iter()
        .map(|id| step_name(flow, id))
        .collect();
    names.sort();
    names
}

pub fn step_name(flow: &Flow, id: NodeId) -> String {
    flow.graph()
        .node(id)
        .step_name()
        .unwrap_or(ROOT)
        .to_string()
}

pub fn children(flow: &Flow, step: &str) -> Vec<String> {
    step_names(flow, flow.graph().node(node(flow, step)).children())
}

pub fn parents(flow: &Flow, step: &str) -> Vec<String> {
    step_names(flow, flow.graph().node(node(flow, step)).parents())
}

/// Step name of the artifact source of `step`.
pub fn input_source(flow: &Flow, step: &str) -> Option<String> {
    flow.graph()
        .node(node(flow, step))
        .input_source()
        .map(|id| step_name(flow, id))
}

/// Steps whose node is marked serial, sorted.
pub fn serial_steps(flow: &Flow) -> Vec<String> {
    let serial: NodeSet = flow
        .graph()
        .ids()
        .filter(|id| flow.graph().node(*id).is_serial())
        .collect();
    step_names(flow, &serial)
}

pub fn config_value(flow: &Flow, step: &str, name: &str) -> Option<String> {
    flow.graph()
        .node(node(flow, step))
        .test_definition
        .config()
        .get(name)
        .and_then(|e| e.info.value.clone())
}

pub fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
