use crate::error::Result;
use crate::flow::{Flow, FlowIdentifier};
use tm_core::config::Settings;
use tm_core::locations::LocationResolver;
use tm_core::model::{ConfigElement, DagStep, StepStatus};
use tm_core::testdefinition::prepare::PrepareDefinition;
use tm_core::workflow::{DagTemplate, Template, Volume};

const DEFAULT_PREPARE_NAME: &str = "prepare";

/// A user-facing flow together with its compiled graph.
#[derive(Debug, Clone)]
pub struct Testflow {
    pub info: Vec<DagStep>,
    pub flow: Flow,
}

impl Testflow {
    /// Compiles `steps`. Without a `prepare` definition a default one is created from `settings`.
    pub fn new(
        id: FlowIdentifier,
        steps: &[DagStep],
        resolver: &dyn LocationResolver,
        global_config: &[ConfigElement],
        prepare: Option<PrepareDefinition>,
        settings: &Settings,
        ignore_empty_flow: bool,
    ) -> Result<Self> {
        let prepare =
            prepare.unwrap_or_else(|| PrepareDefinition::new(DEFAULT_PREPARE_NAME, settings));
        let flow = Flow::new(id, prepare, steps, resolver, global_config, ignore_empty_flow)?;
        Ok(Self {
            info: steps.to_vec(),
            flow,
        })
    }

    /// DAG template named `name` wiring all tasks of the flow.
    pub fn dag_template(&self, name: &str) -> Template {
        Template {
            name: name.to_string(),
            dag: Some(DagTemplate {
                tasks: self.flow.tasks(),
            }),
            ..Default::default()
        }
    }

    /// The DAG template followed by the templates of all nodes.
    pub fn templates(&self, name: &str) -> Result<Vec<Template>> {
        let mut templates = vec![self.dag_template(name)];
        templates.extend(self.flow.templates()?);
        Ok(templates)
    }

    pub fn volumes(&self) -> Result<Vec<Volume>> {
        self.flow.volumes()
    }

    pub fn status(&self) -> Vec<StepStatus> {
        self.flow.status()
    }
}
