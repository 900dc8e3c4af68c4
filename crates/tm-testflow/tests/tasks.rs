use tm_core::constants::artifacts;
use tm_core::model::{
    ConfigElement, ConfigType, KeyRef, LocationType, TestDefinitionSpec, TestLocation, ValueFrom,
};
use tm_core::workflow::{DagTask, VolumeSource};
use tm_test_utils::{node, FlowHarness};
use tm_testflow::{Flow, FlowIdentifier, Testflow};

fn task<'a>(flow: &Flow, tasks: &'a [DagTask], step: &str) -> &'a DagTask {
    let name = flow.graph().node(node(flow, step)).name().to_string();
    tasks.iter().find(|t| t.name == name).unwrap()
}

fn artifact_ref(task: &DagTask, name: &str) -> String {
    task.arguments
        .artifacts
        .iter()
        .find(|a| a.name == name)
        .and_then(|a| a.from.clone())
        .unwrap()
}

#[test]
fn test_untrusted_step_receives_untrusted_kubeconfigs() {
    let flow = FlowHarness::new()
        .step("A", &[])
        .step("B", &["A"])
        .untrusted("B")
        .build();
    let tasks = flow.tasks();
    let a = flow.graph().node(node(&flow, "A")).name().to_string();

    assert_eq!(
        artifact_ref(task(&flow, &tasks, "B"), artifacts::KUBECONFIGS),
        format!("{{{{tasks.{}.outputs.artifacts.untrustedKubeconfigs}}}}", a)
    );
    assert_eq!(
        artifact_ref(task(&flow, &tasks, "B"), artifacts::SHARED_FOLDER),
        format!("{{{{tasks.{}.outputs.artifacts.sharedFolder}}}}", a)
    );
}

#[test]
fn test_global_artifacts_are_read_from_workflow_outputs() {
    let flow = FlowHarness::new()
        .step("A", &[])
        .step("B", &["A"])
        .modify("B", |s| s.use_global_artifacts = true)
        .build();
    let tasks = flow.tasks();

    assert_eq!(
        artifact_ref(task(&flow, &tasks, "B"), artifacts::KUBECONFIGS),
        "{{workflow.outputs.artifacts.kubeconfigs}}"
    );
}

#[test]
fn test_continue_on_error_is_passed_to_task() {
    let flow = FlowHarness::new()
        .step("A", &[])
        .continue_on_error("A")
        .build();
    let tasks = flow.tasks();

    assert!(task(&flow, &tasks, "A").continue_on_error);
    assert!(!tasks[0].continue_on_error);
    assert!(tasks[0].dependencies.is_empty());
}

#[test]
fn test_local_location_contributes_volume() {
    let location = TestLocation {
        location_type: LocationType::Local,
        repo: None,
        revision: None,
        host_path: Some("/tmp/integration-tests".to_string()),
    };
    let mut harness = FlowHarness::new().step("A", &[]);
    harness.locations.add(
        TestDefinitionSpec {
            name: "local".to_string(),
            ..Default::default()
        },
        Some(location.clone()),
    );
    let harness = harness.modify("A", |s| s.definition.name = Some("local".to_string()));
    let flow = harness.build();

    let volumes = flow.volumes().unwrap();
    assert_eq!(volumes.len(), 1);
    assert_eq!(volumes[0].name, location.name());
    assert_eq!(
        volumes[0].source,
        VolumeSource::HostPath {
            path: "/tmp/integration-tests".to_string()
        }
    );

    let template = flow
        .graph()
        .node(node(&flow, "A"))
        .test_definition
        .template()
        .unwrap();
    let mounts = template.container.unwrap().volume_mounts;
    assert!(mounts.iter().any(|m| m.name == location.name()));
}

#[test]
fn test_config_volumes_are_deduplicated() {
    let secret_file = ConfigElement {
        config_type: ConfigType::File,
        name: "KUBECONFIG".to_string(),
        value: None,
        value_from: Some(ValueFrom {
            secret_key_ref: Some(KeyRef {
                name: "hosts".to_string(),
                key: "kubeconfig".to_string(),
            }),
            config_map_key_ref: None,
        }),
        path: Some("/tmp/kube/kubeconfig".to_string()),
        private: false,
    };
    let flow = FlowHarness::new()
        .step("A", &[])
        .step("B", &["A"])
        .global_config(secret_file)
        .build();

    let volumes = flow.volumes().unwrap();
    assert_eq!(volumes.len(), 1);
    assert!(matches!(
        &volumes[0].source,
        VolumeSource::Secret { secret_name, .. } if secret_name == "hosts"
    ));
}

#[test]
fn test_testflow_templates_serialize() {
    let harness = FlowHarness::new()
        .step("A", &[])
        .step("B", &["A"])
        .step_config("A", ConfigElement::env("FOO", "bar"));
    let testflow = Testflow::new(
        FlowIdentifier::Exit,
        &harness.steps,
        &harness.locations,
        &harness.global_config,
        None,
        &harness.settings,
        false,
    )
    .unwrap();

    let templates = testflow.templates("exit-dag").unwrap();
    let json = serde_json::to_value(&templates).unwrap();
    assert_eq!(json[0]["name"], "exit-dag");
    assert_eq!(json[0]["dag"]["tasks"].as_array().unwrap().len(), 3);
    assert_eq!(
        json[0]["dag"]["tasks"][1]["arguments"]["parameters"][0]["value"],
        "Exit"
    );
    assert_eq!(testflow.status().len(), 2);
}
