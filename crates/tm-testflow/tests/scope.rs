use tm_core::model::ConfigElement;
use tm_test_utils::{config_value, input_source, node, FlowHarness, ROOT};
use tm_testflow::{FlowError, FlowIdentifier};

fn source(flow: &tm_testflow::Flow, step: &str) -> Option<String> {
    input_source(flow, step)
}

fn private_env(name: &str, value: &str) -> ConfigElement {
    ConfigElement {
        private: true,
        ..ConfigElement::env(name, value)
    }
}

#[test]
fn test_diamond_uses_top_as_source() {
    let flow = FlowHarness::new()
        .step("A", &[])
        .step("B", &["A"])
        .step("C", &["A"])
        .step("D", &["B", "C"])
        .build();

    assert_eq!(source(&flow, "A").as_deref(), Some(ROOT));
    assert_eq!(source(&flow, "B").as_deref(), Some("A"));
    assert_eq!(source(&flow, "C").as_deref(), Some("A"));
    assert_eq!(source(&flow, "D").as_deref(), Some("A"));
    assert!(flow.graph().node(flow.root()).has_output());
    assert!(flow.graph().node(node(&flow, "A")).has_output());
    assert!(!flow.graph().node(node(&flow, "D")).has_output());
}

#[test]
fn test_continue_on_error_step_is_skipped_as_source() {
    let flow = FlowHarness::new()
        .step("A", &[])
        .step("B", &["A"])
        .step("C", &["B"])
        .continue_on_error("B")
        .build();

    assert_eq!(source(&flow, "B").as_deref(), Some("A"));
    assert_eq!(source(&flow, "C").as_deref(), Some("A"));
    assert!(!flow.graph().node(node(&flow, "B")).has_output());
}

#[test]
fn test_chain_of_continue_on_error_steps_falls_back_to_root() {
    let flow = FlowHarness::new()
        .step("A", &[])
        .step("B", &["A"])
        .step("C", &["B"])
        .step("D", &["C"])
        .continue_on_error("A")
        .continue_on_error("B")
        .build();

    assert_eq!(source(&flow, "A").as_deref(), Some(ROOT));
    assert_eq!(source(&flow, "B").as_deref(), Some(ROOT));
    assert_eq!(source(&flow, "C").as_deref(), Some(ROOT));
    assert_eq!(source(&flow, "D").as_deref(), Some("C"));
}

#[test]
fn test_join_over_three_branches_of_continue_on_error_steps() {
    let flow = FlowHarness::new()
        .step("A", &[])
        .step("B", &["A"])
        .step("C", &["A"])
        .step("D", &["B"])
        .step("E", &["B", "C"])
        .step("F", &["C"])
        .step("G", &["D", "E", "F"])
        .continue_on_error("D")
        .continue_on_error("E")
        .continue_on_error("F")
        .build();

    assert_eq!(source(&flow, "E").as_deref(), Some("A"));
    assert_eq!(source(&flow, "G").as_deref(), Some("A"));
}

#[test]
fn test_join_over_branches_of_different_length() {
    let flow = FlowHarness::new()
        .step("A", &[])
        .step("B", &["A"])
        .step("C", &["B"])
        .step("D", &["A"])
        .step("E", &["D"])
        .step("F", &["E"])
        .step("G", &["C", "F"])
        .build();

    assert_eq!(source(&flow, "G").as_deref(), Some("A"));
}

#[test]
fn test_untrusted_step_is_never_a_source() {
    let flow = FlowHarness::new()
        .step("A", &[])
        .step("D", &["A"])
        .step("E", &["D"])
        .untrusted("D")
        .build();

    assert_eq!(source(&flow, "D").as_deref(), Some("A"));
    assert_eq!(source(&flow, "E").as_deref(), Some("A"));
    assert!(!flow.graph().node(node(&flow, "D")).has_output());
}

#[test]
fn test_artifacts_from_overrides_join_point() {
    let flow = FlowHarness::new()
        .step("A", &[])
        .step("B", &["A"])
        .step("C", &["B"])
        .modify("C", |s| s.artifacts_from = Some("A".to_string()))
        .build();

    assert_eq!(source(&flow, "C").as_deref(), Some("A"));
    assert!(!flow.graph().node(node(&flow, "B")).has_output());
}

#[test]
fn test_artifacts_from_unknown_step_fails() {
    let harness = FlowHarness::new()
        .step("A", &[])
        .modify("A", |s| s.artifacts_from = Some("missing".to_string()));

    assert!(matches!(
        harness.try_build(FlowIdentifier::Test),
        Err(FlowError::UnknownStep { .. })
    ));
}

#[test]
fn test_config_is_inherited_from_join_points() {
    let flow = FlowHarness::new()
        .step("A", &[])
        .step("B", &["A"])
        .step("C", &["B"])
        .step("D", &["A"])
        .step_config("A", ConfigElement::env("A", "Aa"))
        .step_config("B", ConfigElement::env("A", "Ab"))
        .step_config("B", ConfigElement::env("B", "Bp"))
        .build();

    assert_eq!(config_value(&flow, "B", "A").as_deref(), Some("Ab"));
    assert_eq!(config_value(&flow, "C", "A").as_deref(), Some("Ab"));
    assert_eq!(config_value(&flow, "C", "B").as_deref(), Some("Bp"));
    assert_eq!(config_value(&flow, "D", "A").as_deref(), Some("Aa"));
    assert_eq!(config_value(&flow, "D", "B"), None);
}

#[test]
fn test_private_config_is_not_inherited() {
    let flow = FlowHarness::new()
        .step("A", &[])
        .step("B", &["A"])
        .step_config("A", private_env("SECRET", "a"))
        .build();

    assert_eq!(config_value(&flow, "A", "SECRET").as_deref(), Some("a"));
    assert_eq!(config_value(&flow, "B", "SECRET"), None);
}

#[test]
fn test_no_shared_config_without_convergence() {
    let flow = FlowHarness::new()
        .step("A", &[])
        .step("B", &[])
        .step("C", &["A", "B"])
        .step_config("A", ConfigElement::env("X", "a"))
        .step_config("B", ConfigElement::env("Y", "b"))
        .build();

    assert_eq!(source(&flow, "C").as_deref(), Some(ROOT));
    assert_eq!(config_value(&flow, "C", "X"), None);
    assert_eq!(config_value(&flow, "C", "Y"), None);
}

#[test]
fn test_shared_config_overrides_global_config() {
    let flow = FlowHarness::new()
        .step("A", &[])
        .step("B", &["A"])
        .step("C", &[])
        .global_config(ConfigElement::env("G", "global"))
        .step_config("A", ConfigElement::env("G", "a"))
        .build();

    assert_eq!(config_value(&flow, "A", "G").as_deref(), Some("a"));
    assert_eq!(config_value(&flow, "B", "G").as_deref(), Some("a"));
    assert_eq!(config_value(&flow, "C", "G").as_deref(), Some("global"));
    let root = &flow.graph().node(flow.root()).test_definition;
    assert_eq!(
        root.config().get("G").and_then(|e| e.info.value.as_deref()),
        Some("global")
    );
}
