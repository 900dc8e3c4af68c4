use tm_core::constants::artifacts;
use tm_test_utils::{names, node, serial_steps, FlowHarness};

#[test]
fn test_diamond_top_and_bottom_are_serial() {
    let flow = FlowHarness::new()
        .step("A", &[])
        .step("B", &["A"])
        .step("C", &["A"])
        .step("D", &["B", "C"])
        .build();

    assert_eq!(serial_steps(&flow), names(&["A", "D"]));
}

#[test]
fn test_every_step_of_chain_is_serial() {
    let flow = FlowHarness::new()
        .step("A", &[])
        .step("B", &["A"])
        .step("C", &["B"])
        .step("D", &["C"])
        .build();

    assert_eq!(serial_steps(&flow), names(&["A", "B", "C", "D"]));
}

#[test]
fn test_convergence_points_of_wide_graph_are_serial() {
    let flow = FlowHarness::new()
        .step("A", &[])
        .step("B", &["A"])
        .step("C", &["A"])
        .step("D", &["B"])
        .step("E", &["B", "C"])
        .step("F", &["C"])
        .step("G", &["D", "E", "F"])
        .step("H", &["G"])
        .step("I", &["G"])
        .step("J", &["G"])
        .step("K", &["H", "I", "J"])
        .step("L", &["K"])
        .build();

    assert_eq!(serial_steps(&flow), names(&["A", "G", "K", "L"]));
}

#[test]
fn test_join_of_parallel_first_steps_is_serial() {
    let flow = FlowHarness::new()
        .step("A", &[])
        .step("B", &[])
        .step("C", &["A", "B"])
        .build();

    assert_eq!(serial_steps(&flow), names(&["C"]));
}

fn assert_global_outputs(flow: &tm_testflow::Flow, step: &str) {
    let outputs = flow
        .graph()
        .node(node(flow, step))
        .test_definition
        .output_artifacts()
        .to_vec();
    for name in [
        artifacts::KUBECONFIGS,
        artifacts::UNTRUSTED_KUBECONFIGS,
        artifacts::SHARED_FOLDER,
    ] {
        let output = outputs.iter().find(|o| o.name == name).unwrap();
        assert_eq!(output.global_name.as_deref(), Some(name));
    }
}

#[test]
fn test_serial_nodes_publish_global_outputs() {
    let flow = FlowHarness::new()
        .step("A", &[])
        .step("B", &["A"])
        .build();

    assert_global_outputs(&flow, "B");
}

#[test]
fn test_only_step_below_root_publishes_global_outputs() {
    let flow = FlowHarness::new().step("A", &[]).build();

    assert_eq!(serial_steps(&flow), names(&["A"]));
    assert_global_outputs(&flow, "A");
}

#[test]
fn test_reordered_chain_is_serial() {
    let flow = FlowHarness::new()
        .step("A", &[])
        .serial_step("Bs", &["A"])
        .step("C", &["A"])
        .build();

    // A -> C -> Bs after reordering
    assert_eq!(serial_steps(&flow), names(&["A", "Bs", "C"]));
}

#[test]
fn test_serial_tag_alone_does_not_mark_node() {
    let flow = FlowHarness::new()
        .step("X", &[])
        .serial_step("Ys", &["X"])
        .step("Z", &[])
        .build();

    assert!(serial_steps(&flow).is_empty());
}
