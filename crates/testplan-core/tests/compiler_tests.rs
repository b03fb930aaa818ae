//! Step compilation: key validation, shorthand, normalization, mappings.

mod common;

use common::Fixture;
use serde_json::json;
use testplan_core::{Binding, PlanError, Value};

#[test]
fn test_disabled_steps_are_excluded_from_the_sequence() {
    let fixture = Fixture::new();
    let mut plan = fixture
        .compile(json!({
            "name": "Disabled steps",
            "tests": [
                {"label": "on", "cluster": "Test", "attribute": "Flag", "command": "readAttribute"},
                {"label": "off", "disabled": true, "bogusKeyThatWouldFail": 1},
                {"label": "also on", "cluster": "Test", "attribute": "Flag", "command": "readAttribute"},
            ]
        }))
        .unwrap();

    assert_eq!(plan.step_count(), 2);
    let step = plan.steps().next_step().unwrap().unwrap();
    assert_eq!(step.label(), Some("on"));
}

#[test]
fn test_disabled_steps_skip_all_validation() {
    // The unknown key on the disabled step must not break compilation.
    let fixture = Fixture::new();
    let plan = fixture.compile(json!({
        "tests": [{"disabled": true, "notARealKey": true}]
    }));
    assert!(plan.is_ok());
}

#[test]
fn test_unknown_document_key_fails() {
    let fixture = Fixture::new();
    let err = fixture.compile_err(json!({"name": "x", "unexpected": 1}));
    assert_eq!(err, PlanError::UnknownKey("unexpected".into()));
}

#[test]
fn test_unknown_step_key_fails() {
    let fixture = Fixture::new();
    let err = fixture.compile_err(json!({"tests": [{"label": "x", "comand": "readAttribute"}]}));
    assert_eq!(err, PlanError::UnknownKey("comand".into()));
}

#[test]
fn test_unknown_bare_response_key_fails_during_shorthand() {
    let fixture = Fixture::new();
    let err = fixture
        .compile_err(json!({
            "tests": [{
                "cluster": "Test",
                "attribute": "Flag",
                "command": "readAttribute",
                "response": {"contains": [1]}
            }]
        }));
    assert_eq!(err, PlanError::UnknownKey("contains".into()));
}

#[test]
fn test_shorthand_value_is_equivalent_to_values_list() {
    let fixture = Fixture::new();
    let shorthand = json!({
        "tests": [{
            "cluster": "Basic",
            "attribute": "ProductID",
            "command": "readAttribute",
            "response": {"value": 5}
        }]
    });
    let longhand = json!({
        "tests": [{
            "cluster": "Basic",
            "attribute": "ProductID",
            "command": "readAttribute",
            "response": {"values": [{"value": 5}]}
        }]
    });

    let mut a = fixture.compile(shorthand).unwrap();
    let mut b = fixture.compile(longhand).unwrap();
    let step_a = a.steps().next_step().unwrap().unwrap();
    let step_b = b.steps().next_step().unwrap().unwrap();
    assert_eq!(step_a.response, step_b.response);
}

#[test]
fn test_save_as_is_registered_as_declared_but_unbound() {
    let fixture = Fixture::new();
    let mut plan = fixture
        .compile(json!({
            "tests": [{
                "cluster": "Basic",
                "attribute": "ProductID",
                "command": "readAttribute",
                "response": {"saveAs": "productId"}
            }]
        }))
        .unwrap();

    let sequence = plan.steps();
    assert_eq!(
        sequence.bindings().get("productId"),
        Some(&Binding::Unbound)
    );
}

#[test]
fn test_command_field_did_you_mean_suggestion() {
    let fixture = Fixture::new();
    let err = fixture
        .compile_err(json!({
            "tests": [{
                "label": "Send command",
                "cluster": "Test",
                "command": "SetTarget",
                "arguments": {"values": [{"name": "target", "value": "x"}]}
            }]
        }));

    match &err {
        PlanError::UnknownField { field, .. } => assert_eq!(field, "target"),
        other => panic!("expected UnknownField, got {other:?}"),
    }
    assert!(err.to_string().contains("Did you mean \"Target\"?"));
}

#[test]
fn test_command_field_lists_candidates_without_near_match() {
    let fixture = Fixture::new();
    let err = fixture
        .compile_err(json!({
            "tests": [{
                "cluster": "Test",
                "command": "SetTarget",
                "arguments": {"values": [{"name": "Bogus", "value": 1}]}
            }]
        }));

    let message = err.to_string();
    assert!(message.contains("Candidates are:"));
    assert!(message.contains("Target"));
    assert!(message.contains("Id"));
}

#[test]
fn test_fabric_index_bypasses_mapping_and_normalization() {
    let fixture = Fixture::new();
    let mut plan = fixture
        .compile(json!({
            "tests": [{
                "cluster": "Test",
                "attribute": "Nested",
                "command": "writeAttribute",
                "arguments": {"value": {"FabricIndex": 1.5, "Id": 5}}
            }]
        }))
        .unwrap();

    let step = plan.steps().next_step().unwrap().unwrap();
    let value = step.arguments.as_ref().unwrap().values[0]
        .value
        .as_ref()
        .unwrap();
    // FabricIndex is untouched (not even float narrowing); Id is an
    // int64u leaf and keeps its value.
    assert_eq!(value.get("FabricIndex"), Some(&Value::Float(1.5)));
    assert_eq!(value.get("Id"), Some(&Value::UInt(5)));
}

#[test]
fn test_unknown_nested_field_fails() {
    let fixture = Fixture::new();
    let err = fixture
        .compile_err(json!({
            "tests": [{
                "cluster": "Test",
                "attribute": "Nested",
                "command": "writeAttribute",
                "arguments": {"value": {"NotAField": 1}}
            }]
        }));
    assert!(matches!(err, PlanError::UnknownField { .. }));
}

#[test]
fn test_octet_string_values_are_decoded() {
    let fixture = Fixture::new();
    let mut plan = fixture
        .compile(json!({
            "tests": [{
                "cluster": "Test",
                "attribute": "Payload",
                "command": "writeAttribute",
                "arguments": {"value": "hex:aabb"}
            }]
        }))
        .unwrap();

    let step = plan.steps().next_step().unwrap().unwrap();
    assert_eq!(
        step.arguments.as_ref().unwrap().values[0].value,
        Some(Value::Bytes(vec![0xaa, 0xbb]))
    );
}

#[test]
fn test_boolean_leaf_coerces_value() {
    let fixture = Fixture::new();
    let mut plan = fixture
        .compile(json!({
            "tests": [{
                "cluster": "Test",
                "attribute": "Flag",
                "command": "writeAttribute",
                "arguments": {"value": 1}
            }]
        }))
        .unwrap();

    let step = plan.steps().next_step().unwrap().unwrap();
    assert_eq!(
        step.arguments.as_ref().unwrap().values[0].value,
        Some(Value::Bool(true))
    );
}

#[test]
fn test_float_on_integer_leaf_narrows() {
    let fixture = Fixture::new();
    let mut plan = fixture
        .compile(json!({
            "tests": [{
                "cluster": "Basic",
                "attribute": "ProductID",
                "command": "writeAttribute",
                "arguments": {"value": 2.0}
            }]
        }))
        .unwrap();

    let step = plan.steps().next_step().unwrap().unwrap();
    assert_eq!(
        step.arguments.as_ref().unwrap().values[0].value,
        Some(Value::UInt(2))
    );
}

#[test]
fn test_float_written_as_string_on_float_leaf() {
    let fixture = Fixture::new();
    let mut plan = fixture
        .compile(json!({
            "tests": [{
                "cluster": "Test",
                "attribute": "Ratio",
                "command": "writeAttribute",
                "arguments": {"value": "0.5"}
            }]
        }))
        .unwrap();

    let step = plan.steps().next_step().unwrap().unwrap();
    assert_eq!(
        step.arguments.as_ref().unwrap().values[0].value,
        Some(Value::Float(0.5))
    );
}

#[test]
fn test_variable_token_is_not_normalized() {
    // A string naming a declared variable is an unresolved placeholder;
    // octet-string decoding must leave it alone at compile time.
    let fixture = Fixture::new();
    let mut plan = fixture
        .compile(json!({
            "config": {"payloadVar": null},
            "tests": [{
                "cluster": "Test",
                "attribute": "Payload",
                "command": "writeAttribute",
                "arguments": {"value": "payloadVar"}
            }]
        }))
        .unwrap();

    let step = plan.steps().next_step().unwrap().unwrap();
    assert_eq!(
        step.arguments.as_ref().unwrap().values[0].value,
        Some(Value::Str("payloadVar".into()))
    );
}

#[test]
fn test_malformed_constraint_fails_at_compile_time() {
    let fixture = Fixture::new();
    let err = fixture
        .compile_err(json!({
            "tests": [{
                "cluster": "Basic",
                "attribute": "ProductID",
                "command": "readAttribute",
                "response": {"constraints": {"notAConstraint": 1}}
            }]
        }));
    assert!(matches!(err, PlanError::ConstraintSyntax(_)));
}

#[test]
fn test_step_defaults_resolve_from_config() {
    let fixture = Fixture::new();
    let mut plan = fixture
        .compile(json!({
            "config": {"cluster": "Basic", "endpoint": 3},
            "tests": [{"attribute": "ProductID", "command": "readAttribute"}]
        }))
        .unwrap();

    let step = plan.steps().next_step().unwrap().unwrap();
    let compiled = step.compiled();
    assert_eq!(compiled.cluster.as_deref(), Some("Basic"));
    assert_eq!(compiled.endpoint, Some(Value::UInt(3)));
    // The legacy default node id applies when nothing overrides it.
    assert_eq!(compiled.node_id, Some(Value::UInt(0x12345)));
}

#[test]
fn test_step_own_values_win_over_config() {
    let fixture = Fixture::new();
    let mut plan = fixture
        .compile(json!({
            "config": {"cluster": "Basic", "endpoint": 3},
            "tests": [{
                "cluster": "Test",
                "endpoint": 1,
                "attribute": "Flag",
                "command": "readAttribute"
            }]
        }))
        .unwrap();

    let step = plan.steps().next_step().unwrap().unwrap();
    assert_eq!(step.compiled().cluster.as_deref(), Some("Test"));
    assert_eq!(step.compiled().endpoint, Some(Value::UInt(1)));
}
