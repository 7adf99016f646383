//! Checkpoint round-trip property: serializing a state and reading it back
//! yields an equal state, for arbitrary field contents.

use maestro_workflow::{ChatTurn, ErrorRecord, GeneratedFile, Issue, WorkflowState};
use proptest::prelude::*;

fn arbitrary_state() -> impl Strategy<Value = WorkflowState> {
    (
        ".{0,60}",
        0u64..1000,
        0.0f64..=1.0,
        prop::collection::vec(".{0,40}", 0..4),
        prop::collection::vec("[a-z_]{1,12}\\.py", 0..4),
        prop::collection::vec((".{0,20}", ".{0,80}"), 0..4),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(
            |(goal, iteration, confidence, errors, paths, turns, code_complete, passed)| {
                let mut state = WorkflowState::new(goal, "/tmp/ws", "prop-session");
                state.iteration = iteration;
                state.confidence = confidence;
                state.code_complete = code_complete;
                state.validation_passed = passed;

                for message in errors {
                    state.record_error(ErrorRecord::new(message).with_agent("codesmith"));
                }
                for path in paths {
                    state.generated_files.push(GeneratedFile {
                        path,
                        language: "python".to_string(),
                        content: "print('x')\n".to_string(),
                        lines: 1,
                    });
                }
                for (role, content) in turns {
                    state.messages.push(ChatTurn::new(role, content));
                }
                state.issues.push(Issue {
                    kind: "SyntaxError".to_string(),
                    message: "example".to_string(),
                    file: Some("main.py".to_string()),
                    line: Some(3),
                    fix: None,
                });
                state
            },
        )
}

proptest! {
    #[test]
    fn test_state_round_trips_through_checkpoint_encoding(state in arbitrary_state()) {
        let encoded = serde_json::to_value(&state).unwrap();
        let decoded: WorkflowState = serde_json::from_value(encoded).unwrap();
        prop_assert_eq!(decoded, state);
    }

    #[test]
    fn test_state_round_trips_through_string_form(state in arbitrary_state()) {
        let encoded = serde_json::to_string(&state).unwrap();
        let decoded: WorkflowState = serde_json::from_str(&encoded).unwrap();
        prop_assert_eq!(decoded, state);
    }
}
