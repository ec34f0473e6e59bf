use chrono::Utc;
use proptest::prelude::*;
use uuid::Uuid;
use workflow_engine::{StepStatus, Workflow, WorkflowStatus, SHA_CLAIM_TEMPLATE};

#[derive(Debug, Clone)]
enum Op {
    Start(usize),
    Complete(usize),
    Fail(usize),
    Skip(usize),
    Advance,
}

fn op() -> impl Strategy<Value = Op> {
    let step = 0..SHA_CLAIM_TEMPLATE.len();
    prop_oneof![
        step.clone().prop_map(Op::Start),
        step.clone().prop_map(Op::Complete),
        step.clone().prop_map(Op::Fail),
        step.prop_map(Op::Skip),
        Just(Op::Advance),
    ]
}

fn name(index: usize) -> &'static str {
    SHA_CLAIM_TEMPLATE
        .get(index)
        .map(|t| t.name)
        .unwrap_or("unknown")
}

proptest! {
    #[test]
    fn prop_running_steps_have_completed_prerequisites(ops in prop::collection::vec(op(), 0..60)) {
        let user = Uuid::new_v4();
        let mut workflow = Workflow::from_template(Uuid::new_v4(), user, Utc::now());
        workflow.begin(user, Utc::now()).unwrap();

        for op in ops {
            let at = Utc::now();
            // Rejected operations must leave the workflow untouched
            let before = workflow.clone();
            let applied = match op {
                Op::Start(i) => workflow.start_step(name(i), user, at).is_ok(),
                Op::Complete(i) => workflow.complete_step(name(i), user, None, at).is_ok(),
                Op::Fail(i) => workflow.fail_step(name(i), user, "boom", at).is_ok(),
                Op::Skip(i) => workflow.skip_step(name(i), user, None, at).is_ok(),
                Op::Advance => workflow.advance(user, at).is_ok(),
            };
            if !applied {
                prop_assert_eq!(&workflow, &before);
            }

            for step in workflow.steps.iter().filter(|s| s.status == StepStatus::InProgress) {
                for prerequisite in &step.prerequisites {
                    prop_assert_eq!(
                        workflow.step(prerequisite).unwrap().status,
                        StepStatus::Completed
                    );
                }
            }
            for step in workflow.steps.iter().filter(|s| s.required) {
                prop_assert_ne!(step.status, StepStatus::Skipped);
            }
            if workflow.status() == WorkflowStatus::Completed {
                prop_assert!(workflow
                    .steps
                    .iter()
                    .filter(|s| s.required)
                    .all(|s| s.status == StepStatus::Completed));
            }
        }
    }
}
