//! End-to-end scenarios across the workflow, rules, and integration crates

use std::collections::BTreeMap;
use std::sync::Arc;

use domain_rules::{RuleCategory, RulesEngine};
use domain_workflow::{EventStore, WorkflowEngine};
use infra_store::{InMemoryRuleStore, InMemoryWorkflowStore};
use test_utils::{init_test_tracing, TestRuleBuilder, TestWorkflowBuilder};

mod prior_authorization_workflow {
    use super::*;

    use domain_rules::{ActionType, RuleAction};
    use domain_workflow::{IntegrationDispatch, WorkflowStatus};
    use infra_integration::{IntegrationConfig, IntegrationManager, IntegrationType};
    use serde_json::json;
    use test_utils::{
        assert_contiguous_versions, assert_event_types, assert_matched_rules, assert_top_action,
        assert_workflow_status, MetadataFixtures, MockAdapter, VariableFixtures,
    };

    async fn workflow_engine(
        rules: Vec<domain_rules::BusinessRule>,
    ) -> WorkflowEngine<InMemoryWorkflowStore> {
        init_test_tracing();
        let rule_store = Arc::new(InMemoryRuleStore::new());
        for rule in rules {
            rule_store.save_rule(rule).await.unwrap();
        }
        WorkflowEngine::new(
            EventStore::new(Arc::new(InMemoryWorkflowStore::new())),
            Arc::new(RulesEngine::new(rule_store)),
        )
    }

    /// Tests that a senior patient's authorization is approved end to end
    #[tokio::test]
    async fn test_senior_authorization_approval() {
        let engine = workflow_engine(vec![TestRuleBuilder::new().build()]).await;
        let metadata = MetadataFixtures::system();

        let instance = engine
            .start_workflow(
                "prior_auth",
                "1.0.0",
                "authorization",
                "AUTH-1001",
                domain_workflow::WorkflowPriority::High,
                VariableFixtures::prior_auth(),
                &metadata,
            )
            .await
            .unwrap();

        let outcome = engine
            .execute_step(
                instance.id(),
                "eligibility_review",
                &[RuleCategory::Eligibility],
                &metadata,
            )
            .await
            .unwrap();

        assert_eq!(outcome.evaluations.len(), 1);
        assert_matched_rules(&outcome.evaluations[0], &["senior eligibility"]);
        assert_top_action(&outcome.evaluations[0], ActionType::Approve);

        engine
            .complete_workflow(instance.id(), Some("approved".to_string()), &metadata)
            .await
            .unwrap();

        let finished = engine.store().load(instance.id()).await.unwrap();
        assert_workflow_status(&finished, WorkflowStatus::Completed);

        let events = engine.store().history(instance.id()).await.unwrap();
        assert_event_types(
            &events,
            &["started", "step_advanced", "decision_recorded", "completed"],
        );
        assert_contiguous_versions(&events);
    }

    /// Tests that an Integrate action lands its response in the variables
    #[tokio::test]
    async fn test_integrate_action_stores_payer_response() {
        let rule = TestRuleBuilder::new()
            .with_action(
                RuleAction::new(ActionType::Integrate, 2).with_parameters(json!({
                    "integration": "payer",
                    "operation": "eligibility_check",
                    "payload": {"member_id": "MBR-1001"},
                })),
            )
            .build();

        let manager = Arc::new(IntegrationManager::new("careflow"));
        let adapter = Arc::new(MockAdapter::new());
        adapter.push_response(infra_integration::IntegrationResponse::ok(
            json!({"eligible": true, "plan": "PPO"}),
            std::time::Duration::from_millis(2),
        ));
        manager
            .register_adapter(
                IntegrationConfig::new("payer", IntegrationType::Api, "https://payer.example.com"),
                Arc::clone(&adapter) as Arc<dyn infra_integration::IntegrationAdapter>,
            )
            .await
            .unwrap();

        let engine = workflow_engine(vec![rule])
            .await
            .with_integrations(Arc::clone(&manager) as Arc<dyn IntegrationDispatch>);
        let metadata = MetadataFixtures::system();

        let instance = TestWorkflowBuilder::new().build();
        let mut instance = instance;
        engine.store().commit(&mut instance).await.unwrap();

        let outcome = engine
            .execute_step(
                instance.id(),
                "eligibility_review",
                &[RuleCategory::Eligibility],
                &metadata,
            )
            .await
            .unwrap();

        assert_eq!(outcome.integrations.len(), 1);
        assert!(outcome.integrations[0].success);
        assert_eq!(adapter.sent_count(), 1);
        assert_eq!(
            adapter.sent_messages()[0].payload,
            json!({"member_id": "MBR-1001"})
        );

        let reloaded = engine.store().load(instance.id()).await.unwrap();
        assert_eq!(
            reloaded.variables().get("integrations.payer"),
            Some(&json!({"eligible": true, "plan": "PPO"}))
        );
    }

    /// Tests that an expired rule no longer participates in evaluation
    #[tokio::test]
    async fn test_expired_rule_is_skipped() {
        use test_utils::TemporalFixtures;

        let expired = TestRuleBuilder::new()
            .with_name("expired senior rule")
            .with_window(
                TemporalFixtures::effective_from(),
                Some(TemporalFixtures::effective_until()),
            )
            .build();

        let engine = workflow_engine(vec![expired]).await;
        let metadata = MetadataFixtures::system();
        let instance = engine
            .start_workflow(
                "prior_auth",
                "1.0.0",
                "authorization",
                "AUTH-1002",
                domain_workflow::WorkflowPriority::Normal,
                VariableFixtures::prior_auth(),
                &metadata,
            )
            .await
            .unwrap();

        let outcome = engine
            .execute_step(
                instance.id(),
                "eligibility_review",
                &[RuleCategory::Eligibility],
                &metadata,
            )
            .await
            .unwrap();

        assert!(outcome.evaluations[0].success);
        assert_eq!(outcome.evaluations[0].rules_evaluated, 0);
        assert!(outcome.evaluations[0].matched_rules.is_empty());
    }
}

mod evaluation_properties {
    use super::*;

    use core_kernel::{Context, Value};
    use domain_rules::EvaluationOptions;
    use proptest::prelude::*;
    use test_utils::{age_strategy, rule_set_strategy};

    fn evaluate_set(
        rules: Vec<domain_rules::BusinessRule>,
        age: i64,
    ) -> domain_rules::RuleSetEvaluation {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        runtime.block_on(async {
            let store = Arc::new(InMemoryRuleStore::new());
            for rule in rules {
                store.save_rule(rule).await.unwrap();
            }
            let engine = RulesEngine::new(store);
            let mut context = Context::new();
            context.set("patient.age", Value::from(age as f64));
            engine
                .evaluate_rules(
                    RuleCategory::Eligibility,
                    &context,
                    &EvaluationOptions::default(),
                )
                .await
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Confidence stays in [0, 1] and every stored rule is evaluated
        #[test]
        fn prop_confidence_bounded(
            rules in rule_set_strategy(RuleCategory::Eligibility, 5),
            age in age_strategy(),
        ) {
            let count = rules.len();
            let evaluation = evaluate_set(rules, age);
            prop_assert!(evaluation.success);
            prop_assert_eq!(evaluation.rules_evaluated, count);
            prop_assert!((0.0..=1.0).contains(&evaluation.confidence));
        }

        /// A rule matches exactly when the patient clears its age threshold
        #[test]
        fn prop_matches_follow_thresholds(
            rules in rule_set_strategy(RuleCategory::Eligibility, 5),
            age in age_strategy(),
        ) {
            // thresholds are encoded in the generated rule names
            let expected = rules
                .iter()
                .filter(|r| {
                    let threshold: i64 = r
                        .name
                        .trim_start_matches("age >= ")
                        .parse()
                        .unwrap();
                    age >= threshold
                })
                .count();
            let evaluation = evaluate_set(rules, age);
            prop_assert_eq!(evaluation.matched_rules.len(), expected);
        }

        /// Consolidated actions come back in ascending priority order
        #[test]
        fn prop_actions_sorted_by_priority(
            rules in rule_set_strategy(RuleCategory::Eligibility, 5),
        ) {
            // age 120 clears every generated threshold
            let evaluation = evaluate_set(rules, 120);
            let priorities: Vec<u32> =
                evaluation.actions.iter().map(|a| a.priority).collect();
            let mut sorted = priorities.clone();
            sorted.sort_unstable();
            prop_assert_eq!(priorities, sorted);
        }
    }
}

mod event_replay {
    use super::*;

    use test_utils::{assert_contiguous_versions, assert_workflow_status, MetadataFixtures};

    /// Tests that replaying the full stream reproduces the projection
    #[tokio::test]
    async fn test_replay_agrees_with_projection() {
        init_test_tracing();
        let store = EventStore::new(Arc::new(InMemoryWorkflowStore::new()));
        let metadata = MetadataFixtures::reviewer("nurse-kim");

        let mut instance = TestWorkflowBuilder::new()
            .with_variable("patient.age", serde_json::json!(68))
            .build();
        instance.assign("nurse-kim", &metadata).unwrap();
        instance.advance_step("intake", &metadata).unwrap();
        instance
            .set_variables(
                BTreeMap::from([("intake.notes".to_string(), serde_json::json!("reviewed"))]),
                &metadata,
            )
            .unwrap();
        store.commit(&mut instance).await.unwrap();

        let events = store.history(instance.id()).await.unwrap();
        assert_contiguous_versions(&events);

        let loaded = store.load(instance.id()).await.unwrap();
        assert_workflow_status(&loaded, domain_workflow::WorkflowStatus::Running);
        assert_eq!(loaded.version(), instance.version());
        assert_eq!(loaded.variables(), instance.variables());
        assert_eq!(loaded.assigned_to(), Some("nurse-kim"));
    }
}
