//! End-to-end tests through the `Platform` facade.

mod common;

use forge_core::{
    DatasetFilter, ErrorKind, EvalRequest, EvalStatus, ForgeError, LaunchRequest, ModelFilter,
    Pagination, Platform, PromoteRequest, PromotionStatus, RunFilter, RunStatus,
};
use forge_training::RecipeKind;

async fn completed_lora_run(platform: &Platform, dataset_id: &str) -> String {
    let run = platform
        .launch_run(
            LaunchRequest::new(
                "alpaca-lora-7b",
                "meta-llama/Llama-2-7b-hf",
                dataset_id,
                RecipeKind::LoraSft,
            )
            .with_override("num_epochs", 1)
            .with_gpus(4),
        )
        .await
        .unwrap();
    let run = platform.wait_for_run(&run.id).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    run.id
}

#[tokio::test]
async fn test_lora_run_records_one_hundred_increasing_steps() {
    let platform = common::platform();
    let datasets = common::seed_datasets(&platform);
    let run_id = completed_lora_run(&platform, &datasets[0]).await;

    let detail = platform.get_run(&run_id).unwrap();
    assert_eq!(detail.run.status, RunStatus::Completed);
    let steps: Vec<u64> = detail.metrics.iter().map(|m| m.step).collect();
    assert_eq!(steps, (1..=100).collect::<Vec<_>>());
    assert!(detail.metrics.iter().all(|m| m.gpu_memory_mb.is_some()));
    assert!(!platform.is_run_active(&run_id).await);

    let status = platform.cluster_status().await;
    assert_eq!(status.available_gpus, status.total_gpus);
}

#[tokio::test]
async fn test_run_to_promotion_pipeline() {
    let platform = common::platform();
    let datasets = common::seed_datasets(&platform);
    let run_id = completed_lora_run(&platform, &datasets[0]).await;

    let model = platform
        .promote_model(
            PromoteRequest::new(&run_id, "alpaca-7b-lora", "1.0.0")
                .with_target(PromotionStatus::Candidate),
        )
        .unwrap();
    assert_eq!(model.status, PromotionStatus::Candidate);
    assert_eq!(model.recipe, RecipeKind::LoraSft);
    assert_eq!(model.artifact_path, Some(format!("/srv/forge/models/{}", model.id)));

    let eval = platform.run_eval(EvalRequest::new(&model.id, "default")).await.unwrap();
    let eval = platform.wait_for_eval(&eval.id).await.unwrap();
    assert!(matches!(eval.status, EvalStatus::Passed | EvalStatus::Failed));
    assert_eq!(eval.results.len(), 4);

    let second = platform
        .run_eval(EvalRequest::new(&model.id, "default").with_baseline(&eval.id))
        .await
        .unwrap();
    let second = platform.wait_for_eval(&second.id).await.unwrap();
    let comparison = platform.compare_evals(&second.id, &eval.id).unwrap();
    assert_eq!(comparison.regressions.len(), 4);

    let production = platform.update_model_status(&model.id, PromotionStatus::Production).unwrap();
    assert_eq!(production.status, PromotionStatus::Production);

    let production_only = ModelFilter {
        status: Some(PromotionStatus::Production),
        name: None,
    };
    let listed = platform.list_models(&production_only, Pagination::default()).unwrap();
    assert_eq!(listed.total, 1);
}

#[tokio::test]
async fn test_promoting_unfinished_run_conflicts() {
    let mut config = common::fast_config();
    config.training.step_interval_ms = 10;
    let platform = Platform::in_memory(config).unwrap();
    let datasets = common::seed_datasets(&platform);

    let run = platform
        .launch_run(
            LaunchRequest::new("slow", "mistral-7b", &datasets[1], RecipeKind::Dpo)
                .with_override("num_epochs", 5),
        )
        .await
        .unwrap();
    let err = platform.promote_model(PromoteRequest::new(&run.id, "early", "0.1.0")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let cancelled = platform.cancel_run(&run.id).await.unwrap();
    assert_eq!(cancelled.status, RunStatus::Cancelled);
    assert_eq!(platform.wait_for_run(&run.id).await.unwrap().status, RunStatus::Cancelled);
}

#[tokio::test]
async fn test_under_capacity_run_fails_without_holding_nodes() {
    let mut config = common::fast_config();
    common::tiny_cluster(&mut config, 2);
    let platform = Platform::in_memory(config).unwrap();
    let datasets = common::seed_datasets(&platform);

    let run = platform
        .launch_run(
            LaunchRequest::new("big", "llama-70b", &datasets[0], RecipeKind::LoraSft).with_gpus(8),
        )
        .await
        .unwrap();
    let run = platform.wait_for_run(&run.id).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error_message.unwrap().contains("insufficient accelerator capacity"));
    assert_eq!(platform.cluster_status().await.available_gpus, 2);

    let failed_only = RunFilter {
        status: Some(RunStatus::Failed),
        recipe: None,
    };
    let failed = platform.list_runs(&failed_only, Pagination::default()).unwrap();
    assert_eq!(failed.total, 1);
}

#[tokio::test]
async fn test_dataset_in_use_cannot_be_deleted() {
    let platform = common::platform();
    let datasets = common::seed_datasets(&platform);
    completed_lora_run(&platform, &datasets[0]).await;

    let err = platform.delete_dataset(&datasets[0]).unwrap_err();
    assert!(matches!(err, ForgeError::Conflict(_)));

    platform.delete_dataset(&datasets[1]).unwrap();
    let remaining = platform
        .list_datasets(&DatasetFilter::default(), Pagination::default())
        .unwrap();
    assert_eq!(remaining.total, 2);
}

#[tokio::test]
async fn test_cost_estimate_and_node_probe() {
    let platform = common::platform();

    let cost = platform.estimate_cost(4, 2.0);
    assert!((cost.gpu_cost - 20.0).abs() < 1e-9);
    assert!((cost.platform_overhead - 3.0).abs() < 1e-9);
    assert!((cost.total_estimated - 23.0).abs() < 1e-9);

    let report = platform.check_node_health("node-01").await.unwrap();
    assert!(report.healthy);
    assert_eq!(platform.probe_cluster().await.len(), 4);
    assert!(matches!(
        platform.check_node_health("node-99").await,
        Err(ForgeError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_unknown_ids_are_not_found() {
    let platform = common::platform();
    assert_eq!(platform.get_run("nope").unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(platform.get_eval("nope").unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(platform.get_model("nope").unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(platform.get_dataset("nope").unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(platform.get_metrics("nope", None).unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(platform.cancel_run("nope").await.unwrap_err().kind(), ErrorKind::NotFound);
}
