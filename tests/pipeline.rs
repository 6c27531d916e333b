// tests/pipeline.rs

mod common;
use crate::common::builders::{plan, plan_builder, remote_for, BUILD_SCRIPT, LAUNCH_SCRIPT};
use crate::common::{init_tracing, with_timeout, CallLog, FakeRunner, FakeSourceControl};

use std::error::Error;
use std::sync::Arc;

use tokio::sync::mpsc;

use habitat::dag::TaskGraph;
use habitat::errors::HabitatError;
use habitat::exec::{BatchReport, Executor};
use habitat::plan::{
    build_pipeline, AssetLocator, Commit, HeadUpdate, Pipeline, PipelineContext, Plan, Stage,
    StageOutput,
};

type TestResult = Result<(), Box<dyn Error>>;

const OLD: &str = "1111111111111111111111111111111111111111";
const TIP: &str = "abcdefabcdefabcdefabcdefabcdefabcdefabcd";

struct Fixture {
    scm: FakeSourceControl,
    runner: FakeRunner,
    log: CallLog,
    locator: AssetLocator,
    heads: mpsc::UnboundedReceiver<HeadUpdate>,
    ctx: PipelineContext,
}

fn fixture() -> Fixture {
    init_tracing();

    let log = CallLog::new();
    let scm = FakeSourceControl::new().with_log(log.clone());
    let runner = FakeRunner::new().with_log(log.clone());
    let (tx, heads) = mpsc::unbounded_channel();
    let ctx = PipelineContext {
        source_control: Arc::new(scm.clone()),
        runner: Arc::new(runner.clone()),
        heads: tx,
    };
    Fixture {
        scm,
        runner,
        log,
        locator: AssetLocator::new("/srv/habitat"),
        heads,
        ctx,
    }
}

async fn run_plans(
    fx: &Fixture,
    plans: &[Plan],
) -> Result<(Vec<Pipeline>, BatchReport<StageOutput>), Box<dyn Error>> {
    let mut graph = TaskGraph::new();
    let mut pipelines = Vec::new();
    for plan in plans {
        pipelines.push(build_pipeline(&mut graph, plan, &fx.locator, &fx.ctx)?);
    }
    let roots: Vec<_> = pipelines.iter().map(Pipeline::root).collect();
    let report = with_timeout(Executor::new(4).submit_roots(graph, &roots)?.wait()).await?;
    Ok((pipelines, report))
}

#[tokio::test]
async fn fresh_plan_gets_clone_checkout_build_launch() -> TestResult {
    let fx = fixture();
    let api = plan("api");

    let mut graph = TaskGraph::new();
    let pipeline = build_pipeline(&mut graph, &api, &fx.locator, &fx.ctx)?;

    let clone = pipeline.clone.expect("fresh plan needs a clone stage");
    assert_eq!(
        pipeline.stages(),
        vec![
            (Stage::Clone, clone),
            (Stage::Checkout, pipeline.checkout),
            (Stage::Build, pipeline.build),
            (Stage::Launch, pipeline.launch),
        ]
    );

    // Edges: Checkout -> Clone, Build -> Checkout, Launch -> Build.
    assert_eq!(graph.dependencies_of(pipeline.checkout), vec![clone]);
    assert_eq!(graph.dependencies_of(pipeline.build), vec![pipeline.checkout]);
    assert_eq!(graph.dependencies_of(pipeline.launch), vec![pipeline.build]);
    assert!(graph.dependencies_of(clone).is_empty());

    let labels: Vec<&str> = pipeline
        .stages()
        .iter()
        .map(|(_, id)| graph.task(*id).unwrap().label())
        .collect();
    assert_eq!(
        labels,
        vec!["api:clone", "api:checkout", "api:build", "api:launch"]
    );
    Ok(())
}

#[tokio::test]
async fn checked_out_plan_has_no_clone_stage() -> TestResult {
    let fx = fixture();
    let api = plan_builder("api").head(Commit::new(OLD)).build()?;

    let mut graph = TaskGraph::new();
    let pipeline = build_pipeline(&mut graph, &api, &fx.locator, &fx.ctx)?;

    assert!(pipeline.clone.is_none());
    assert_eq!(graph.len(), 3);
    assert!(graph.dependencies_of(pipeline.checkout).is_empty());
    Ok(())
}

#[tokio::test]
async fn api_scenario_runs_in_order_and_reports_tip() -> TestResult {
    let mut fx = fixture();
    let remote = remote_for("api");
    fx.scm.set_branch(&remote, "master", TIP);

    let (pipelines, report) = run_plans(&fx, &[plan("api")]).await?;
    let pipeline = &pipelines[0];

    assert_eq!(
        fx.log.ops(),
        vec!["clone", "branch_tip", "checkout", "head", "run", "run"]
    );
    assert_eq!(fx.runner.scripts(), vec![BUILD_SCRIPT, LAUNCH_SCRIPT]);

    let working_copy = fx.locator.working_copy("api");
    for call in fx.runner.calls() {
        assert_eq!(call.working_dir, working_copy);
    }

    assert_eq!(
        report.result(pipeline.checkout).map_err(|e| e.to_string())?,
        &StageOutput::CheckedOut(Commit::new(TIP))
    );
    assert_eq!(fx.scm.head_of(&working_copy).as_deref(), Some(TIP));

    let update = fx.heads.try_recv()?;
    assert_eq!(
        update,
        HeadUpdate {
            plan: "api".to_string(),
            repository: plan("api").repository,
            commit: Commit::new(TIP),
        }
    );
    Ok(())
}

#[tokio::test]
async fn existing_working_copy_is_opened_not_cloned() -> TestResult {
    let fx = fixture();
    let remote = remote_for("api");
    fx.scm.set_branch(&remote, "master", TIP);
    // Checked out at OLD, with TIP already fetched by the staleness check.
    fx.scm
        .add_working_copy(fx.locator.working_copy("api"), &remote, OLD);

    let api = plan_builder("api").head(Commit::new(OLD)).build()?;
    let (_, report) = run_plans(&fx, &[api]).await?;

    assert!(report.failures().is_empty());
    assert_eq!(
        fx.log.ops(),
        vec!["open", "branch_tip", "checkout", "head", "run", "run"]
    );
    Ok(())
}

#[tokio::test]
async fn fresh_plan_over_a_leftover_working_copy_reuses_it() -> TestResult {
    let fx = fixture();
    let remote = remote_for("api");
    fx.scm.set_branch(&remote, "master", TIP);
    let working_copy = fx.locator.working_copy("api");
    // Left behind by a previous run that tracked another remote.
    fx.scm
        .add_working_copy(&working_copy, "https://old.example.com/api.git", OLD);

    let (pipelines, report) = run_plans(&fx, &[plan("api")]).await?;

    assert!(report.failures().is_empty());
    assert_eq!(
        report
            .result(pipelines[0].checkout)
            .map_err(|e| e.to_string())?,
        &StageOutput::CheckedOut(Commit::new(TIP))
    );
    assert_eq!(fx.scm.remote_of(&working_copy), Some(remote));
    assert_eq!(fx.scm.head_of(&working_copy).as_deref(), Some(TIP));
    Ok(())
}

#[tokio::test]
async fn failed_clone_stops_the_plan_without_further_calls() -> TestResult {
    let mut fx = fixture();
    let remote = remote_for("api");
    fx.scm.set_branch(&remote, "master", TIP);
    fx.scm.fail_clone(&remote);

    let (pipelines, report) = run_plans(&fx, &[plan("api")]).await?;
    let pipeline = &pipelines[0];

    assert_eq!(fx.log.ops(), vec!["clone"]);
    assert!(fx.runner.calls().is_empty());
    assert!(fx.heads.try_recv().is_err());

    for id in [pipeline.checkout, pipeline.build, pipeline.launch] {
        let err = report.result(id).unwrap_err();
        assert!(
            matches!(*err, HabitatError::UpstreamFailed { .. }),
            "expected UpstreamFailed, got {err:?}"
        );
    }
    Ok(())
}

#[tokio::test]
async fn checkout_landing_off_tip_is_a_source_control_failure() -> TestResult {
    let mut fx = fixture();
    let remote = remote_for("api");
    fx.scm.set_branch(&remote, "master", TIP);
    fx.scm.misplace_checkout(&remote, OLD);

    let (pipelines, report) = run_plans(&fx, &[plan("api")]).await?;

    let err = report.result(pipelines[0].checkout).unwrap_err();
    assert!(matches!(*err, HabitatError::SourceControlFailure(_)));
    assert!(fx.runner.calls().is_empty());
    assert!(fx.heads.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn failing_build_skips_launch() -> TestResult {
    let fx = fixture();
    fx.scm.set_branch(&remote_for("api"), "master", TIP);
    fx.runner.exit_with(BUILD_SCRIPT, 2);

    let (pipelines, report) = run_plans(&fx, &[plan("api")]).await?;
    let pipeline = &pipelines[0];

    let err = report.result(pipeline.build).unwrap_err();
    match &*err {
        HabitatError::ScriptFailure(msg) => assert!(msg.contains("exit code 2")),
        other => panic!("expected ScriptFailure, got {other:?}"),
    }
    assert!(matches!(
        *report.result(pipeline.launch).unwrap_err(),
        HabitatError::UpstreamFailed { .. }
    ));
    assert_eq!(fx.runner.scripts(), vec![BUILD_SCRIPT]);
    Ok(())
}

#[tokio::test]
async fn script_that_cannot_start_is_a_script_failure() -> TestResult {
    let fx = fixture();
    fx.scm.set_branch(&remote_for("api"), "master", TIP);
    fx.runner.fail_to_start(LAUNCH_SCRIPT);

    let (pipelines, report) = run_plans(&fx, &[plan("api")]).await?;

    assert!(report.result(pipelines[0].build).is_ok());
    assert!(matches!(
        *report.result(pipelines[0].launch).unwrap_err(),
        HabitatError::ScriptFailure(_)
    ));
    Ok(())
}

#[tokio::test]
async fn environment_reaches_the_scripts() -> TestResult {
    let fx = fixture();
    fx.scm.set_branch(&remote_for("api"), "master", TIP);
    let api = plan_builder("api").env("PORT", "8080").build()?;

    run_plans(&fx, &[api]).await?;

    let calls = fx.runner.calls();
    assert_eq!(calls.len(), 2);
    for call in calls {
        assert_eq!(call.environment.get("PORT").map(String::as_str), Some("8080"));
    }
    Ok(())
}

#[tokio::test]
async fn one_plan_failing_does_not_affect_another() -> TestResult {
    let fx = fixture();
    fx.scm.set_branch(&remote_for("a"), "master", TIP);
    fx.scm.set_branch(&remote_for("b"), "master", TIP);
    let a = plan_builder("a").build_script("scripts/a-build.sh").build()?;
    let b = plan("b");
    fx.runner.exit_with("scripts/a-build.sh", 1);

    let (pipelines, report) = run_plans(&fx, &[a, b]).await?;

    assert!(report.result(pipelines[0].launch).is_err());
    assert!(report.result(pipelines[1].launch).is_ok());
    assert_eq!(fx.runner.scripts().iter().filter(|s| *s == LAUNCH_SCRIPT).count(), 1);
    Ok(())
}
