use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use constitution_contest::participant::EVALUATOR_NAME;
use constitution_contest::prelude::*;
use constitution_contest::problem_collector::collect_problems;
use tracing::{Level, Metadata};
use tracing_subscriber::{
    fmt,
    layer::{Context, Filter, SubscriberExt},
    Layer, Registry,
};

struct WarningsOnly;
impl<S> Filter<S> for WarningsOnly {
    fn enabled(&self, meta: &Metadata<'_>, _cx: &Context<'_, S>) -> bool {
        meta.level() <= &Level::WARN
    }
}

fn init_test_logger() {
    let format = fmt::format()
        .without_time()
        .with_ansi(true)
        .with_level(true)
        .with_thread_names(true)
        .with_target(false);

    let reg = Registry::default().with(
        fmt::layer()
            .with_test_writer()
            .event_format(format)
            .with_filter(WarningsOnly),
    );

    let _ = tracing::subscriber::set_global_default(reg);
}

fn shell_sandbox(scratch: &Path) -> ProcessSandbox {
    let constraints = ConstraintsBuilder::new()
        .with_max_total_ram(512)
        .with_ram_per_execution(128)
        .with_total_cpu_count(2)
        .with_execution_timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    let config = Configuration::new()
        .with_verbose(false)
        .with_allow_uncontained(true);
    ProcessSandbox::new(Toolchain::shell(), config, constraints).with_scratch_dir(scratch)
}

fn developer(name: &str, script: &str) -> CommandDeveloper {
    CommandDeveloper::new(name, "sh", vec![format!("tests/developers/{script}")])
        .with_response_timeout(Duration::from_secs(10))
}

#[test]
fn shell_contest() {
    init_test_logger();

    let problems = collect_problems(Path::new("tests/shell_problems"), false).unwrap();
    let ids = problems.iter().map(|p| p.id.as_str()).collect::<Vec<_>>();
    assert_eq!(ids, vec!["001_greet", "002_sum"]);

    let scratch = tempfile::tempdir().unwrap();
    let engine = ContestEngine::new(shell_sandbox(scratch.path()), RuleBasedEvaluator::new())
        .with_configuration(Configuration::new().with_verbose(true))
        .with_developer(developer("Alice", "alice.sh"))
        .with_developer(developer("Bob", "bob.sh"));
    let state = Arc::new(ContestState::new());
    let dashboard = Dashboard::new(state.clone());

    let summary = engine.run_contest(&state, &problems);

    let outcomes = summary
        .rounds
        .iter()
        .map(|r| {
            (
                r.submission("Alice").unwrap().outcome,
                r.submission("Bob").unwrap().outcome,
            )
        })
        .collect::<Vec<_>>();
    assert_eq!(
        outcomes,
        vec![
            (Outcome::Passed, Outcome::CompileError),
            (Outcome::Passed, Outcome::TestFailure),
        ]
    );

    let alice = state.bank().balance("Alice");
    let bob = state.bank().balance("Bob");
    assert!((1950..=2000).contains(&alice), "Alice: {alice}");
    assert!((-1050..=-1000).contains(&bob), "Bob: {bob}");
    assert_eq!(state.bank().balance(EVALUATOR_NAME), 2000);
    assert_eq!(summary.winner.as_deref(), Some("Alice"));

    // sandbox scratch directories are cleaned up
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);

    let rendered = dashboard.render();
    assert!(rendered.contains("Constitution v1"));
}

#[test]
fn rule_based_evaluator_amends_after_third_round() {
    let problems = collect_problems(Path::new("tests/shell_problems"), false).unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let engine = ContestEngine::new(shell_sandbox(scratch.path()), RuleBasedEvaluator::new())
        .with_configuration(Configuration::new().with_verbose(false))
        .with_developer(developer("Alice", "alice.sh"));
    let state = ContestState::new();

    let rounds = [&problems[0], &problems[1], &problems[0]]
        .into_iter()
        .map(|problem| engine.run_round(&state, problem))
        .collect::<Vec<_>>();

    assert_eq!(rounds[0].new_constitution_version, None);
    assert_eq!(rounds[2].new_constitution_version, Some(2));
    let amended = state.constitution().current();
    assert!(amended.text.starts_with(DEFAULT_CONSTITUTION));
    assert!(amended
        .text
        .contains("Performance review after round 3: 3 submissions, success rate 100.0%"));
    assert_eq!(amended.active_from_round, 4);
}
