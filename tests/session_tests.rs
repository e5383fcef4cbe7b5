//! End-to-end generation passes through GenerationSession
//!
//! Each test drives a full plan (plain files, ordered files, route and
//! aggregate merges) against a temporary workspace with an in-memory
//! sequencer and run history.

mod support;

use assert_matches::assert_matches;
use ggen_reconcile::history::RollbackOptions;
use ggen_reconcile::sequencer::FixedClock;
use ggen_reconcile::{
    GenerationPlan, PlannedArtifact, ReconcileError, RollbackSelection, RouteRegistration, SourceIdentity,
    WriteOptions, WriteStatus,
};
use std::thread;
use std::time::Duration;
use support::{TestWorkspace, at};

const SEEDER_FILE: &str = "database/seeders/DatabaseSeeder.php";
const ROUTE_FILE: &str = "routes/api.php";

fn post_plan(model_body: &str) -> GenerationPlan {
    GenerationPlan {
        source: SourceIdentity::new("blog", "Post", "blueprints/post.yaml"),
        execution_id: None,
        artifacts: vec![
            PlannedArtifact::File {
                path: "app/Models/Post.php".to_string(),
                content: model_body.to_string(),
                force_overwrite: false,
            },
            PlannedArtifact::Ordered {
                namespace: "posts".to_string(),
                directory: "database/migrations".to_string(),
                suffix: "create_posts_table.php".to_string(),
                content: "<?php // migration\n".to_string(),
                force_overwrite: false,
            },
            PlannedArtifact::Route {
                file: ROUTE_FILE.to_string(),
                registration: RouteRegistration::new(
                    "App\\Http\\Controllers\\PostController",
                    "posts",
                ),
            },
            PlannedArtifact::Aggregate {
                file: SEEDER_FILE.to_string(),
                scope: "seeders".to_string(),
                name: "PostSeeder".to_string(),
                dependencies: vec!["UserSeeder".to_string()],
            },
            PlannedArtifact::Aggregate {
                file: SEEDER_FILE.to_string(),
                scope: "seeders".to_string(),
                name: "UserSeeder".to_string(),
                dependencies: vec![],
            },
        ],
    }
}

fn clock() -> FixedClock {
    FixedClock::new(at(2024, 3, 9, 7, 5, 59))
}

// =============================================================================
// Apply
// =============================================================================

#[test]
fn test_first_pass_writes_every_artifact() {
    // Arrange
    let ws = TestWorkspace::new();
    let (session, _, _) = ws.session(&clock());

    // Act
    let report = session
        .apply(&post_plan("<?php class Post {}\n"), WriteOptions::default())
        .unwrap();

    // Assert
    assert_eq!(report.outcomes.len(), 4);
    assert!(report.outcomes.iter().all(|o| o.status == WriteStatus::Written));
    assert_eq!(report.summary.written, 4);
    assert!(report.run_id.is_some());
    assert!(report.history_error.is_none());

    assert_eq!(
        ws.list("database/migrations"),
        vec!["2024_03_09_070559_create_posts_table.php".to_string()]
    );

    let routes = ws.read(ROUTE_FILE);
    assert!(routes.contains("use App\\Http\\Controllers\\PostController;"));
    assert!(routes.contains("Route::apiResource('posts', PostController::class);"));

    let seeders = ws.read(SEEDER_FILE);
    let user = seeders.find("UserSeeder::class").unwrap();
    let post = seeders.find("PostSeeder::class").unwrap();
    assert!(user < post, "dependency must be seeded first");
    assert!(ws.exists(".ggen/aggregates.json"));
}

#[test]
fn test_second_identical_pass_changes_nothing() {
    // Arrange
    let ws = TestWorkspace::new();
    let clock = clock();
    let (session, _, _) = ws.session(&clock);
    let plan = post_plan("<?php class Post {}\n");
    session.apply(&plan, WriteOptions::default()).unwrap();
    let routes_before = ws.read(ROUTE_FILE);
    let seeders_before = ws.read(SEEDER_FILE);

    // Act: later wall clock, same plan
    clock.advance_secs(3600);
    let report = session.apply(&plan, WriteOptions::default()).unwrap();

    // Assert
    assert!(report.outcomes.iter().all(|o| o.status == WriteStatus::Skipped));
    assert!(report.run_id.is_none());
    assert_eq!(ws.read(ROUTE_FILE), routes_before);
    assert_eq!(ws.read(SEEDER_FILE), seeders_before);
    assert_eq!(ws.list("database/migrations").len(), 1);
    assert_eq!(session.history().list_runs().unwrap().len(), 1);
}

#[test]
fn test_dry_run_persists_nothing() {
    // Arrange
    let ws = TestWorkspace::new();
    let (session, sequencer_store, _) = ws.session(&clock());

    // Act
    let report = session
        .apply(
            &post_plan("<?php class Post {}\n"),
            WriteOptions {
                dry_run: true,
                force: false,
            },
        )
        .unwrap();

    // Assert
    assert!(report.outcomes.iter().all(|o| o.status == WriteStatus::Preview));
    assert!(report.run_id.is_none());
    assert!(sequencer_store.snapshot().is_empty());
    assert!(!ws.exists(".ggen"));
    assert!(!ws.exists("app"));
    assert!(!ws.exists("routes"));
    assert!(session.history().list_runs().unwrap().is_empty());
}

#[test]
fn test_dry_run_previews_distinct_keys_for_every_ordered_artifact() {
    // Arrange
    let ws = TestWorkspace::new();
    let (session, sequencer_store, _) = ws.session(&clock());
    let ordered = |namespace: &str, suffix: &str| PlannedArtifact::Ordered {
        namespace: namespace.to_string(),
        directory: "database/migrations".to_string(),
        suffix: suffix.to_string(),
        content: "<?php\n".to_string(),
        force_overwrite: false,
    };
    let plan = GenerationPlan {
        source: SourceIdentity::default(),
        execution_id: None,
        artifacts: vec![
            ordered("posts", "create_posts_table.php"),
            ordered("comments", "create_comments_table.php"),
        ],
    };

    // Act
    let report = session
        .apply(
            &plan,
            WriteOptions {
                dry_run: true,
                force: false,
            },
        )
        .unwrap();

    // Assert
    let paths: Vec<&str> = report
        .outcomes
        .iter()
        .map(|o| o.relative_path.as_str())
        .collect();
    assert_eq!(
        paths,
        vec![
            "database/migrations/2024_03_09_070559_create_posts_table.php",
            "database/migrations/2024_03_09_070600_create_comments_table.php",
        ]
    );
    assert!(sequencer_store.snapshot().is_empty());
    assert!(!ws.exists("database"));

    // The real pass issues exactly what was previewed
    let applied = session.apply(&plan, WriteOptions::default()).unwrap();
    let applied_paths: Vec<&str> = applied
        .outcomes
        .iter()
        .map(|o| o.relative_path.as_str())
        .collect();
    assert_eq!(applied_paths, paths);
}

// =============================================================================
// Merges through differently-cased directories
// =============================================================================

#[test]
fn test_route_merge_keeps_hand_written_routes_under_other_casing() {
    // Arrange
    let ws = TestWorkspace::new();
    ws.write(
        "Routes/api.php",
        "<?php\n\nuse Illuminate\\Support\\Facades\\Route;\n\nRoute::get('/health', fn () => 'ok'); // hand written\n",
    );
    let (session, _, _) = ws.session(&clock());
    let plan = GenerationPlan {
        source: SourceIdentity::default(),
        execution_id: None,
        artifacts: vec![PlannedArtifact::Route {
            file: ROUTE_FILE.to_string(),
            registration: RouteRegistration::new("App\\Http\\Controllers\\PostController", "posts"),
        }],
    };

    // Act
    let report = session.apply(&plan, WriteOptions::default()).unwrap();

    // Assert
    assert_eq!(report.outcomes[0].status, WriteStatus::Overwritten);
    assert_eq!(ws.list(""), vec!["routes".to_string()]);
    let routes = ws.read(ROUTE_FILE);
    assert!(routes.contains("Route::get('/health', fn () => 'ok'); // hand written"));
    assert!(routes.contains("Route::apiResource('posts', PostController::class);"));
}

#[test]
fn test_aggregate_merge_keeps_custom_seeding_under_other_casing() {
    // Arrange
    let ws = TestWorkspace::new();
    ws.write(
        "database/Seeders/DatabaseSeeder.php",
        "<?php\n\nnamespace Database\\Seeders;\n\nclass DatabaseSeeder extends Seeder\n{\n    public function run(): void\n    {\n        $this->call(UserSeeder::class);\n        Cache::flush();\n    }\n}\n",
    );
    let (session, _, _) = ws.session(&clock());
    let plan = GenerationPlan {
        source: SourceIdentity::default(),
        execution_id: None,
        artifacts: vec![PlannedArtifact::Aggregate {
            file: SEEDER_FILE.to_string(),
            scope: "seeders".to_string(),
            name: "PostSeeder".to_string(),
            dependencies: vec![],
        }],
    };

    // Act
    let report = session.apply(&plan, WriteOptions::default()).unwrap();

    // Assert
    assert_eq!(report.outcomes[0].status, WriteStatus::Overwritten);
    assert_eq!(ws.list("database"), vec!["seeders".to_string()]);
    let seeders = ws.read(SEEDER_FILE);
    assert!(seeders.contains("Cache::flush();"));
    assert!(seeders.contains("PostSeeder::class,"));
}

#[test]
fn test_incompatible_merges_on_one_file_report_an_error() {
    let ws = TestWorkspace::new();
    let (session, _, _) = ws.session(&clock());
    let plan = GenerationPlan {
        source: SourceIdentity::default(),
        execution_id: None,
        artifacts: vec![
            PlannedArtifact::Route {
                file: ROUTE_FILE.to_string(),
                registration: RouteRegistration::new("App\\Http\\Controllers\\TagController", "tags"),
            },
            PlannedArtifact::Aggregate {
                file: ROUTE_FILE.to_string(),
                scope: "seeders".to_string(),
                name: "TagSeeder".to_string(),
                dependencies: vec![],
            },
        ],
    };

    let report = session.apply(&plan, WriteOptions::default()).unwrap();

    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.outcomes[0].status, WriteStatus::Written);
    assert_eq!(report.outcomes[1].status, WriteStatus::Error);
    assert!(report.summary.is_failed());
}

#[test]
fn test_plan_deserializes_from_tagged_json() {
    let json = r#"{
        "source": { "module": "blog", "entity": "Tag", "source_path": "tag.yaml" },
        "execution_id": "exec-7",
        "artifacts": [
            { "kind": "file", "path": "app/Models/Tag.php", "content": "<?php\n" },
            { "kind": "route", "file": "routes/api.php",
              "registration": { "controller": "App\\Http\\Controllers\\TagController", "uri": "tags" } }
        ]
    }"#;

    let plan: GenerationPlan = serde_json::from_str(json).unwrap();

    assert_eq!(plan.execution_id.as_deref(), Some("exec-7"));
    assert_eq!(plan.artifacts.len(), 2);
    assert_matches!(
        &plan.artifacts[0],
        PlannedArtifact::File { force_overwrite: false, .. }
    );
}

// =============================================================================
// History and rollback
// =============================================================================

#[test]
fn test_execution_group_rolls_back_together() {
    // Arrange
    let ws = TestWorkspace::new();
    let (session, _, _) = ws.session(&clock());
    let mut plan = post_plan("v1");
    plan.execution_id = Some("exec-1".to_string());
    let first = session.apply(&plan, WriteOptions::default()).unwrap();

    thread::sleep(Duration::from_millis(5));
    let mut plan = post_plan("v2");
    plan.execution_id = Some("exec-1".to_string());
    let second = session
        .apply(
            &plan,
            WriteOptions {
                dry_run: false,
                force: true,
            },
        )
        .unwrap();
    assert_eq!(ws.read("app/Models/Post.php"), "v2");
    assert_eq!(second.summary.overwritten, 2);

    // Act
    let report = session
        .history()
        .rollback(
            &RollbackSelection::Execution("exec-1".to_string()),
            RollbackOptions::default(),
        )
        .unwrap();

    // Assert
    assert_eq!(
        report.runs,
        vec![second.run_id.unwrap(), first.run_id.unwrap()]
    );
    assert!(!report.summary.is_failed());
    assert!(!ws.exists("app/Models/Post.php"));
    assert!(!ws.exists(ROUTE_FILE));
    assert!(!ws.exists(SEEDER_FILE));
    assert!(ws.list("database/migrations").is_empty());

    // Nothing left to revert in the group
    assert_matches!(
        session.history().rollback(
            &RollbackSelection::Execution("exec-1".to_string()),
            RollbackOptions::default(),
        ),
        Err(ReconcileError::NothingToRollBack)
    );
}
