//! Folder-level batch runs with scripted invokers

use async_trait::async_trait;
use fsgen_batch::config::Settings;
use fsgen_batch::{
    BatchOrchestrator, BatchPolicy, Bucket, Disposition, InvocationFailure, InvocationSpec,
    Invoker, ProcessInvoker,
};
use fsgen_common::config::LoggingConfig;
use fsgen_common::events::{BatchEvent, EventBus};
use fsgen_common::{ARTIFACT_AUTHOR, ARTIFACT_VERSION};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Records calls and concurrency; exits with the scripted code per file name
#[derive(Default)]
struct ScriptedInvoker {
    exit_codes: HashMap<String, i32>,
    delay: Duration,
    running: AtomicUsize,
    max_running: AtomicUsize,
    calls: Mutex<Vec<PathBuf>>,
}

impl ScriptedInvoker {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn failing(mut self, file_name: &str, code: i32) -> Self {
        self.exit_codes.insert(file_name.to_string(), code);
        self
    }

    fn called(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }
}

#[async_trait]
impl Invoker for ScriptedInvoker {
    async fn invoke(&self, input: &Path) -> Result<(), InvocationFailure> {
        self.calls.lock().unwrap().push(input.to_path_buf());
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.running.fetch_sub(1, Ordering::SeqCst);
        let name = input.file_name().unwrap().to_string_lossy().to_string();
        match self.exit_codes.get(&name) {
            Some(code) => Err(InvocationFailure::ExitCode(*code)),
            None => Ok(()),
        }
    }
}

fn settings(folder: &Path, policy: BatchPolicy) -> Settings {
    Settings {
        folder: folder.to_path_buf(),
        policy,
        invocation: InvocationSpec::new("unused", Vec::new()).unwrap(),
        recursive: false,
        output_dir: None,
        extension: "funscript".to_string(),
        logging: LoggingConfig::default(),
        verbose: false,
    }
}

fn policy(concurrency: usize) -> BatchPolicy {
    BatchPolicy::new(true, false, concurrency, Duration::ZERO, false).unwrap()
}

fn write_artifact(path: &Path, author: &str, version: Option<&str>) {
    let body = match version {
        Some(v) => format!(r#"{{"author":"{}","version":"{}","actions":[]}}"#, author, v),
        None => format!(r#"{{"author":"{}","actions":[]}}"#, author),
    };
    fs::write(path, body).unwrap();
}

/// A: no artifact, B: ours and current, C: ours without version, D: foreign
fn abcd_folder() -> TempDir {
    let dir = TempDir::new().unwrap();
    for name in ["A.mp4", "B.mp4", "C.mp4", "D.mp4"] {
        fs::write(dir.path().join(name), b"video").unwrap();
    }
    write_artifact(&dir.path().join("B.funscript"), ARTIFACT_AUTHOR, Some(ARTIFACT_VERSION));
    write_artifact(&dir.path().join("C.funscript"), ARTIFACT_AUTHOR, None);
    write_artifact(&dir.path().join("D.funscript"), "SomeOtherTool", Some("99.0"));
    dir
}

#[tokio::test]
async fn test_abcd_worklist_is_a_and_c() {
    let dir = abcd_folder();
    let invoker = Arc::new(ScriptedInvoker::default());
    let orchestrator = BatchOrchestrator::from_settings(&settings(dir.path(), policy(2)), invoker.clone());

    let report = orchestrator.run_folder(dir.path()).await.unwrap();

    let mut called = invoker.called();
    called.sort();
    assert_eq!(called, vec!["A.mp4", "C.mp4"]);

    let outcome = |name: &str| report.outcome_of(&dir.path().join(name)).cloned();
    assert_eq!(outcome("A.mp4"), Some(Disposition::Processed));
    assert_eq!(outcome("B.mp4"), Some(Disposition::SkippedCurrent));
    assert_eq!(outcome("C.mp4"), Some(Disposition::Processed));
    assert_eq!(outcome("D.mp4"), Some(Disposition::SkippedForeign));
    assert!(!report.is_failure());
}

#[tokio::test]
async fn test_classification_is_idempotent() {
    let dir = abcd_folder();
    let orchestrator = BatchOrchestrator::from_settings(
        &settings(dir.path(), policy(2)),
        Arc::new(ScriptedInvoker::default()),
    );

    let first = orchestrator.classify_folder(dir.path()).unwrap();
    let second = orchestrator.classify_folder(dir.path()).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.paths(Bucket::None), vec![dir.path().join("A.mp4")]);
    assert_eq!(first.paths(Bucket::Current), vec![dir.path().join("B.mp4")]);
    assert_eq!(first.paths(Bucket::Stale), vec![dir.path().join("C.mp4")]);
    assert_eq!(first.paths(Bucket::Foreign), vec![dir.path().join("D.mp4")]);
}

#[tokio::test]
async fn test_never_more_than_concurrency_running() {
    let dir = TempDir::new().unwrap();
    for i in 0..5 {
        fs::write(dir.path().join(format!("v{}.mp4", i)), b"video").unwrap();
    }
    let invoker = Arc::new(ScriptedInvoker::with_delay(Duration::from_millis(50)));
    let orchestrator = BatchOrchestrator::from_settings(&settings(dir.path(), policy(2)), invoker.clone());

    let report = orchestrator.run_folder(dir.path()).await.unwrap();

    assert_eq!(report.succeeded(), 5);
    assert!(invoker.max_running.load(Ordering::SeqCst) <= 2);
    assert!(report.peak_in_flight <= 2);
}

#[tokio::test]
async fn test_failed_file_does_not_stop_the_run() {
    let dir = TempDir::new().unwrap();
    for name in ["1.mp4", "2.mp4", "3.mp4"] {
        fs::write(dir.path().join(name), b"video").unwrap();
    }
    let invoker = Arc::new(ScriptedInvoker::with_delay(Duration::from_millis(10)).failing("2.mp4", 1));
    let orchestrator = BatchOrchestrator::from_settings(&settings(dir.path(), policy(2)), invoker);

    let report = orchestrator.run_folder(dir.path()).await.unwrap();

    let outcome = |name: &str| report.outcome_of(&dir.path().join(name)).cloned();
    assert_eq!(outcome("1.mp4"), Some(Disposition::Processed));
    assert_eq!(outcome("2.mp4"), Some(Disposition::Failed("exit code 1".to_string())));
    assert_eq!(outcome("3.mp4"), Some(Disposition::Processed));
    assert_eq!(report.attempted(), 3);
    assert!(!report.is_failure());
}

#[tokio::test]
async fn test_all_attempts_failed_is_run_failure() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("only.mp4"), b"video").unwrap();
    let invoker = Arc::new(ScriptedInvoker::default().failing("only.mp4", 2));
    let orchestrator = BatchOrchestrator::from_settings(&settings(dir.path(), policy(1)), invoker);

    let report = orchestrator.run_folder(dir.path()).await.unwrap();
    assert!(report.is_failure());
}

#[tokio::test]
async fn test_nothing_to_do_succeeds() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("B.mp4"), b"video").unwrap();
    write_artifact(&dir.path().join("B.funscript"), ARTIFACT_AUTHOR, Some(ARTIFACT_VERSION));
    let invoker = Arc::new(ScriptedInvoker::default());
    let orchestrator = BatchOrchestrator::from_settings(&settings(dir.path(), policy(2)), invoker.clone());

    let report = orchestrator.run_folder(dir.path()).await.unwrap();

    assert!(invoker.called().is_empty());
    assert_eq!(report.attempted(), 0);
    assert_eq!(report.skipped(), 1);
    assert!(!report.is_failure());
}

#[tokio::test]
async fn test_progress_events() {
    let dir = TempDir::new().unwrap();
    for name in ["a.mp4", "b.mp4", "c.mp4"] {
        fs::write(dir.path().join(name), b"video").unwrap();
    }
    let bus = EventBus::new(64);
    let mut rx = bus.subscribe();
    let orchestrator = BatchOrchestrator::from_settings(
        &settings(dir.path(), policy(2)),
        Arc::new(ScriptedInvoker::with_delay(Duration::from_millis(5))),
    )
    .with_events(bus);

    orchestrator.run_folder(dir.path()).await.unwrap();

    let mut started = 0;
    let mut completed = Vec::new();
    let mut finished_run = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            BatchEvent::FileStarted { .. } => started += 1,
            BatchEvent::FileCompleted { progress, .. } => completed.push(progress),
            BatchEvent::RunCompleted { attempted, succeeded, .. } => {
                assert_eq!(attempted, 3);
                assert_eq!(succeeded, 3);
                finished_run = true;
            }
            BatchEvent::RunStarted { total, concurrency, .. } => {
                assert_eq!(total, 3);
                assert_eq!(concurrency, 2);
            }
        }
    }

    assert_eq!(started, 3);
    assert!(finished_run);
    let counts: Vec<usize> = completed.iter().map(|p| p.completed).collect();
    assert_eq!(counts, vec![1, 2, 3]);
    let last = completed.last().unwrap();
    assert_eq!(last.total, 3);
    assert!(last.in_flight.is_empty());
    assert!(completed.iter().all(|p| p.in_flight.len() <= 2));
}

#[tokio::test]
async fn test_backup_before_regenerating_current() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("B.mp4"), b"video").unwrap();
    write_artifact(&dir.path().join("B.funscript"), ARTIFACT_AUTHOR, Some(ARTIFACT_VERSION));

    let policy = BatchPolicy::new(true, true, 1, Duration::ZERO, true).unwrap();
    let invoker = Arc::new(ScriptedInvoker::default());
    let orchestrator = BatchOrchestrator::from_settings(&settings(dir.path(), policy), invoker.clone());

    orchestrator.run_folder(dir.path()).await.unwrap();

    assert_eq!(invoker.called(), vec!["B.mp4"]);
    let backups = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            name.starts_with("B_") && name.ends_with(".funscript.bak")
        })
        .count();
    assert_eq!(backups, 1);
}

#[tokio::test]
async fn test_secondary_output_dir_is_checked() {
    let videos = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    fs::write(videos.path().join("A.mp4"), b"video").unwrap();
    write_artifact(&out.path().join("A.funscript"), ARTIFACT_AUTHOR, Some(ARTIFACT_VERSION));

    let mut settings = settings(videos.path(), policy(2));
    settings.output_dir = Some(out.path().to_path_buf());
    let invoker = Arc::new(ScriptedInvoker::default());
    let orchestrator = BatchOrchestrator::from_settings(&settings, invoker.clone());

    let report = orchestrator.run_folder(videos.path()).await.unwrap();

    assert!(invoker.called().is_empty());
    assert_eq!(
        report.outcome_of(&videos.path().join("A.mp4")),
        Some(&Disposition::SkippedCurrent)
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_process_invoker_run_is_idempotent() {
    let dir = TempDir::new().unwrap();
    for name in ["x.mp4", "y.mp4"] {
        fs::write(dir.path().join(name), b"video").unwrap();
    }

    // Writes our current artifact next to the input
    let script = format!(
        r#"printf '{{"author":"{}","version":"{}","actions":[]}}' > "${{0%.*}}.funscript""#,
        ARTIFACT_AUTHOR, ARTIFACT_VERSION
    );
    let spec = InvocationSpec::new("sh", vec!["-c".to_string(), script, "{input}".to_string()]).unwrap();
    let invoker = Arc::new(ProcessInvoker::resolve(spec).unwrap());
    let orchestrator = BatchOrchestrator::from_settings(&settings(dir.path(), policy(2)), invoker);

    let first = orchestrator.run_folder(dir.path()).await.unwrap();
    assert_eq!(first.succeeded(), 2);

    let second = orchestrator.run_folder(dir.path()).await.unwrap();
    assert_eq!(second.attempted(), 0);
    assert_eq!(second.skipped(), 2);
}

#[test]
fn test_missing_executable_aborts_before_running() {
    let spec = InvocationSpec::new("fsgen-no-such-program", Vec::new()).unwrap();
    let err = ProcessInvoker::resolve(spec).unwrap_err();
    assert!(err.to_string().contains("fsgen-no-such-program"));
}
