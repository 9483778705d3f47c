use std::path::Path;
use std::sync::Mutex;

use apcore::{Config, Error, Manager, NoopAuthenticodeBackend, ReqwestHttpClient, StatusQuery};
use apcore_catalog::{Catalog, CatalogError};
use apcore_runner::{ProcessOutput, ProcessRunner};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

struct FakeProcessRunner {
    exit_code: i32,
    seen: Mutex<Vec<Vec<String>>>,
}

impl FakeProcessRunner {
    fn succeeding() -> Self {
        Self {
            exit_code: 0,
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ProcessRunner for FakeProcessRunner {
    async fn run(&self, argv: &[String]) -> std::io::Result<ProcessOutput> {
        self.seen.lock().unwrap().push(argv.to_vec());
        Ok(ProcessOutput {
            exit_code: self.exit_code,
            stdout: Vec::new(),
            stderr: Vec::new(),
        })
    }
}

/// Writes `bytes` to `dir/name` and returns a catalog entry JSON fragment
/// for an exe package pointing at it, with a correct sha256.
fn exe_entry(dir: &Path, app_id: &str, name: &str, deps: &[&str], bytes: &[u8]) -> String {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    let sha = hex::encode(Sha256::digest(bytes));
    format!(
        r#"{{"app_id": "{app_id}", "name": "{app_id}", "version": "1.0",
            "uri": "file://{}", "installer_kind": "exe", "sha256": "{sha}",
            "vetted_domains": [], "dependencies": [{}], "silent_args": []}}"#,
        path.display(),
        deps.iter()
            .map(|d| format!("\"{d}\""))
            .collect::<Vec<_>>()
            .join(", ")
    )
}

fn manager_with(
    catalog_json: &str,
    scratch: &Path,
    process_runner: Box<dyn ProcessRunner>,
    default_dry_run: bool,
) -> Manager {
    let catalog = Catalog::load_str(catalog_json, scratch).unwrap();
    let config = Config {
        download_dir: scratch.join("downloads"),
        state_file: scratch.join("installed.json"),
        default_dry_run,
        require_authenticode: false,
        acceptable_signature_statuses: vec![],
        request_confirmation: None,
    };
    Manager::with_adapters(
        catalog,
        config,
        Box::new(ReqwestHttpClient::default()),
        process_runner,
        Box::new(NoopAuthenticodeBackend),
    )
    .unwrap()
}

#[tokio::test]
async fn installing_a_linear_dependency_chain_records_both_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let json = format!(
        "[{}, {}]",
        exe_entry(dir.path(), "app", "app.exe", &["lib"], b"app bytes"),
        exe_entry(dir.path(), "lib", "lib.exe", &[], b"lib bytes"),
    );
    let manager = manager_with(&json, dir.path(), Box::new(FakeProcessRunner::succeeding()), false);

    let (record, run_result) = manager.install("app").await.unwrap();
    assert_eq!(record.app_id, "app");
    assert_eq!(record.version, "1.0");
    assert_eq!(record.dependencies_installed, vec!["lib".to_string()]);
    assert_eq!(run_result.exit_code, 0);

    let all = manager.status(StatusQuery::All);
    assert_eq!(all.len(), 2);
    assert!(manager
        .status(StatusQuery::One("lib"))
        .first()
        .is_some());
}

#[tokio::test]
async fn dry_run_never_persists_a_record() {
    let dir = tempfile::tempdir().unwrap();
    let json = exe_entry(dir.path(), "app", "app.exe", &[], b"app bytes");
    let json = format!("[{json}]");
    let manager = manager_with(&json, dir.path(), Box::new(FakeProcessRunner::succeeding()), true);

    let (_record, run_result) = manager.install("app").await.unwrap();
    assert_eq!(run_result.exit_code, 0);
    assert!(manager.status(StatusQuery::All).is_empty());
}

#[tokio::test]
async fn reinstalling_an_up_to_date_package_is_a_skip_and_returns_its_record() {
    let dir = tempfile::tempdir().unwrap();
    let json = exe_entry(dir.path(), "app", "app.exe", &[], b"app bytes");
    let json = format!("[{json}]");
    let manager = manager_with(&json, dir.path(), Box::new(FakeProcessRunner::succeeding()), false);

    manager.install("app").await.unwrap();
    let (record, run_result) = manager.install("app").await.unwrap();
    assert_eq!(record.app_id, "app");
    assert_eq!(run_result.argv, Vec::<String>::new());
}

#[tokio::test]
async fn uninstalling_a_package_still_depended_on_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let json = format!(
        "[{}, {}]",
        exe_entry(dir.path(), "app", "app.exe", &["lib"], b"app bytes"),
        exe_entry(dir.path(), "lib", "lib.exe", &[], b"lib bytes"),
    );
    let manager = manager_with(&json, dir.path(), Box::new(FakeProcessRunner::succeeding()), false);
    manager.install("app").await.unwrap();

    let err = manager.uninstall("lib").await.unwrap_err();
    match err {
        Error::DependencyHeld { app_id, dependents } => {
            assert_eq!(app_id, "lib");
            assert_eq!(dependents, vec!["app".to_string()]);
        }
        other => panic!("expected DependencyHeld, got {other:?}"),
    }
}

#[tokio::test]
async fn uninstalling_an_unheld_package_removes_its_record() {
    let dir = tempfile::tempdir().unwrap();
    let json = exe_entry(dir.path(), "app", "app.exe", &[], b"app bytes");
    let json = format!("[{json}]");
    let manager = manager_with(&json, dir.path(), Box::new(FakeProcessRunner::succeeding()), false);

    manager.install("app").await.unwrap();
    manager.uninstall("app").await.unwrap();
    assert!(manager.status(StatusQuery::One("app")).is_empty());
}

#[tokio::test]
async fn a_dependency_cycle_blocks_install_without_touching_anything() {
    let dir = tempfile::tempdir().unwrap();
    let a = format!(
        r#"{{"app_id": "a", "name": "a", "version": "1.0",
            "uri": "file://{}", "installer_kind": "exe", "sha256": "{}",
            "vetted_domains": [], "dependencies": ["b"], "silent_args": []}}"#,
        dir.path().join("a.exe").display(),
        "a".repeat(64),
    );
    let b = format!(
        r#"{{"app_id": "b", "name": "b", "version": "1.0",
            "uri": "file://{}", "installer_kind": "exe", "sha256": "{}",
            "vetted_domains": [], "dependencies": ["a"], "silent_args": []}}"#,
        dir.path().join("b.exe").display(),
        "a".repeat(64),
    );
    let json = format!("[{a}, {b}]");
    let manager = manager_with(&json, dir.path(), Box::new(FakeProcessRunner::succeeding()), false);

    let err = manager.install("a").await.unwrap_err();
    assert!(matches!(err, Error::PlanBlocked { .. }));
    assert!(manager.status(StatusQuery::All).is_empty());
}

#[tokio::test]
async fn an_unvetted_https_host_is_refused_before_a_manager_ever_sees_it() {
    // The catalog itself refuses to load an https descriptor whose own host
    // isn't in vetted_domains, so a Manager built on a loaded catalog can
    // never reach the fetcher with one — the rejection surfaces here, not as
    // an `Error::Fetch`.
    let dir = tempfile::tempdir().unwrap();
    let json = format!(
        r#"[{{"app_id": "app", "name": "app", "version": "1.0",
            "uri": "https://cdn.example.com/app.exe", "installer_kind": "exe",
            "sha256": "{}", "vetted_domains": [], "dependencies": [], "silent_args": []}}]"#,
        "a".repeat(64),
    );
    let err = Catalog::load_str(&json, dir.path()).unwrap_err();
    assert!(matches!(err, CatalogError::MissingVettedDomain(id) if id == "app"));
    assert!(!dir.path().join("downloads").join("app.exe").exists());
}

#[tokio::test]
async fn a_nonexistent_target_is_reported_as_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager_with("[]", dir.path(), Box::new(FakeProcessRunner::succeeding()), false);

    let err = manager.download("ghost").await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}
