// tests/installer.rs

//! Integration tests for conflict-aware installation against a scripted guest.

mod common;

use common::{fedora_guest, test_config};
use std::path::{Path, PathBuf};
use virt_prep::installer::{self, Installer, Rejection};
use virt_prep::{Error, ImageSession, ScriptedGuest, TaskRepository};

const CANDIDATES_QUERY: &str = "--all --qf";
const INSTALLED_QUERY: &str = "rpm -qa";

fn repos(ids: &[u64]) -> Vec<TaskRepository> {
    ids.iter()
        .map(|id| TaskRepository {
            task_id: *id,
            path: PathBuf::from(format!("/art/task_repos/{}", id)),
            scratch: Some(true),
        })
        .collect()
}

fn session(guest: ScriptedGuest) -> ImageSession<ScriptedGuest> {
    ImageSession::with_executor(Path::new("/art/Fedora-Rawhide.qcow2"), guest, 4096).unwrap()
}

fn install_command(handle: &ScriptedGuest) -> Option<String> {
    handle
        .shell_commands()
        .into_iter()
        .find(|cmd| cmd.starts_with("dnf install"))
}

#[test]
fn test_installed_conflict_excludes_provider() {
    let guest = fedora_guest()
        .on(CANDIDATES_QUERY, "x86_64:A\nx86_64:B\n")
        .on(INSTALLED_QUERY, "C\n")
        .on("--whatprovides 'C'", "A\n");
    let handle = guest.clone();
    let mut session = session(guest);

    let plan = installer::install(&mut session, &repos(&[100]), &test_config()).unwrap();

    assert_eq!(plan.packages(), ["B"]);
    assert_eq!(
        plan.rejected(),
        [("A".to_string(), Rejection::ConflictsWithInstalled)]
    );
    // A is rejected before its own conflicts are ever queried
    assert_eq!(handle.count("--conflict 'A'"), 0);

    let install = install_command(&handle).unwrap();
    assert!(install.starts_with("dnf install -y --best --allowerasing --nogpgcheck"));
    assert!(install.ends_with(" B"));
}

#[test]
fn test_pairwise_conflict_keeps_first_accepted() {
    let guest = fedora_guest()
        .on(CANDIDATES_QUERY, "x86_64:B\nnoarch:A\n")
        .on("--conflict 'A'", "libb.so.1()(64bit)\n")
        .on("--whatprovides 'libb.so.1()(64bit)'", "B\n");
    let handle = guest.clone();
    let mut session = session(guest);

    let plan = installer::install(&mut session, &repos(&[100]), &test_config()).unwrap();

    assert_eq!(plan.packages(), ["A"]);
    assert!(matches!(
        plan.rejected(),
        [(name, Rejection::ConflictedByAccepted { with, .. })] if name == "B" && with == "A"
    ));
    assert!(install_command(&handle).unwrap().ends_with(" A"));
}

#[test]
fn test_candidate_conflicting_with_accepted_is_rejected() {
    let guest = fedora_guest()
        .on(CANDIDATES_QUERY, "x86_64:A\nx86_64:B\nx86_64:C\n")
        .on("--conflict 'B'", "a-compat\n")
        .on("--whatprovides 'a-compat'", "A\n");
    let mut session = session(guest);

    let plan = installer::install(&mut session, &repos(&[100]), &test_config()).unwrap();
    assert_eq!(plan.packages(), ["A", "C"]);
    assert_eq!(plan.rejected().len(), 1);
    assert_eq!(plan.rejected()[0].0, "B");
}

#[test]
fn test_source_and_debug_packages_are_never_installed() {
    let guest = fedora_guest().on(
        CANDIDATES_QUERY,
        "src:foo\nx86_64:foo\nx86_64:foo-debuginfo\nx86_64:foo-debugsource\nx86_64:foo-libs\nnoarch:foo\n",
    );
    let handle = guest.clone();
    let mut session = session(guest);

    let plan = installer::install(&mut session, &repos(&[100]), &test_config()).unwrap();
    assert_eq!(plan.packages(), ["foo", "foo-libs"]);
    assert_eq!(handle.count("--conflict 'foo-debuginfo'"), 0);
    assert_eq!(handle.count("--conflict 'foo'"), 1);
}

#[test]
fn test_queries_are_scoped_to_task_repos() {
    let guest = fedora_guest().on(CANDIDATES_QUERY, "x86_64:foo\n");
    let handle = guest.clone();
    let mut session = session(guest);

    installer::install(&mut session, &repos(&[100, 200]), &test_config()).unwrap();

    let scope = "--disablerepo=* --enablerepo=100 --repofrompath=100,/opt/task_repos/100 \
                 --enablerepo=200 --repofrompath=200,/opt/task_repos/200";
    let candidates = handle
        .shell_commands()
        .into_iter()
        .find(|cmd| cmd.contains(CANDIDATES_QUERY))
        .unwrap();
    assert_eq!(
        candidates,
        format!("dnf repoquery -q {} --all --qf=\"%{{ARCH}}:%{{NAME}}\"", scope)
    );

    let install = install_command(&handle).unwrap();
    assert!(install.contains("--enablerepo=100"));
    assert!(install.contains("--enablerepo=200"));
    assert!(!install.contains("--disablerepo"));
}

#[test]
fn test_no_candidates() {
    let guest = fedora_guest().on(CANDIDATES_QUERY, "src:foo\nx86_64:foo-debuginfo\n");
    let handle = guest.clone();
    let mut session = session(guest);

    let err = installer::install(&mut session, &repos(&[100]), &test_config()).unwrap_err();
    assert!(matches!(err, Error::NoCandidatesError));
    assert!(install_command(&handle).is_none());
}

#[test]
fn test_every_candidate_rejected() {
    let guest = fedora_guest()
        .on(CANDIDATES_QUERY, "x86_64:A\nx86_64:B\n")
        .on(INSTALLED_QUERY, "C\n")
        .on("--whatprovides 'C'", "A\nB\n");
    let handle = guest.clone();
    let mut session = session(guest);

    let err = installer::install(&mut session, &repos(&[100]), &test_config()).unwrap_err();
    assert!(matches!(err, Error::EmptyPlanError));
    assert!(install_command(&handle).is_none());
}

#[test]
fn test_installed_conflict_query_is_retried() {
    let guest = fedora_guest()
        .on(CANDIDATES_QUERY, "x86_64:A\n")
        .on_flaky(INSTALLED_QUERY, 4, "");
    let handle = guest.clone();
    let mut session = session(guest);

    let plan = installer::install(&mut session, &repos(&[100]), &test_config()).unwrap();
    assert_eq!(plan.packages(), ["A"]);
    assert_eq!(handle.count(INSTALLED_QUERY), 5);
}

#[test]
fn test_installed_conflict_query_gives_up() {
    let guest = fedora_guest()
        .on(CANDIDATES_QUERY, "x86_64:A\n")
        .on_fail(INSTALLED_QUERY, "dnf is locked");
    let handle = guest.clone();
    let mut session = session(guest);

    let err = installer::install(&mut session, &repos(&[100]), &test_config()).unwrap_err();
    assert!(matches!(err, Error::QueryError(_)));
    assert_eq!(handle.count(INSTALLED_QUERY), 5);
}

#[test]
fn test_install_failure() {
    let guest = fedora_guest()
        .on(CANDIDATES_QUERY, "x86_64:A\n")
        .on_fail("dnf install", "nothing provides libfoo");
    let mut session = session(guest);

    match installer::install(&mut session, &repos(&[100]), &test_config()) {
        Err(Error::InstallError { packages, message }) => {
            assert_eq!(packages, "A");
            assert!(message.contains("nothing provides libfoo"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_plan_without_install() {
    let guest = fedora_guest().on(CANDIDATES_QUERY, "x86_64:b\nx86_64:a\nx86_64:a\n");
    let handle = guest.clone();
    let mut session = session(guest);
    let config = test_config();
    let repos = repos(&[100]);

    let plan = Installer::new(&mut session, &repos, &config).plan().unwrap();
    assert_eq!(plan.packages(), ["a", "b"]);
    assert!(install_command(&handle).is_none());
}
