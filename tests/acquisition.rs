// tests/acquisition.rs

//! Integration tests for base image and task repository acquisition.

mod common;

use common::{test_context, FakeHost};
use virt_prep::{Error, ImageAcquirer, KojiClient, Release};

#[test]
fn test_image_download_and_verify() {
    let (_temp, ctx) = test_context();
    let host = FakeHost::new();
    let acquirer = ImageAcquirer::new(&host, ctx.config());

    let image = acquirer.resolve_and_fetch(&ctx, Release::Fedora(40)).unwrap();

    assert!(image.verified);
    assert!(image.path.is_file());
    assert_eq!(image.path.parent(), Some(ctx.artifacts()));
    assert_eq!(host.count("curl"), 1);
    assert_eq!(host.count("qemu-img check"), 1);
}

#[test]
fn test_existing_image_is_not_downloaded_again() {
    let (_temp, ctx) = test_context();
    let existing = ctx.artifacts().join(Release::Rawhide.image_file_name());
    std::fs::write(&existing, b"cached").unwrap();

    let host = FakeHost::new();
    let acquirer = ImageAcquirer::new(&host, ctx.config());
    let path = acquirer.fetch(&ctx, Release::Rawhide).unwrap();

    assert_eq!(path, existing);
    assert!(host.commands().is_empty());
    assert_eq!(std::fs::read(&path).unwrap(), b"cached");
}

#[test]
fn test_failed_download_leaves_no_partial_image() {
    let (_temp, ctx) = test_context();
    let host = FakeHost::new().fail("curl");
    let acquirer = ImageAcquirer::new(&host, ctx.config());

    let err = acquirer.fetch(&ctx, Release::Fedora(39)).unwrap_err();
    assert!(matches!(err, Error::DownloadError(_)));
    assert!(!ctx.artifacts().join(Release::Fedora(39).image_file_name()).exists());
}

#[test]
fn test_corrupt_image() {
    let (_temp, ctx) = test_context();
    let host = FakeHost::new().fail("qemu-img check");
    let acquirer = ImageAcquirer::new(&host, ctx.config());

    let err = acquirer.resolve_and_fetch(&ctx, Release::Fedora(40)).unwrap_err();
    assert!(matches!(err, Error::CorruptImageError { .. }));
}

#[test]
fn test_materialize_scratch_task() {
    let (_temp, ctx) = test_context();
    let host = FakeHost::new().scratch();
    let koji = KojiClient::new(&host, ctx.config());

    let repo = koji.materialize(&ctx, 4242).unwrap();

    assert_eq!(repo.path, ctx.task_repo_dir(4242));
    assert_eq!(repo.scratch, Some(true));
    assert!(repo.path.join("repodata/repomd.xml").is_file());
    assert_eq!(repo.packages().unwrap().len(), 2);
    assert_eq!(
        host.count("download-task --arch=x86_64 --arch=src --arch=noarch 4242"),
        1
    );
    assert_eq!(host.count("createrepo ."), 1);
}

#[test]
fn test_materialize_official_build() {
    let (_temp, ctx) = test_context();
    let host = FakeHost::new();
    let koji = KojiClient::new(&host, ctx.config());

    let repo = koji.materialize(&ctx, 99).unwrap();
    assert_eq!(repo.scratch, Some(false));
    assert_eq!(
        host.count("download-build --debuginfo --arch=x86_64 --arch=src --arch=noarch --task-id 99"),
        1
    );
}

#[test]
fn test_existing_task_repo_is_reused() {
    let (_temp, ctx) = test_context();
    let dir = ctx.task_repo_dir(7);
    std::fs::create_dir_all(dir.join("repodata")).unwrap();
    std::fs::write(dir.join("repodata/repomd.xml"), b"<repomd/>").unwrap();

    let host = FakeHost::new();
    let koji = KojiClient::new(&host, ctx.config());
    let repo = koji.materialize(&ctx, 7).unwrap();

    assert_eq!(repo.path, dir);
    assert_eq!(repo.scratch, None);
    assert!(host.commands().is_empty());
}

#[test]
fn test_unindexed_task_repo_is_only_indexed() {
    let (_temp, ctx) = test_context();
    std::fs::create_dir_all(ctx.task_repo_dir(8)).unwrap();

    let host = FakeHost::new();
    let koji = KojiClient::new(&host, ctx.config());
    koji.materialize(&ctx, 8).unwrap();

    assert_eq!(host.commands(), vec!["createrepo ."]);
}

#[test]
fn test_task_download_is_retried() {
    let (_temp, ctx) = test_context();
    let host = FakeHost::new().flaky("download-build", 2);
    let koji = KojiClient::new(&host, ctx.config());

    koji.materialize(&ctx, 5).unwrap();
    assert_eq!(host.count("download-build"), 3);
}

#[test]
fn test_task_download_gives_up() {
    let (_temp, ctx) = test_context();
    let host = FakeHost::new().fail("download-build");
    let koji = KojiClient::new(&host, ctx.config());

    let err = koji.materialize(&ctx, 5).unwrap_err();
    assert!(matches!(err, Error::FetchError { task_id: 5, .. }));
    assert_eq!(host.count("download-build"), 5);
    assert_eq!(host.count("createrepo"), 0);
}

#[test]
fn test_createrepo_failure() {
    let (_temp, ctx) = test_context();
    let host = FakeHost::new().fail("createrepo");
    let koji = KojiClient::new(&host, ctx.config());

    let err = koji.materialize(&ctx, 6).unwrap_err();
    assert!(matches!(err, Error::RepoIndexError { .. }));
}
