use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::tempdir;

use gallery_sync::config::{Config, UserConfig};
use gallery_sync::remote::{MockRemoteStore, RemoteCollectionRef};
use gallery_sync::sync::synchronise;
use gallery_sync::SyncError;

fn test_config(root: &Path, trash: &Path) -> Config {
    Config {
        api_url: "http://localhost:1".to_string(),
        root_folder: root.to_path_buf(),
        trash_folder: trash.to_path_buf(),
        supported_formats: Config::default_formats(),
        users: vec![UserConfig {
            name: "Alice".to_string(),
            login: "alice".to_string(),
            password: "secret".to_string(),
        }],
        dry_run: false,
    }
}

fn touch(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"pixels").unwrap();
}

#[tokio::test]
async fn full_run_uploads_creates_collection_and_moves_files_to_trash() {
    let root = tempdir().unwrap();
    let trash = tempdir().unwrap();
    fs::create_dir_all(root.path().join("alice/Cats")).unwrap();
    fs::write(
        root.path().join("alice/Cats/setup.yaml"),
        "tags: [fluffy]\ndeletion_strategy_folder: nothing\n",
    )
    .unwrap();
    touch(&root.path().join("alice/Cats/a.jpg"));
    touch(&root.path().join("alice/Cats/b.jpg"));

    let mut remote = MockRemoteStore::new();
    remote
        .expect_list_collections()
        .times(1)
        .returning(|_| Ok(vec![]));
    remote
        .expect_create_collection()
        .times(1)
        .withf(|owner, name, tags| {
            owner == "alice" && name == "Cats" && tags.len() == 1 && tags[0] == "fluffy"
        })
        .returning(|_, name, tags| {
            Ok(RemoteCollectionRef {
                id: 1,
                name: name.to_string(),
                tags: tags.to_vec(),
            })
        });
    remote
        .expect_upload_file()
        .times(2)
        .withf(|_, _, _, bytes, tags| {
            bytes.as_slice() == b"pixels" && tags.len() == 1 && tags[0] == "fluffy"
        })
        .returning(|_, _, _, _, _| Ok(()));

    let config = test_config(root.path(), trash.path());
    let report = synchronise(&config, &remote).await.unwrap();

    assert_eq!(report.owners.len(), 1);
    let alice = &report.owners[0];
    assert_eq!(alice.collections_created, 1);
    assert_eq!(alice.uploaded, 2);
    assert_eq!(alice.skipped, 0);
    assert!(alice.failures.is_empty());

    // Default file strategy is move: both files mirror into trash.
    assert!(trash.path().join("alice/Cats/a.jpg").exists());
    assert!(trash.path().join("alice/Cats/b.jpg").exists());
    assert!(!root.path().join("alice/Cats/a.jpg").exists());
    // Folder strategy was nothing, so the directory stays.
    assert!(root.path().join("alice/Cats").exists());
}

#[tokio::test]
async fn replayed_run_skips_uploads_but_still_disposes() {
    let root = tempdir().unwrap();
    let trash = tempdir().unwrap();
    fs::create_dir_all(root.path().join("alice/Cats")).unwrap();
    fs::write(
        root.path().join("alice/Cats/setup.yaml"),
        "deletion_strategy_file: delete\ndeletion_strategy_folder: delete\n",
    )
    .unwrap();
    touch(&root.path().join("alice/Cats/a.jpg"));

    let mut remote = MockRemoteStore::new();
    remote.expect_list_collections().times(1).returning(|_| {
        Ok(vec![RemoteCollectionRef {
            id: 1,
            name: "Cats".to_string(),
            tags: vec![],
        }])
    });
    remote
        .expect_contains_file()
        .times(1)
        .returning(|_, _, _| Ok(true));
    // No create_collection or upload_file expectations: any call panics.

    let config = test_config(root.path(), trash.path());
    let report = synchronise(&config, &remote).await.unwrap();

    let alice = &report.owners[0];
    assert_eq!(alice.uploaded, 0);
    assert_eq!(alice.already_present, 1);

    // Verified-present file is disposed of, and the folder follows.
    assert!(!root.path().join("alice/Cats/a.jpg").exists());
    assert!(!root.path().join("alice/Cats").exists());
}

#[tokio::test]
async fn failed_upload_leaves_file_and_folder_for_next_run() {
    let root = tempdir().unwrap();
    let trash = tempdir().unwrap();
    fs::create_dir_all(root.path().join("alice/Cats")).unwrap();
    fs::write(
        root.path().join("alice/Cats/setup.yaml"),
        "deletion_strategy_folder: delete\n",
    )
    .unwrap();
    touch(&root.path().join("alice/Cats/a.jpg"));

    let mut remote = MockRemoteStore::new();
    remote
        .expect_list_collections()
        .returning(|_| Ok(vec![]));
    remote.expect_create_collection().returning(|_, name, tags| {
        Ok(RemoteCollectionRef {
            id: 1,
            name: name.to_string(),
            tags: tags.to_vec(),
        })
    });
    remote
        .expect_upload_file()
        .returning(|_, _, _, _, _| Err(SyncError::RemoteConflict("duplicate content".into())));

    let config = test_config(root.path(), trash.path());
    let report = synchronise(&config, &remote).await.unwrap();

    let alice = &report.owners[0];
    assert_eq!(alice.uploaded, 0);
    assert_eq!(alice.skipped, 1);
    assert!(!alice.failures.is_empty());

    assert!(root.path().join("alice/Cats/a.jpg").exists());
    assert!(root.path().join("alice/Cats").exists());
}

#[tokio::test]
async fn failed_tag_merge_keeps_files_and_folder_for_next_run() {
    let root = tempdir().unwrap();
    let trash = tempdir().unwrap();
    fs::create_dir_all(root.path().join("alice/Cats")).unwrap();
    fs::write(
        root.path().join("alice/Cats/setup.yaml"),
        "tags: [fluffy]\ndeletion_strategy_file: delete\ndeletion_strategy_folder: delete\n",
    )
    .unwrap();
    touch(&root.path().join("alice/Cats/a.jpg"));

    let mut remote = MockRemoteStore::new();
    remote.expect_list_collections().returning(|_| {
        Ok(vec![RemoteCollectionRef {
            id: 1,
            name: "Cats".to_string(),
            tags: vec![],
        }])
    });
    remote
        .expect_add_tags()
        .times(1)
        .returning(|_, _, _| Err(SyncError::RemoteConflict("tags rejected".into())));
    remote
        .expect_contains_file()
        .returning(|_, _, _| Ok(true));

    let config = test_config(root.path(), trash.path());
    let report = synchronise(&config, &remote).await.unwrap();

    let alice = &report.owners[0];
    assert_eq!(alice.tags_merged, 0);
    assert_eq!(alice.already_present, 1);
    assert!(!alice.failures.is_empty());

    // The merge must get another chance: disposing of the files would
    // empty the collection out of the next run's tree, so everything
    // stays in place despite the delete strategies.
    assert!(root.path().join("alice/Cats/a.jpg").exists());
    assert!(root.path().join("alice/Cats").exists());
}

#[tokio::test]
async fn transient_upload_errors_are_retried_until_success() {
    let root = tempdir().unwrap();
    let trash = tempdir().unwrap();
    fs::create_dir_all(root.path().join("alice/Cats")).unwrap();
    touch(&root.path().join("alice/Cats/a.jpg"));

    let attempts = Box::leak(Box::new(AtomicUsize::new(0)));

    let mut remote = MockRemoteStore::new();
    remote
        .expect_list_collections()
        .returning(|_| Ok(vec![]));
    remote.expect_create_collection().returning(|_, name, _| {
        Ok(RemoteCollectionRef {
            id: 1,
            name: name.to_string(),
            tags: vec![],
        })
    });
    remote
        .expect_upload_file()
        .times(3)
        .returning(|_, _, _, _, _| {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(SyncError::Transient("connection reset".into()))
            } else {
                Ok(())
            }
        });

    let config = test_config(root.path(), trash.path());
    let report = synchronise(&config, &remote).await.unwrap();

    assert_eq!(report.owners[0].uploaded, 1);
    assert!(trash.path().join("alice/Cats/a.jpg").exists());
}

#[tokio::test]
async fn exhausted_retries_demote_the_file_and_keep_its_folder() {
    let root = tempdir().unwrap();
    let trash = tempdir().unwrap();
    fs::create_dir_all(root.path().join("alice/Cats")).unwrap();
    fs::write(
        root.path().join("alice/Cats/setup.yaml"),
        "deletion_strategy_folder: delete\n",
    )
    .unwrap();
    touch(&root.path().join("alice/Cats/a.jpg"));

    let mut remote = MockRemoteStore::new();
    remote
        .expect_list_collections()
        .returning(|_| Ok(vec![]));
    remote.expect_create_collection().returning(|_, name, _| {
        Ok(RemoteCollectionRef {
            id: 1,
            name: name.to_string(),
            tags: vec![],
        })
    });
    // Exactly three attempts, then the file is given up on.
    remote
        .expect_upload_file()
        .times(3)
        .returning(|_, _, _, _, _| Err(SyncError::Transient("connection reset".into())));

    let config = test_config(root.path(), trash.path());
    let report = synchronise(&config, &remote).await.unwrap();

    let alice = &report.owners[0];
    assert_eq!(alice.uploaded, 0);
    assert_eq!(alice.skipped, 1);
    assert!(!alice.failures.is_empty());

    assert!(root.path().join("alice/Cats/a.jpg").exists());
    assert!(root.path().join("alice/Cats").exists());
}

#[tokio::test]
async fn owner_without_credentials_is_skipped_without_remote_calls() {
    let root = tempdir().unwrap();
    let trash = tempdir().unwrap();
    fs::create_dir_all(root.path().join("stranger/Pics")).unwrap();
    touch(&root.path().join("stranger/Pics/a.jpg"));

    // Mock with no expectations: any remote call panics the test.
    let remote = MockRemoteStore::new();

    let config = test_config(root.path(), trash.path());
    let report = synchronise(&config, &remote).await.unwrap();

    assert!(report.owners.is_empty());
    assert!(root.path().join("stranger/Pics/a.jpg").exists());
}

#[tokio::test]
async fn listing_failure_demotes_the_owner_not_the_run() {
    let root = tempdir().unwrap();
    let trash = tempdir().unwrap();
    fs::create_dir_all(root.path().join("alice/Cats")).unwrap();
    touch(&root.path().join("alice/Cats/a.jpg"));

    let mut remote = MockRemoteStore::new();
    remote
        .expect_list_collections()
        .returning(|_| Err(SyncError::RemoteConflict("listing denied".into())));

    let config = test_config(root.path(), trash.path());
    let report = synchronise(&config, &remote).await.unwrap();

    assert_eq!(report.owners.len(), 1);
    assert!(!report.owners[0].failures.is_empty());
    assert!(root.path().join("alice/Cats/a.jpg").exists());
}

#[tokio::test]
async fn malformed_setup_aborts_the_whole_run() {
    let root = tempdir().unwrap();
    let trash = tempdir().unwrap();
    fs::create_dir_all(root.path().join("alice/Cats")).unwrap();
    fs::write(
        root.path().join("alice/Cats/setup.yaml"),
        "deletion_strategy_file: 42\n",
    )
    .unwrap();
    touch(&root.path().join("alice/Cats/a.jpg"));

    let remote = MockRemoteStore::new();
    let config = test_config(root.path(), trash.path());

    let err = synchronise(&config, &remote).await.unwrap_err();
    assert!(err.is_fatal());
    assert!(root.path().join("alice/Cats/a.jpg").exists());
}

#[tokio::test]
async fn dry_run_reports_work_but_changes_nothing() {
    let root = tempdir().unwrap();
    let trash = tempdir().unwrap();
    fs::create_dir_all(root.path().join("alice/Cats")).unwrap();
    touch(&root.path().join("alice/Cats/a.jpg"));

    let mut remote = MockRemoteStore::new();
    remote
        .expect_list_collections()
        .returning(|_| Ok(vec![]));
    // No mutation expectations: create/upload calls would panic.

    let mut config = test_config(root.path(), trash.path());
    config.dry_run = true;

    let report = synchronise(&config, &remote).await.unwrap();
    let alice = &report.owners[0];
    assert_eq!(alice.collections_created, 1);
    assert_eq!(alice.uploaded, 1);

    assert!(root.path().join("alice/Cats/a.jpg").exists());
    assert!(!trash.path().join("alice/Cats/a.jpg").exists());
}
