use std::fs;
use std::time::{Duration, Instant};

mod support;

use trustrpc::{paths, CredentialStore, Error};

use support::enroll;

const INTERVAL: Duration = Duration::from_millis(50);

/// Polls `check` until it holds or a generous deadline expires.
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(INTERVAL / 2).await;
    }
    check()
}

#[tokio::test]
async fn background_refresh_tracks_credential_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = CredentialStore::new(dir.path(), INTERVAL);
    assert!(matches!(store.lookup("alice"), Err(Error::UnknownUser(_))));

    enroll(dir.path(), "alice", b"p@ss");
    let stored = trustrpc::config::PwdFile::load(&paths::pwd_file_in(dir.path(), "alice"))
        .unwrap()
        .pwd_hash;
    assert!(eventually(|| store.lookup("alice").ok().as_ref() == Some(&stored)).await);

    fs::remove_file(paths::pwd_file_in(dir.path(), "alice")).unwrap();
    assert!(eventually(|| matches!(store.lookup("alice"), Err(Error::UnknownUser(_)))).await);
}

#[tokio::test]
async fn lookups_proceed_during_refresh() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..20 {
        enroll(dir.path(), &format!("user{i}"), b"secret");
    }
    let store = CredentialStore::new(dir.path(), Duration::from_millis(1));
    assert!(eventually(|| store.users().len() == 20).await);

    let mut readers = Vec::new();
    for _ in 0..4 {
        let store = store.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..200 {
                let hash = store.lookup("user7").expect("user7 is never removed");
                assert!(!hash.is_empty());
                tokio::task::yield_now().await;
            }
        }));
    }
    for i in 10..20 {
        fs::remove_file(paths::pwd_file_in(dir.path(), &format!("user{i}"))).unwrap();
    }
    for reader in readers {
        reader.await.unwrap();
    }
    assert!(eventually(|| store.users().len() == 10).await);
}
