use std::path::{Path, PathBuf};

use proptest::prelude::*;

use binwatch::fs::mock::MockFileSystem;
use binwatch::watch::{
    compute_content_fingerprint, fingerprint_file, Fingerprint, FingerprintOrigin, WatchTarget,
};

const DIR: &str = "/srv/models";

fn artifact() -> PathBuf {
    Path::new(DIR).join("model.bin")
}

#[test]
fn content_fingerprint_is_blake3_of_the_bytes() {
    let fs = MockFileSystem::new();
    fs.add_file(artifact(), b"hello world".to_vec());

    let fp = compute_content_fingerprint(&fs, &artifact()).unwrap();
    // blake3 hash of "hello world"
    assert_eq!(
        fp.to_hex(),
        "d74981efa70a0c880b8d8c1985d075dbcbf679b99a5f9914e5aaf96b831a9e24"
    );
    assert_eq!(fp.origin(), FingerprintOrigin::Content);
    assert_eq!(fp.short(), "d74981efa70a");
}

#[test]
fn unreadable_and_missing_files_get_metadata_fingerprints() {
    let fs = MockFileSystem::new();
    fs.add_file(artifact(), b"weights".to_vec());
    fs.set_unreadable(artifact(), true);

    let locked = fingerprint_file(&fs, &artifact());
    assert_eq!(locked.origin(), FingerprintOrigin::Metadata);
    assert_ne!(locked, Fingerprint::from_content(b"weights"));

    let missing = fingerprint_file(&fs, &Path::new(DIR).join("gone.bin"));
    assert_eq!(missing.origin(), FingerprintOrigin::Metadata);
    assert_ne!(missing, locked);
}

#[test]
fn extension_filter_accepts_siblings_only_by_extension() {
    let target = WatchTarget::new(DIR, "model.bin").unwrap();
    assert!(target.accepts(&artifact()));
    assert!(target.accepts(Path::new("/srv/models/model.bin.tmp.bin")));
    assert!(!target.accepts(Path::new("/srv/models/README.md")));
    assert!(!target.accepts(Path::new("/srv/models/model.bin.part")));

    let bare = WatchTarget::new(DIR, "weights").unwrap();
    assert!(bare.accepts(Path::new("/srv/models/weights")));
    assert!(!bare.accepts(Path::new("/srv/models/weights2")));
}

proptest! {
    #[test]
    fn identical_content_never_counts_as_a_change(content in proptest::collection::vec(any::<u8>(), 0..4096)) {
        let fs = MockFileSystem::new();
        fs.add_file(artifact(), content.clone());

        let mut target = WatchTarget::new(DIR, "model.bin").unwrap();
        target.baseline(&fs);

        fs.add_file(artifact(), content.clone());
        fs.touch(artifact());
        prop_assert!(target.observe(&fs).is_none());
        prop_assert_eq!(target.fingerprint(), Some(Fingerprint::from_content(&content)));
    }

    #[test]
    fn different_content_is_always_reported(
        before in proptest::collection::vec(any::<u8>(), 0..1024),
        after in proptest::collection::vec(any::<u8>(), 0..1024),
    ) {
        prop_assume!(before != after);

        let fs = MockFileSystem::new();
        fs.add_file(artifact(), before.clone());
        let mut target = WatchTarget::new(DIR, "model.bin").unwrap();
        target.baseline(&fs);

        fs.add_file(artifact(), after.clone());
        let event = target.observe(&fs);
        prop_assert!(event.is_some());
        let event = event.unwrap();
        prop_assert_eq!(event.fingerprint, Fingerprint::from_content(&after));
        prop_assert_eq!(event.previous, Some(Fingerprint::from_content(&before)));

        // Seen once, not again.
        prop_assert!(target.observe(&fs).is_none());
    }
}
