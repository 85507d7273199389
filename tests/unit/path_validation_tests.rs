use afd_webui::files::{resolve_within, write_atomic};
use afd_webui::AppError;

#[test]
fn nested_relative_paths_resolve_under_base() {
    let dir = tempfile::tempdir().expect("tempdir");
    let resolved = resolve_within(dir.path(), "./groups/group.list").expect("resolve");
    let root = dir.path().canonicalize().expect("canonical");
    assert_eq!(resolved, root.join("groups").join("group.list"));
}

#[test]
fn embedded_parent_segment_is_refused() {
    let dir = tempfile::tempdir().expect("tempdir");
    let result = resolve_within(dir.path(), "groups/../../HOST_CONFIG");
    assert!(matches!(result, Err(AppError::PathViolation(_))));
}

#[test]
fn empty_name_is_refused() {
    let dir = tempfile::tempdir().expect("tempdir");
    assert!(matches!(
        resolve_within(dir.path(), ""),
        Err(AppError::PathViolation(_))
    ));
    assert!(matches!(
        resolve_within(dir.path(), "."),
        Err(AppError::PathViolation(_))
    ));
}

#[cfg(unix)]
#[test]
fn symlink_escaping_base_is_refused() {
    let base = tempfile::tempdir().expect("tempdir");
    let outside = tempfile::tempdir().expect("tempdir");
    let secret = outside.path().join("secret");
    std::fs::write(&secret, "x").expect("write");
    std::os::unix::fs::symlink(&secret, base.path().join("INFO-hostA")).expect("symlink");

    let result = resolve_within(base.path(), "INFO-hostA");
    assert!(matches!(result, Err(AppError::PathViolation(_))));
}

#[test]
fn atomic_write_creates_missing_target() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = dir.path().join("INFO-hostB");
    write_atomic(&target, b"operator notes").expect("write");
    assert_eq!(
        std::fs::read_to_string(&target).expect("read"),
        "operator notes"
    );
}

#[test]
fn atomic_write_without_parent_dir_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = dir.path().join("missing").join("file");
    assert!(matches!(
        write_atomic(&target, b"x"),
        Err(AppError::Io(_))
    ));
}
