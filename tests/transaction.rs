//! End-to-end transactions against a temp offline root and a `file://`
//! repository of generated `.ipk` fixtures.

mod common;

use aept::error::AeptError;
use common::{opts, PkgBuilder, Repo, Rig};
use std::fs;

fn md5_hex(content: &[u8]) -> String {
    format!("{:x}", md5::compute(content))
}

#[test]
fn clean_install_from_empty() {
    let repo = Repo::new();
    repo.publish(
        &PkgBuilder::new("a", "1.0")
            .file("/usr/bin/tool", b"#!/bin/sh\n", 0o755)
            .file("/usr/share/doc/a/README", b"docs\n", 0o644),
    );
    let rig = Rig::new(&repo);
    rig.update().unwrap();
    rig.install(&["a"]).unwrap();

    let status = rig.status_text();
    assert!(status.contains("Package: a"));
    assert!(status.contains("Version: 1.0"));
    assert!(status.contains("Status: install ok installed"));
    assert_eq!(status.matches("Package:").count(), 1);

    let list = fs::read_to_string(rig.db().info_path("a", "list")).unwrap();
    assert!(list.ends_with('\n'));
    assert!(list.contains("./usr/bin/tool\t755"));
    assert!(list.contains("./usr/share/doc/a/README\t644"));

    assert_eq!(fs::read(rig.real("/usr/bin/tool")).unwrap(), b"#!/bin/sh\n");
    assert!(rig.db().load_auto().unwrap().is_empty());
    assert!(rig.cfg.cache_dir.join("a_1.0.ipk").exists());
}

#[test]
fn dependency_chain_marks_auto_and_autoremove_cleans_up() {
    let repo = Repo::new();
    repo.publish(&PkgBuilder::new("a", "1.0").depends("b").file("/usr/bin/a", b"a", 0o755));
    repo.publish(&PkgBuilder::new("b", "1.0").file("/usr/bin/b", b"b", 0o755));
    let rig = Rig::new(&repo);
    rig.update().unwrap();
    rig.install(&["a"]).unwrap();

    let mut installed = rig.installed_names();
    installed.sort();
    assert_eq!(installed, vec!["a", "b"]);
    let auto = rig.db().load_auto().unwrap();
    assert!(!auto.contains("a"));
    assert!(auto.contains("b"));

    // b is still reachable from the manually installed a
    rig.autoremove().unwrap();
    assert_eq!(rig.installed_names().len(), 2);

    rig.remove(&["a"]).unwrap();
    rig.autoremove().unwrap();
    assert!(rig.installed_names().is_empty());
    assert!(!rig.real("/usr/bin/b").exists());
    assert!(rig.db().load_auto().unwrap().is_empty());
}

#[test]
fn install_remove_round_trips_to_pristine() {
    let repo = Repo::new();
    repo.publish(
        &PkgBuilder::new("a", "1.0")
            .file("/usr/bin/tool", b"tool", 0o755)
            .symlink("/usr/bin/t", "tool")
            .conffile("/etc/a.conf", b"conf\n"),
    );
    let rig = Rig::new(&repo);
    rig.update().unwrap();
    rig.install(&["a"]).unwrap();
    rig.remove(&["a"]).unwrap();

    assert_eq!(rig.status_text(), "");
    assert!(!rig.real("/usr/bin/tool").exists());
    assert!(rig.real("/usr/bin/t").symlink_metadata().is_err());
    // unmodified conffile goes too
    assert!(!rig.real("/etc/a.conf").exists());
    assert!(!rig.db().info_path("a", "list").exists());
    assert!(!rig.db().info_path("a", "control").exists());
    assert!(!rig.db().info_path("a", "conffiles").exists());
}

#[test]
fn remove_preserves_modified_conffile_unless_purged() {
    let repo = Repo::new();
    repo.publish(&PkgBuilder::new("a", "1.0").conffile("/etc/a.conf", b"original\n"));
    let rig = Rig::new(&repo);
    rig.update().unwrap();
    rig.install(&["a"]).unwrap();
    fs::write(rig.real("/etc/a.conf"), b"edited by hand\n").unwrap();

    rig.remove(&["a"]).unwrap();
    assert_eq!(fs::read(rig.real("/etc/a.conf")).unwrap(), b"edited by hand\n");

    // purge takes it out
    rig.install(&["a"]).unwrap();
    let mut purge = opts();
    purge.purge = true;
    // the fresh install recorded the on-disk md5, modify again
    fs::write(rig.real("/etc/a.conf"), b"edited again\n").unwrap();
    rig.remove_with(&["a"], &purge).unwrap();
    assert!(!rig.real("/etc/a.conf").exists());
}

#[test]
fn upgrade_replaces_files_and_status() {
    let repo = Repo::new();
    repo.publish(&PkgBuilder::new("a", "1.0").file("/usr/bin/tool", b"one", 0o755).file("/usr/bin/gone", b"x", 0o755));
    let rig = Rig::new(&repo);
    rig.update().unwrap();
    rig.install(&["a"]).unwrap();
    assert!(rig.status_text().contains("Version: 1.0"));

    repo.publish(&PkgBuilder::new("a", "2.0").file("/usr/bin/tool", b"two", 0o755));
    rig.update().unwrap();
    rig.upgrade_all().unwrap();
    let status = rig.status_text();
    assert!(status.contains("Version: 2.0"));
    assert_eq!(status.matches("Package:").count(), 1);
    assert_eq!(fs::read(rig.real("/usr/bin/tool")).unwrap(), b"two");
    // files the new version no longer ships are cleaned up
    assert!(!rig.real("/usr/bin/gone").exists());
}

#[test]
fn upgrade_with_modified_conffile_keeps_edit_and_stages_candidate() {
    let repo = Repo::new();
    repo.publish(&PkgBuilder::new("a", "1.0").conffile("/etc/a.conf", b"shipped one\n"));
    let rig = Rig::new(&repo);
    rig.update().unwrap();
    rig.install(&["a"]).unwrap();

    fs::write(rig.real("/etc/a.conf"), b"my local edit\n").unwrap();
    repo.publish(&PkgBuilder::new("a", "2.0").conffile("/etc/a.conf", b"shipped two\n"));
    rig.update().unwrap();
    rig.upgrade_all().unwrap();

    assert!(rig.status_text().contains("Version: 2.0"));
    assert_eq!(fs::read(rig.real("/etc/a.conf")).unwrap(), b"my local edit\n");
    assert_eq!(
        fs::read(rig.real("/etc/a.conf.aept-new")).unwrap(),
        b"shipped two\n"
    );
    let records = rig.db().read_conffiles("a").unwrap();
    assert_eq!(records["/etc/a.conf"], md5_hex(b"my local edit\n"));
}

#[test]
fn upgrade_silently_replaces_untouched_conffile() {
    let repo = Repo::new();
    repo.publish(&PkgBuilder::new("a", "1.0").conffile("/etc/a.conf", b"shipped one\n"));
    let rig = Rig::new(&repo);
    rig.update().unwrap();
    rig.install(&["a"]).unwrap();

    repo.publish(&PkgBuilder::new("a", "2.0").conffile("/etc/a.conf", b"shipped two\n"));
    rig.update().unwrap();
    rig.upgrade_all().unwrap();

    assert_eq!(fs::read(rig.real("/etc/a.conf")).unwrap(), b"shipped two\n");
    assert!(!rig.real("/etc/a.conf.aept-new").exists());
    let records = rig.db().read_conffiles("a").unwrap();
    assert_eq!(records["/etc/a.conf"], md5_hex(b"shipped two\n"));
}

#[test]
fn sibling_ownership_survives_upgrade_in_same_transaction() {
    let repo = Repo::new();
    repo.publish(&PkgBuilder::new("a", "1.0").file("/usr/bin/x", b"from a\n", 0o755));
    let rig = Rig::new(&repo);
    rig.update().unwrap();
    rig.install(&["a"]).unwrap();

    // a-2.0 drops x; c-1.0 takes it over, both in one transaction
    repo.publish(&PkgBuilder::new("a", "2.0").file("/usr/bin/a-only", b"a\n", 0o755));
    repo.publish(&PkgBuilder::new("c", "1.0").file("/usr/bin/x", b"from c\n", 0o755));
    rig.update().unwrap();
    rig.install(&["c", "a"]).unwrap();

    assert!(rig.status_text().contains("Version: 2.0"));
    assert_eq!(fs::read(rig.real("/usr/bin/x")).unwrap(), b"from c\n");
}

#[test]
fn pin_holds_through_upgrade_all_and_explicit_install() {
    let repo = Repo::new();
    repo.publish(&PkgBuilder::new("a", "1.0").file("/usr/bin/a", b"one", 0o755));
    let rig = Rig::new(&repo);
    rig.update().unwrap();
    rig.install(&["a"]).unwrap();
    rig.db().pin_add("a", "1.0").unwrap();

    repo.publish(&PkgBuilder::new("a", "2.0").file("/usr/bin/a", b"two", 0o755));
    rig.update().unwrap();

    rig.upgrade_all().unwrap();
    assert!(rig.status_text().contains("Version: 1.0"));

    rig.install(&["a"]).unwrap();
    assert!(rig.status_text().contains("Version: 1.0"));
    assert_eq!(fs::read(rig.real("/usr/bin/a")).unwrap(), b"one");
}

#[test]
fn local_package_file_installs_like_a_repo_one() {
    let repo = Repo::new();
    let rig = Rig::new(&repo);
    let pkg = PkgBuilder::new("standalone", "0.1").file("/usr/bin/s", b"s", 0o755);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("standalone_0.1.ipk");
    fs::write(&path, pkg.build()).unwrap();

    rig.install_local(&[path]).unwrap();
    assert!(rig.status_text().contains("Package: standalone"));
    assert!(rig.real("/usr/bin/s").exists());
    // explicitly named, so not auto
    assert!(rig.db().load_auto().unwrap().is_empty());
}

#[test]
fn noaction_plans_without_changing_anything() {
    let repo = Repo::new();
    repo.publish(&PkgBuilder::new("a", "1.0").file("/usr/bin/a", b"a", 0o755));
    let rig = Rig::new(&repo);
    rig.update().unwrap();
    let mut o = opts();
    o.noaction = true;
    rig.install_with(&["a"], &o).unwrap();
    assert_eq!(rig.status_text(), "");
    assert!(!rig.cfg.cache_dir.join("a_1.0.ipk").exists());
}

#[test]
fn download_only_fills_the_cache_and_stops() {
    let repo = Repo::new();
    repo.publish(&PkgBuilder::new("a", "1.0").file("/usr/bin/a", b"a", 0o755));
    let rig = Rig::new(&repo);
    rig.update().unwrap();
    let mut o = opts();
    o.download_only = true;
    o.no_cache = true; // silently cleared when combined with download-only
    rig.install_with(&["a"], &o).unwrap();
    assert!(rig.cfg.cache_dir.join("a_1.0.ipk").exists());
    assert_eq!(rig.status_text(), "");
}

#[test]
fn corrupted_cache_entry_is_refetched() {
    let repo = Repo::new();
    repo.publish(&PkgBuilder::new("a", "1.0").file("/usr/bin/a", b"a", 0o755));
    let rig = Rig::new(&repo);
    rig.update().unwrap();
    rig.install(&["a"]).unwrap();
    rig.remove(&["a"]).unwrap();

    fs::write(rig.cfg.cache_dir.join("a_1.0.ipk"), b"garbage").unwrap();
    rig.install(&["a"]).unwrap();
    assert!(rig.status_text().contains("Package: a"));
}

#[test]
fn missing_dependency_fails_cleanly_unless_forced() {
    let repo = Repo::new();
    repo.publish(&PkgBuilder::new("a", "1.0").depends("ghost").file("/usr/bin/a", b"a", 0o755));
    let rig = Rig::new(&repo);
    rig.update().unwrap();

    let err = rig.install(&["a"]);
    assert!(matches!(err, Err(AeptError::ResolveFailed(_))));
    assert_eq!(rig.status_text(), "");

    let mut forced = opts();
    forced.force_depends = true;
    rig.install_with(&["a"], &forced).unwrap();
    assert!(rig.status_text().contains("Package: a"));
}

#[test]
fn second_instance_is_locked_out() {
    let repo = Repo::new();
    repo.publish(&PkgBuilder::new("a", "1.0").file("/usr/bin/a", b"a", 0o755));
    let rig = Rig::new(&repo);
    rig.update().unwrap();
    let guard = aept::lock::acquire(&rig.cfg.lock_file).unwrap();
    let err = rig.install(&["a"]);
    assert!(matches!(err, Err(AeptError::LockHeld(_))));
    drop(guard);
    rig.install(&["a"]).unwrap();
}

#[test]
fn mark_manual_then_auto_round_trips() {
    let repo = Repo::new();
    repo.publish(&PkgBuilder::new("a", "1.0").depends("b").file("/usr/bin/a", b"a", 0o755));
    repo.publish(&PkgBuilder::new("b", "1.0").file("/usr/bin/b", b"b", 0o755));
    let rig = Rig::new(&repo);
    rig.update().unwrap();
    rig.install(&["a"]).unwrap();

    let db = rig.db();
    assert!(db.is_auto("b").unwrap());
    db.unmark_auto("b").unwrap();
    db.mark_auto("b").unwrap();
    assert!(db.is_auto("b").unwrap());

    // explicitly installing b clears the mark
    rig.install(&["b"]).unwrap();
    assert!(!db.is_auto("b").unwrap());
}

#[test]
fn reinstall_lays_files_down_again() {
    let repo = Repo::new();
    repo.publish(&PkgBuilder::new("a", "1.0").file("/usr/bin/a", b"payload", 0o755));
    let rig = Rig::new(&repo);
    rig.update().unwrap();
    rig.install(&["a"]).unwrap();
    fs::remove_file(rig.real("/usr/bin/a")).unwrap();

    // plain install is a no-op; the file stays gone
    rig.install(&["a"]).unwrap();
    assert!(!rig.real("/usr/bin/a").exists());

    let mut o = opts();
    o.reinstall = true;
    rig.install_with(&["a"], &o).unwrap();
    assert_eq!(fs::read(rig.real("/usr/bin/a")).unwrap(), b"payload");
    assert!(rig.status_text().contains("Status: install ok installed"));
}

#[test]
fn status_and_info_stay_consistent_through_a_workout() {
    let repo = Repo::new();
    repo.publish(&PkgBuilder::new("a", "1.0").depends("b").file("/usr/bin/a", b"a", 0o755));
    repo.publish(&PkgBuilder::new("b", "1.0").file("/usr/bin/b", b"b", 0o755));
    repo.publish(&PkgBuilder::new("c", "1.0").file("/usr/bin/c", b"c", 0o755));
    let rig = Rig::new(&repo);
    rig.update().unwrap();
    rig.install(&["a", "c"]).unwrap();
    rig.remove(&["c"]).unwrap();
    repo.publish(&PkgBuilder::new("a", "1.1").file("/usr/bin/a", b"a2", 0o755));
    rig.update().unwrap();
    rig.upgrade_all().unwrap();

    assert!(aept::query::consistency_issues(&rig.cfg).is_empty());
}
