//! End-to-end reconciliation scenarios driven through the library API.

use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

use rups::updater::{
    jar_digest, Action, FileCollection, FileRecord, JarHashMode, SilentProgress, Status,
    Timestamp, UpdateManager, UpdatePolicy, Version,
};

mod common;

#[test]
fn fresh_install_of_a_single_file() {
    let remote = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    common::publish_simple_site(
        remote.path(),
        "main",
        &[("macros/hello.ijm", "20240101000000", "print 'hello'")],
    );

    let mut manager = UpdateManager::open(root.path()).unwrap();
    manager
        .collection_mut()
        .add_site("main", common::site_url(remote.path()))
        .unwrap();
    manager.fetch_remote_catalogs(true).unwrap();
    manager.scan().unwrap();

    let id = manager.collection().get("macros/hello.ijm").unwrap();
    assert_eq!(Status::New, manager.collection().file(id).status);

    manager.stage_updates(UpdatePolicy::Default).unwrap();
    manager.install(&mut SilentProgress).unwrap();

    root.child("macros/hello.ijm").assert("print 'hello'");
    root.child("update").assert(predicate::path::missing());
    assert_eq!(Status::Installed, manager.collection().file(id).status);

    // The local digest now equals the advertised checksum
    let record = manager.collection().winner(id).unwrap();
    let current = record.current.as_ref().unwrap();
    assert!(manager
        .collection()
        .file(id)
        .local
        .matches(&current.checksum));
}

#[test]
fn local_modification_preserved_on_first_fetch() {
    let remote = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    common::publish_simple_site(
        remote.path(),
        "main",
        &[("macros/hello.ijm", "20240101000000", "print 'hello'")],
    );

    root.child("macros/hello.ijm").write_str("modified").unwrap();

    let mut manager = UpdateManager::open(root.path()).unwrap();
    manager
        .collection_mut()
        .add_site("main", common::site_url(remote.path()))
        .unwrap();
    manager.fetch_remote_catalogs(true).unwrap();
    manager.scan().unwrap();

    let id = manager.collection().get("macros/hello.ijm").unwrap();
    assert_eq!(Status::Modified, manager.collection().file(id).status);
    assert_eq!(Action::Modified, manager.collection().file(id).action);

    // A default update does not touch the modified file
    let staged = manager.stage_updates(UpdatePolicy::Default).unwrap();
    assert!(staged.is_empty());
    root.child("macros/hello.ijm").assert("modified");
}

#[test]
fn shadowed_entry_across_two_sites() {
    let site_a = TempDir::new().unwrap();
    let site_b = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();

    common::publish_simple_site(
        site_a.path(),
        "alpha",
        &[("macros/m.ijm", "20240101000000", "version A")],
    );
    common::publish_simple_site(
        site_b.path(),
        "beta",
        &[("macros/m.ijm", "20240201000000", "version B")],
    );

    // The local copy is beta's current version
    root.child("macros/m.ijm").write_str("version B").unwrap();

    let mut manager = UpdateManager::open(root.path()).unwrap();
    manager
        .collection_mut()
        .add_site("alpha", common::site_url(site_a.path()))
        .unwrap();
    manager
        .collection_mut()
        .add_site("beta", common::site_url(site_b.path()))
        .unwrap();
    manager.fetch_remote_catalogs(true).unwrap();
    manager.scan().unwrap();

    let id = manager.collection().get("macros/m.ijm").unwrap();
    assert!(manager.collection().file(id).is_shadowing());
    assert_eq!(Status::Installed, manager.collection().file(id).status);
    assert_eq!("beta", manager.collection().winner(id).unwrap().site);

    // Removing the shadowing site reactivates the lower-ranked entry
    manager.collection_mut().deactivate_site("beta").unwrap();

    assert_eq!("alpha", manager.collection().winner(id).unwrap().site);
    assert_eq!(Status::Updateable, manager.collection().file(id).status);
    assert_eq!(Action::Update, manager.collection().file(id).action);
}

#[test]
fn site_deactivate_reactivate_round_trip() {
    let remote = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    common::publish_simple_site(
        remote.path(),
        "main",
        &[
            ("macros/one.ijm", "20240101000000", "one"),
            ("macros/two.ijm", "20240101000000", "two"),
        ],
    );

    let mut manager = UpdateManager::open(root.path()).unwrap();
    manager
        .collection_mut()
        .add_site("main", common::site_url(remote.path()))
        .unwrap();
    manager.fetch_remote_catalogs(true).unwrap();
    manager.scan().unwrap();

    let statuses_before: Vec<(String, Status)> = manager
        .collection()
        .iter()
        .map(|(_, f)| (f.name.clone(), f.status))
        .collect();

    manager.collection_mut().deactivate_site("main").unwrap();
    manager.collection_mut().activate_site("main").unwrap();
    manager.fetch_remote_catalogs(true).unwrap();
    manager.scan().unwrap();

    let statuses_after: Vec<(String, Status)> = manager
        .collection()
        .iter()
        .map(|(_, f)| (f.name.clone(), f.status))
        .collect();

    assert_eq!(statuses_before, statuses_after);
}

#[test]
fn legacy_archive_digest_accepted_as_installed() {
    let remote = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();

    // The installed archive
    let local_jar = root.path().join("jars/lib.jar");
    common::write_jar(
        &local_jar,
        "#Built on Tuesday\nkey=value\n",
        "Manifest-Version: 1.0\r\nMain-Class: org.Example\r\n\r\n",
    );

    // The catalog recorded the digest of an earlier era: filters disabled
    let legacy_checksum = jar_digest(&local_jar, JarHashMode::RAW).unwrap();

    let mut collection = FileCollection::new();
    collection
        .add_site("main", common::site_url(remote.path()))
        .unwrap();
    let mut record = FileRecord::new("main", "jars/lib.jar");
    record.filesize = local_jar.metadata().unwrap().len();
    record.current = Some(Version::new(
        legacy_checksum,
        "20240101000000".parse::<Timestamp>().unwrap(),
    ));
    collection.insert_record(record).unwrap();
    common::publish_catalog(remote.path(), "main", &collection);

    let mut manager = UpdateManager::open(root.path()).unwrap();
    manager
        .collection_mut()
        .add_site("main", common::site_url(remote.path()))
        .unwrap();
    manager.fetch_remote_catalogs(true).unwrap();
    manager.scan().unwrap();

    let id = manager.collection().get("jars/lib.jar").unwrap();
    assert_eq!(Status::Installed, manager.collection().file(id).status);
}

#[test]
fn install_cascades_to_dependencies() {
    let remote = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();

    let app_payload = remote.path().join("plugins/app.jar-20240101000000");
    common::write_jar(&app_payload, "marker=app\n", "Manifest-Version: 1.0\r\n\r\n");
    let lib_payload = remote.path().join("jars/lib.jar-20240101000000");
    common::write_jar(&lib_payload, "marker=lib\n", "Manifest-Version: 1.0\r\n\r\n");

    let mut collection = FileCollection::new();
    collection
        .add_site("main", common::site_url(remote.path()))
        .unwrap();
    let mut app = common::record_for("main", "plugins/app.jar", "20240101000000", &app_payload);
    app.dependencies
        .push(rups::updater::Dependency::new("jars/lib.jar"));
    collection.insert_record(app).unwrap();
    collection
        .insert_record(common::record_for(
            "main",
            "jars/lib.jar",
            "20240101000000",
            &lib_payload,
        ))
        .unwrap();
    common::publish_catalog(remote.path(), "main", &collection);

    let mut manager = UpdateManager::open(root.path()).unwrap();
    manager
        .collection_mut()
        .add_site("main", common::site_url(remote.path()))
        .unwrap();
    manager.fetch_remote_catalogs(true).unwrap();
    manager.scan().unwrap();

    let app_id = manager.collection().get("plugins/app.jar").unwrap();
    let staged = manager.collection_mut().stage(app_id, Action::Install).unwrap();
    assert_eq!(2, staged.len());

    manager.install(&mut SilentProgress).unwrap();

    root.child("plugins/app.jar").assert(predicate::path::exists());
    root.child("jars/lib.jar").assert(predicate::path::exists());

    let lib_id = manager.collection().get("jars/lib.jar").unwrap();
    assert_eq!(Status::Installed, manager.collection().file(lib_id).status);
}

#[test]
fn update_installs_newer_version_and_remembers_history() {
    let remote = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();

    // First generation
    common::publish_simple_site(
        remote.path(),
        "main",
        &[("macros/tool.ijm", "20240101000000", "v1")],
    );

    let mut manager = UpdateManager::open(root.path()).unwrap();
    manager
        .collection_mut()
        .add_site("main", common::site_url(remote.path()))
        .unwrap();
    manager.fetch_remote_catalogs(true).unwrap();
    manager.scan().unwrap();
    manager.stage_updates(UpdatePolicy::Default).unwrap();
    manager.install(&mut SilentProgress).unwrap();
    root.child("macros/tool.ijm").assert("v1");

    // Second generation: v1 demoted to a previous version
    let v1_payload = common::serve_payload(
        remote.path(),
        "macros/tool.ijm",
        "20240101000000",
        b"v1",
    );
    let v2_payload = common::serve_payload(
        remote.path(),
        "macros/tool.ijm",
        "20240601000000",
        b"v2 much better",
    );
    let mut collection = FileCollection::new();
    collection
        .add_site("main", common::site_url(remote.path()))
        .unwrap();
    let mut record = common::record_for("main", "macros/tool.ijm", "20240601000000", &v2_payload);
    let mut old = rups::updater::Version::new(
        rups::updater::digest_file("macros/tool.ijm", &v1_payload).unwrap(),
        "20240101000000".parse::<Timestamp>().unwrap(),
    );
    old.timestamp_obsolete = Some("20240601000000".parse().unwrap());
    record.previous.insert(old);
    collection.insert_record(record).unwrap();
    common::publish_catalog(remote.path(), "main", &collection);

    // Re-open against the updated remote
    let mut manager = UpdateManager::open(root.path()).unwrap();
    manager.fetch_remote_catalogs(true).unwrap();
    manager.scan().unwrap();

    let id = manager.collection().get("macros/tool.ijm").unwrap();
    assert_eq!(Status::Updateable, manager.collection().file(id).status);

    manager.stage_updates(UpdatePolicy::Default).unwrap();
    manager.install(&mut SilentProgress).unwrap();

    root.child("macros/tool.ijm").assert("v2 much better");
    assert_eq!(Status::Installed, manager.collection().file(id).status);
}

#[test]
fn downgrade_restores_a_previous_version() {
    let remote = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();

    let v1_payload =
        common::serve_payload(remote.path(), "macros/tool.ijm", "20240101000000", b"v1");
    let v2_payload = common::serve_payload(
        remote.path(),
        "macros/tool.ijm",
        "20240601000000",
        b"v2 much better",
    );

    let mut collection = FileCollection::new();
    collection
        .add_site("main", common::site_url(remote.path()))
        .unwrap();
    let mut record = common::record_for("main", "macros/tool.ijm", "20240601000000", &v2_payload);
    record.previous.insert(rups::updater::Version::new(
        rups::updater::digest_file("macros/tool.ijm", &v1_payload).unwrap(),
        "20240101000000".parse::<Timestamp>().unwrap(),
    ));
    collection.insert_record(record).unwrap();
    common::publish_catalog(remote.path(), "main", &collection);

    let mut manager = UpdateManager::open(root.path()).unwrap();
    manager
        .collection_mut()
        .add_site("main", common::site_url(remote.path()))
        .unwrap();
    manager.fetch_remote_catalogs(true).unwrap();
    manager.scan().unwrap();
    manager.stage_updates(UpdatePolicy::Default).unwrap();
    manager.install(&mut SilentProgress).unwrap();
    root.child("macros/tool.ijm").assert("v2 much better");

    let id = manager.collection().get("macros/tool.ijm").unwrap();
    let downgraded = manager
        .downgrade(
            "20240101000000".parse().unwrap(),
            &[id],
            &mut SilentProgress,
        )
        .unwrap();

    assert_eq!(vec!["macros/tool.ijm".to_string()], downgraded);
    root.child("macros/tool.ijm").assert("v1");
}
