//! Publishing whole projects and single resources.

mod common;

use vellum::config::{HistoryConfig, RepositoryConfig};
use vellum::error::Error;
use vellum::events::RepositoryEvent;
use vellum::lock::LockMode;
use vellum::publish::PublishList;
use vellum::store::ResourceStore;
use vellum::types::{
    AccessControlEntry, AceFlags, NewProject, PermissionSet, ProjectType, Resource,
    ResourceFilter, ResourceState, Workspace,
};
use vellum::vfs::DeleteMode;

use common::Fixture;

#[test]
fn test_locked_project_cannot_publish() {
    let fx = Fixture::new();
    let ctx = fx.offline(&fx.admin);
    fx.mkfile(&ctx, "/x.html", "hi");
    fx.repo
        .projects()
        .set_project_locked(&ctx, fx.project.id, true)
        .unwrap();

    let err = fx.repo.publisher().publish_project(&ctx).unwrap_err();
    assert!(matches!(err, Error::LockConflict(_)));

    fx.repo
        .projects()
        .set_project_locked(&ctx, fx.project.id, false)
        .unwrap();
    let result = fx.repo.publisher().publish_project(&ctx).unwrap();
    assert_eq!(result.files, ["/x.html"]);
}

#[test]
fn test_online_project_cannot_publish() {
    let fx = Fixture::new();
    let err = fx
        .repo
        .publisher()
        .publish_project(&fx.online(&fx.admin))
        .unwrap_err();
    assert!(matches!(err, Error::PermissionDenied { .. }));
}

#[test]
fn test_non_manager_cannot_publish_project() {
    let fx = Fixture::new();
    let ctx = fx.offline(&fx.editor);
    fx.mkfile(&ctx, "/x.html", "hi");

    let err = fx.repo.publisher().publish_project(&ctx).unwrap_err();
    assert!(matches!(err, Error::PermissionDenied { .. }));
    let file = fx
        .repo
        .resources()
        .read_resource(&ctx, "/x.html", ResourceFilter::ALL)
        .unwrap();
    assert_eq!(file.state, ResourceState::New);
}

#[test]
fn test_direct_publish_entry_allows_single_resource() {
    let fx = Fixture::new();
    let admin = fx.offline(&fx.admin);
    fx.mkdir(&admin, "/a/");
    fx.publish();

    let resources = fx.repo.resources();
    let folder = resources
        .read_resource(&admin, "/a/", ResourceFilter::ALL)
        .unwrap();
    resources
        .lock_resource(&admin, "/a/", LockMode::Common)
        .unwrap();
    resources
        .write_access_control_entry(
            &admin,
            "/a/",
            AccessControlEntry::new(
                folder.resource_id,
                fx.editor.id,
                PermissionSet::DIRECT_PUBLISH,
                PermissionSet::NONE,
                AceFlags::USER.with(AceFlags::INHERIT, true),
            ),
        )
        .unwrap();
    resources.unlock_resource(&admin, "/a/").unwrap();

    let editor = fx.offline(&fx.editor);
    fx.mkfile(&editor, "/a/x.html", "hi");

    let err = fx
        .repo
        .publisher()
        .publish_resource(&fx.offline(&fx.other), "/a/x.html", false)
        .unwrap_err();
    assert!(matches!(err, Error::PermissionDenied { .. }));

    let result = fx
        .repo
        .publisher()
        .publish_resource(&editor, "/a/x.html", false)
        .unwrap();
    assert_eq!(result.files, ["/a/x.html"]);
    assert!(result.folders.is_empty());

    let online = fx.online(&fx.editor);
    let file = resources
        .read_file(&online, "/a/x.html", ResourceFilter::DEFAULT)
        .unwrap();
    assert_eq!(file.contents, b"hi");
    assert!(resources.get_lock("/a/x.html").unwrap().is_none());
}

#[test]
fn test_temporary_project_is_deleted_after_publish() {
    let fx = Fixture::new();
    let projects = fx.repo.projects();
    let temp = projects
        .create_project(
            &fx.online(&fx.admin),
            &NewProject {
                name: "Hotfix".to_string(),
                user_group_id: Some(fx.users.id),
                project_type: ProjectType::Temporary,
                ..NewProject::default()
            },
        )
        .unwrap();
    projects
        .copy_resource_to_project(&fx.online(&fx.admin), temp.id, "/")
        .unwrap();

    let ctx = fx.repo.context(&fx.admin.id, temp.id).unwrap();
    fx.mkfile(&ctx, "/fix.html", "patched");
    let result = fx.repo.publisher().publish_project(&ctx).unwrap();
    assert_eq!(result.files, ["/fix.html"]);

    assert!(projects.read_project(temp.id).unwrap_err().is_not_found());
    assert!(projects.read_project(fx.project.id).is_ok());
}

#[test]
fn test_publishing_deleted_file_removes_it() {
    let fx = Fixture::new();
    let ctx = fx.offline(&fx.admin);
    fx.mkfile(&ctx, "/x.html", "hi");
    fx.publish();

    let resources = fx.repo.resources();
    resources
        .lock_resource(&ctx, "/x.html", LockMode::Common)
        .unwrap();
    resources
        .delete_resource(&ctx, "/x.html", DeleteMode::PreserveSiblings)
        .unwrap();
    let result = fx.repo.publisher().publish_project(&ctx).unwrap();
    assert_eq!(result.files, ["/x.html"]);

    let online = fx.online(&fx.admin);
    for ctx in [&ctx, &online] {
        assert!(
            resources
                .read_resource(ctx, "/x.html", ResourceFilter::ALL)
                .unwrap_err()
                .is_not_found()
        );
    }
}

#[test]
fn test_publish_emits_event() {
    let fx = Fixture::new();
    let ctx = fx.offline(&fx.admin);
    fx.mkfile(&ctx, "/x.html", "hi");

    let mut rx = fx.repo.events().subscribe();
    let result = fx.repo.publisher().publish_project(&ctx).unwrap();

    let mut published = None;
    while let Ok(event) = rx.try_recv() {
        if let RepositoryEvent::ProjectPublished { project_id, tag, .. } = event {
            published = Some((project_id, tag));
        }
    }
    assert_eq!(published, Some((fx.project.id, result.tag)));
}

#[test]
fn test_backup_versions_are_pruned() {
    let config = RepositoryConfig {
        history: HistoryConfig {
            enabled: true,
            max_versions: 1,
        },
        ..RepositoryConfig::in_memory()
    };
    let fx = Fixture::with_config(config);
    let ctx = fx.offline(&fx.admin);
    let resources = fx.repo.resources();

    fx.mkfile(&ctx, "/x.html", "v1");
    fx.publish();
    resources
        .lock_resource(&ctx, "/x.html", LockMode::Common)
        .unwrap();
    resources.write_file(&ctx, "/x.html", b"v2").unwrap();
    let last = fx.repo.publisher().publish_project(&ctx).unwrap();

    let versions = resources.read_backup_versions(&ctx, "/x.html").unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].tag, last.tag);
    assert_eq!(versions[0].length, 2);
}

#[test]
fn test_disabled_history_keeps_no_backups() {
    let config = RepositoryConfig {
        history: HistoryConfig {
            enabled: false,
            ..HistoryConfig::default()
        },
        ..RepositoryConfig::in_memory()
    };
    let fx = Fixture::with_config(config);
    let ctx = fx.offline(&fx.admin);
    fx.mkfile(&ctx, "/x.html", "v1");
    fx.publish();

    let versions = fx
        .repo
        .resources()
        .read_backup_versions(&ctx, "/x.html")
        .unwrap();
    assert!(versions.is_empty());
}

fn file_paths(list: &PublishList) -> Vec<String> {
    let mut paths: Vec<_> = list.files.iter().map(|f| f.root_path.clone()).collect();
    paths.sort();
    paths
}

#[test]
fn test_files_modified_in_another_project_are_not_listed() {
    let fx = Fixture::new();
    let first = fx.offline(&fx.admin);
    fx.mkdir(&first, "/a/");
    fx.mkfile(&first, "/a/x.html", "x");
    fx.mkfile(&first, "/a/y.html", "y");
    fx.publish();

    let projects = fx.repo.projects();
    let second = projects
        .create_project(
            &fx.online(&fx.admin),
            &NewProject {
                name: "Second".to_string(),
                user_group_id: Some(fx.users.id),
                ..NewProject::default()
            },
        )
        .unwrap();
    projects
        .copy_resource_to_project(&fx.online(&fx.admin), second.id, "/")
        .unwrap();
    let other_project = fx.repo.context(&fx.admin.id, second.id).unwrap();

    let resources = fx.repo.resources();
    resources
        .lock_resource(&other_project, "/a/x.html", LockMode::Common)
        .unwrap();
    resources
        .write_file(&other_project, "/a/x.html", b"changed")
        .unwrap();
    resources
        .lock_resource(&other_project, "/a/y.html", LockMode::Common)
        .unwrap();
    resources
        .delete_resource(&other_project, "/a/y.html", DeleteMode::PreserveSiblings)
        .unwrap();
    projects.unlock_project(&other_project, second.id).unwrap();

    let publisher = fx.repo.publisher();
    assert!(file_paths(&publisher.publish_list(&first).unwrap()).is_empty());
    assert_eq!(
        file_paths(&publisher.publish_list(&other_project).unwrap()),
        ["/a/x.html", "/a/y.html"]
    );

    fx.mkfile(&first, "/a/n.html", "n");
    let created = fx
        .store
        .read_resource(Workspace::Offline, "/a/n.html")
        .unwrap()
        .unwrap();
    assert_eq!(created.state, ResourceState::New);
    fx.store
        .write_resource(
            Workspace::Offline,
            &Resource {
                project_last_modified: None,
                ..created
            },
        )
        .unwrap();
    projects.unlock_project(&first, fx.project.id).unwrap();

    assert_eq!(file_paths(&publisher.publish_list(&first).unwrap()), ["/a/n.html"]);
    assert_eq!(
        file_paths(&publisher.publish_list(&other_project).unwrap()),
        ["/a/n.html", "/a/x.html", "/a/y.html"]
    );
}
