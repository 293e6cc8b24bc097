//! End-to-end flows across lifecycle, locking, ACL resolution and publishing.

mod common;

use std::sync::Arc;

use parking_lot::Mutex;
use vellum::error::{Error, Result};
use vellum::lock::{Lock, LockCoordinator, LockManager, LockMode};
use vellum::types::{
    AccessControlEntry, AceFlags, PermissionSet, PrincipalId, ProjectId, ResourceFilter,
    ResourceState,
};
use vellum::vfs::DeleteMode;

use common::Fixture;

#[test]
fn test_publish_new_folder_and_file() {
    let fx = Fixture::new();
    let ctx = fx.offline(&fx.editor);
    fx.mkdir(&ctx, "/a/");
    fx.mkfile(&ctx, "/a/x.html", "hi");

    let resources = fx.repo.resources();
    let file = resources
        .read_resource(&ctx, "/a/x.html", ResourceFilter::DEFAULT)
        .unwrap();
    assert_eq!(file.state, ResourceState::New);
    assert_eq!(file.project_last_modified, Some(fx.project.id));

    fx.publish();

    let online = fx.online(&fx.editor);
    let folder = resources
        .read_folder(&online, "/a/", ResourceFilter::DEFAULT)
        .unwrap();
    assert_eq!(folder.state, ResourceState::Unchanged);
    let file = resources
        .read_file(&online, "/a/x.html", ResourceFilter::DEFAULT)
        .unwrap();
    assert_eq!(file.resource.state, ResourceState::Unchanged);
    assert_eq!(file.contents, b"hi");

    let offline = resources
        .read_resource(&ctx, "/a/x.html", ResourceFilter::DEFAULT)
        .unwrap();
    assert_eq!(offline.state, ResourceState::Unchanged);
    assert_eq!(offline.project_last_modified, None);
}

#[test]
fn test_delete_unpublished_file_preserving_sibling() {
    let fx = Fixture::new();
    let ctx = fx.offline(&fx.editor);
    fx.mkdir(&ctx, "/a/");
    fx.mkdir(&ctx, "/b/");
    fx.mkfile(&ctx, "/a/x.html", "hi");

    let resources = fx.repo.resources();
    let sibling = resources
        .create_sibling(&ctx, "/a/x.html", "/b/x.html", &[])
        .unwrap();
    assert_eq!(sibling.sibling_count, 2);
    assert_eq!(sibling.state, ResourceState::New);

    resources
        .delete_resource(&ctx, "/a/x.html", DeleteMode::PreserveSiblings)
        .unwrap();

    let err = resources
        .read_resource(&ctx, "/a/x.html", ResourceFilter::ALL)
        .unwrap_err();
    assert!(err.is_not_found());

    let remaining = resources
        .read_resource(&ctx, "/b/x.html", ResourceFilter::ALL)
        .unwrap();
    assert_eq!(remaining.sibling_count, 1);
    assert_eq!(remaining.state, ResourceState::New);
    assert_eq!(remaining.content_id, sibling.content_id);
    assert_eq!(remaining.length, 2);
}

/// Refuses new locks for one user, delegating everything else.
#[derive(Default)]
struct RefusingLocks {
    inner: LockManager,
    refuse: Mutex<Option<PrincipalId>>,
}

impl LockCoordinator for RefusingLocks {
    fn get_lock(&self, root_path: &str) -> Result<Option<Lock>> {
        self.inner.get_lock(root_path)
    }

    fn add_lock(&self, lock: Lock) -> Result<()> {
        if *self.refuse.lock() == Some(lock.user_id) {
            return Err(Error::LockConflict(format!("{} refused", lock.root_path)));
        }
        self.inner.add_lock(lock)
    }

    fn remove_lock(&self, root_path: &str) -> Result<Option<Lock>> {
        self.inner.remove_lock(root_path)
    }

    fn remove_all_locks_in_project(&self, project: ProjectId) -> Result<usize> {
        self.inner.remove_all_locks_in_project(project)
    }

    fn count_locks(&self, root_path: &str) -> Result<usize> {
        self.inner.count_locks(root_path)
    }
}

#[test]
fn test_failed_lock_change_restores_previous_lock() {
    let locks = Arc::new(RefusingLocks::default());
    let fx = Fixture::with_locks(locks.clone());
    let owner = fx.offline(&fx.editor);
    fx.mkdir(&owner, "/a/");
    let resources = fx.repo.resources();
    // The file gets a lock of its own once the folder lock is gone.
    resources.unlock_resource(&owner, "/a/").unwrap();
    fx.mkfile(&owner, "/a/x.html", "hi");

    let before = resources.get_lock("/a/x.html").unwrap().unwrap();
    assert_eq!(before.user_id, fx.editor.id);

    let thief = fx.offline(&fx.other);
    let resource = resources
        .read_resource(&thief, "/a/x.html", ResourceFilter::DEFAULT)
        .unwrap();
    let err = resources.write_resource(&thief, &resource).unwrap_err();
    assert!(matches!(err, Error::LockConflict(_)));

    *locks.refuse.lock() = Some(fx.other.id);
    let err = resources.change_lock(&thief, "/a/x.html").unwrap_err();
    assert!(matches!(err, Error::LockConflict(_)));

    let after = resources.get_lock("/a/x.html").unwrap().unwrap();
    assert_eq!(after, before);
    assert_eq!(after.mode, LockMode::Common);

    // Without the refusal the lock moves to the thief.
    *locks.refuse.lock() = None;
    resources.change_lock(&thief, "/a/x.html").unwrap();
    let stolen = resources.get_lock("/a/x.html").unwrap().unwrap();
    assert_eq!(stolen.user_id, fx.other.id);
    resources.write_resource(&thief, &resource).unwrap();
}

#[test]
fn test_overwrite_ace_clears_inherited_write() {
    let fx = Fixture::new();
    let ctx = fx.offline(&fx.admin);
    fx.mkdir(&ctx, "/a/");
    fx.mkdir(&ctx, "/a/b/");

    let resources = fx.repo.resources();
    let a = resources
        .read_resource(&ctx, "/a/", ResourceFilter::ALL)
        .unwrap();
    let b = resources
        .read_resource(&ctx, "/a/b/", ResourceFilter::ALL)
        .unwrap();
    resources
        .write_access_control_entry(
            &ctx,
            "/a/",
            AccessControlEntry::new(
                a.resource_id,
                fx.other.id,
                PermissionSet::WRITE,
                PermissionSet::NONE,
                AceFlags::USER.with(AceFlags::INHERIT, true),
            ),
        )
        .unwrap();
    resources
        .write_access_control_entry(
            &ctx,
            "/a/b/",
            AccessControlEntry::new(
                b.resource_id,
                fx.other.id,
                PermissionSet::NONE,
                PermissionSet::WRITE,
                AceFlags::USER.with(AceFlags::OVERWRITE, true),
            ),
        )
        .unwrap();

    let on_a = resources.read_acl(&ctx, "/a/", false).unwrap();
    assert_eq!(on_a.get(&fx.other.id).unwrap().effective(), PermissionSet::WRITE);

    let on_b = resources.read_acl(&ctx, "/a/b/", false).unwrap();
    assert!(on_b.get(&fx.other.id).unwrap().effective().is_empty());

    let inherited = resources.read_acl(&ctx, "/a/b/", true).unwrap();
    assert_eq!(
        inherited.get(&fx.other.id).unwrap().effective(),
        PermissionSet::WRITE
    );
}

#[test]
fn test_publish_list_orders_folders() {
    let fx = Fixture::new();
    let ctx = fx.offline(&fx.admin);
    fx.mkdir(&ctx, "/c/");
    fx.mkdir(&ctx, "/c/d/");
    fx.publish();

    let resources = fx.repo.resources();
    resources
        .lock_resource(&ctx, "/c/", LockMode::Common)
        .unwrap();
    resources
        .delete_resource(&ctx, "/c/", DeleteMode::PreserveSiblings)
        .unwrap();
    fx.mkdir(&ctx, "/a/");
    fx.mkfile(&ctx, "/a/x.html", "hi");
    fx.repo.projects().unlock_project(&ctx, fx.project.id).unwrap();

    let list = fx.repo.publisher().publish_list(&ctx).unwrap();
    let paths = |rs: &[vellum::types::Resource]| -> Vec<String> {
        rs.iter().map(|r| r.root_path.clone()).collect()
    };
    assert_eq!(paths(&list.folders), ["/a/"]);
    assert_eq!(paths(&list.deleted_folders), ["/c/d/", "/c/"]);
    assert_eq!(paths(&list.files), ["/a/x.html"]);
}

#[test]
fn test_direct_publish_requires_published_parent() {
    let fx = Fixture::new();
    let ctx = fx.offline(&fx.admin);
    fx.mkdir(&ctx, "/a/");
    fx.mkfile(&ctx, "/a/x.html", "hi");

    let err = fx
        .repo
        .publisher()
        .publish_resource(&ctx, "/a/x.html", false)
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    let file = fx
        .repo
        .resources()
        .read_resource(&ctx, "/a/x.html", ResourceFilter::ALL)
        .unwrap();
    assert_eq!(file.state, ResourceState::New);
    assert!(fx.repo.resources().get_lock("/a/x.html").unwrap().is_some());

    let online = fx.online(&fx.admin);
    assert!(
        fx.repo
            .resources()
            .read_resource(&online, "/a/x.html", ResourceFilter::ALL)
            .unwrap_err()
            .is_not_found()
    );
}
