use crate::definition::RoleAssignment;
use crate::shared::Subject;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Access-control seam the engine remaps after every transition. The
/// engine reads the current mapping, compares against the new state's
/// assignments, and writes only on change; implementations just store.
pub trait RoleMapper: Send + Sync {
    fn permission_roles(&self, subject: &Subject, permission: &str) -> Option<RoleAssignment>;

    fn set_permission_roles(&self, subject: &Subject, permission: &str, roles: RoleAssignment);

    fn group_roles(&self, subject: &Subject, group: &str) -> Vec<String>;

    fn set_group_roles(&self, subject: &Subject, group: &str, roles: Vec<String>);
}

/// No-op mapper for embeddings that manage access control elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRoleMapper;

impl RoleMapper for NullRoleMapper {
    fn permission_roles(&self, _subject: &Subject, _permission: &str) -> Option<RoleAssignment> {
        None
    }

    fn set_permission_roles(&self, _subject: &Subject, _permission: &str, _roles: RoleAssignment) {}

    fn group_roles(&self, _subject: &Subject, _group: &str) -> Vec<String> {
        Vec::new()
    }

    fn set_group_roles(&self, _subject: &Subject, _group: &str, _roles: Vec<String>) {}
}

/// Process-local mapper, keyed by subject id.
#[derive(Debug, Default)]
pub struct MemoryRoleMapper {
    permissions: Mutex<BTreeMap<(String, String), RoleAssignment>>,
    groups: Mutex<BTreeMap<(String, String), Vec<String>>>,
}

impl MemoryRoleMapper {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RoleMapper for MemoryRoleMapper {
    fn permission_roles(&self, subject: &Subject, permission: &str) -> Option<RoleAssignment> {
        let permissions = self.permissions.lock().expect("role mapper lock poisoned");
        permissions
            .get(&(subject.id.clone(), permission.to_string()))
            .cloned()
    }

    fn set_permission_roles(&self, subject: &Subject, permission: &str, roles: RoleAssignment) {
        let mut permissions = self.permissions.lock().expect("role mapper lock poisoned");
        permissions.insert((subject.id.clone(), permission.to_string()), roles);
    }

    fn group_roles(&self, subject: &Subject, group: &str) -> Vec<String> {
        let groups = self.groups.lock().expect("role mapper lock poisoned");
        groups
            .get(&(subject.id.clone(), group.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn set_group_roles(&self, subject: &Subject, group: &str, roles: Vec<String>) {
        let mut groups = self.groups.lock().expect("role mapper lock poisoned");
        let key = (subject.id.clone(), group.to_string());
        if roles.is_empty() {
            groups.remove(&key);
        } else {
            groups.insert(key, roles);
        }
    }
}
