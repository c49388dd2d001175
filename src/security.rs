use crate::shared::{Actor, Subject};
use std::collections::{BTreeMap, BTreeSet};

/// Identity seam. Answers role/permission/group membership questions in
/// the context of a subject; the engine never interprets actors itself.
pub trait SecurityContext: Send + Sync {
    fn actor_has_role(&self, actor: &Actor, subject: &Subject, role: &str) -> bool;

    fn actor_has_permission(&self, actor: &Actor, subject: &Subject, permission: &str) -> bool;

    /// Groups the actor belongs to in the context of the subject.
    /// Implementations without a group concept return the empty set.
    fn actor_groups(&self, actor: &Actor, subject: &Subject) -> BTreeSet<String> {
        let _ = (actor, subject);
        BTreeSet::new()
    }
}

/// Table-driven security context for embeddings with a fixed principal
/// directory. Grants are context-insensitive: the subject argument is
/// ignored.
#[derive(Debug, Clone, Default)]
pub struct StaticSecurityContext {
    roles: BTreeMap<String, BTreeSet<String>>,
    permissions: BTreeMap<String, BTreeSet<String>>,
    groups: BTreeMap<String, BTreeSet<String>>,
}

impl StaticSecurityContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant_role(mut self, actor: &str, role: &str) -> Self {
        self.roles
            .entry(actor.to_string())
            .or_default()
            .insert(role.to_string());
        self
    }

    pub fn grant_permission(mut self, actor: &str, permission: &str) -> Self {
        self.permissions
            .entry(actor.to_string())
            .or_default()
            .insert(permission.to_string());
        self
    }

    pub fn add_to_group(mut self, actor: &str, group: &str) -> Self {
        self.groups
            .entry(actor.to_string())
            .or_default()
            .insert(group.to_string());
        self
    }
}

impl SecurityContext for StaticSecurityContext {
    fn actor_has_role(&self, actor: &Actor, _subject: &Subject, role: &str) -> bool {
        self.roles
            .get(actor.id())
            .map(|granted| granted.contains(role))
            .unwrap_or(false)
    }

    fn actor_has_permission(&self, actor: &Actor, _subject: &Subject, permission: &str) -> bool {
        self.permissions
            .get(actor.id())
            .map(|granted| granted.contains(permission))
            .unwrap_or(false)
    }

    fn actor_groups(&self, actor: &Actor, _subject: &Subject) -> BTreeSet<String> {
        self.groups.get(actor.id()).cloned().unwrap_or_default()
    }
}
