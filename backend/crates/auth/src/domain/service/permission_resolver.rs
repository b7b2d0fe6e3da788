//! Permission resolution
//!
//! effective = (table[role] ∪ known(extra)) − known(denied)
//!
//! The role table is an immutable value handed to the resolver at startup.
//! Role order is only used for `has_role`; grants come from the table.

use std::collections::{BTreeSet, HashMap};

use crate::domain::entity::user::User;
use crate::domain::value_object::{permission::Permission, user_role::UserRole};

// ============================================================================
// Role permission table
// ============================================================================

#[derive(Debug, Clone)]
pub struct RolePermissionTable {
    grants: HashMap<UserRole, BTreeSet<Permission>>,
}

impl RolePermissionTable {
    /// Build from explicit per-role grants. Roles left out grant nothing.
    pub fn new(grants: impl IntoIterator<Item = (UserRole, BTreeSet<Permission>)>) -> Self {
        Self {
            grants: grants.into_iter().collect(),
        }
    }

    /// Reference configuration; each role extends the one below it
    pub fn standard() -> Self {
        use Permission::*;

        let viewer: BTreeSet<Permission> = Permission::in_category("read")
            .filter(|p| !matches!(p, ReadUsers | ReadAdmin))
            .collect();

        let mut contributor = viewer.clone();
        contributor.extend(Permission::in_category("write"));

        let mut editor = contributor.clone();
        editor.extend(Permission::in_category("edit"));

        let mut moderator = editor.clone();
        moderator.extend([ModerateContent, ReadUsers, DeleteContent]);

        let mut admin = moderator.clone();
        admin.extend(Permission::in_category("delete"));
        admin.extend([ManageUsers, ReadAdmin, ImportData]);

        let mut superadmin = admin.clone();
        superadmin.extend([ManageRoles, SystemSettings, SystemAudit]);

        Self::new([
            (UserRole::Viewer, viewer),
            (UserRole::Contributor, contributor),
            (UserRole::Editor, editor),
            (UserRole::Moderator, moderator),
            (UserRole::Admin, admin),
            (UserRole::SuperAdmin, superadmin),
        ])
    }

    pub fn grants(&self, role: UserRole) -> impl Iterator<Item = Permission> + '_ {
        self.grants.get(&role).into_iter().flatten().copied()
    }
}

impl Default for RolePermissionTable {
    fn default() -> Self {
        Self::standard()
    }
}

// ============================================================================
// Resolver
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct PermissionResolver {
    table: RolePermissionTable,
}

impl PermissionResolver {
    pub fn new(table: RolePermissionTable) -> Self {
        Self { table }
    }

    /// Effective permissions. Unknown tags are skipped; denial is applied
    /// last so it wins over both role grants and extras.
    pub fn resolve<'a, E, D>(&self, role: UserRole, extra: E, denied: D) -> BTreeSet<Permission>
    where
        E: IntoIterator<Item = &'a String>,
        D: IntoIterator<Item = &'a String>,
    {
        let mut effective: BTreeSet<Permission> = self.table.grants(role).collect();
        effective.extend(known(extra));
        for permission in known(denied) {
            effective.remove(&permission);
        }
        effective
    }

    /// String-typed variant; an unknown role starts from an empty baseline
    pub fn resolve_code<'a, E, D>(&self, role_code: &str, extra: E, denied: D) -> BTreeSet<Permission>
    where
        E: IntoIterator<Item = &'a String>,
        D: IntoIterator<Item = &'a String>,
    {
        match UserRole::from_code(role_code) {
            Some(role) => self.resolve(role, extra, denied),
            None => {
                let mut effective: BTreeSet<Permission> = known(extra).collect();
                for permission in known(denied) {
                    effective.remove(&permission);
                }
                effective
            }
        }
    }

    pub fn effective_permissions(&self, user: &User) -> BTreeSet<Permission> {
        self.resolve(
            user.user_role,
            &user.extra_permissions,
            &user.denied_permissions,
        )
    }

    pub fn has_permission(&self, user: &User, permission: Permission) -> bool {
        self.effective_permissions(user).contains(&permission)
    }

    pub fn has_any_permission(&self, user: &User, required: &[Permission]) -> bool {
        let effective = self.effective_permissions(user);
        required.iter().any(|p| effective.contains(p))
    }

    pub fn has_all_permissions(&self, user: &User, required: &[Permission]) -> bool {
        self.missing_permissions(user, required).is_empty()
    }

    /// Required permissions the user lacks, in the order given
    pub fn missing_permissions(&self, user: &User, required: &[Permission]) -> Vec<Permission> {
        let effective = self.effective_permissions(user);
        required
            .iter()
            .copied()
            .filter(|p| !effective.contains(p))
            .collect()
    }

    pub fn has_role(&self, user: &User, required: UserRole) -> bool {
        user.user_role.at_least(required)
    }

    /// Fails closed when either code is outside the role list
    pub fn has_role_code(&self, user_role_code: &str, required_code: &str) -> bool {
        match (
            UserRole::from_code(user_role_code),
            UserRole::from_code(required_code),
        ) {
            (Some(actual), Some(required)) => actual.at_least(required),
            _ => false,
        }
    }
}

fn known<'a>(tags: impl IntoIterator<Item = &'a String>) -> impl Iterator<Item = Permission> {
    tags.into_iter().filter_map(|tag| Permission::parse(tag))
}
