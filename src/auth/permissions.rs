use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::role::UserRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ViewOwnProfile,
    RecordDailyStudies,
    ViewOwnProgram,
    MarkProgramTasks,
    ViewOwnAssignments,
    UpdateAssignmentStatus,

    ViewStudents,
    LinkStudents,
    EditPrograms,
    CreateAssignments,
}

static BASE_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();
    permissions.insert(Permission::ViewOwnProfile);
    permissions
});

static STUDENT_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(BASE_PERMISSIONS.iter().copied());

    permissions.insert(Permission::RecordDailyStudies);
    permissions.insert(Permission::ViewOwnProgram);
    permissions.insert(Permission::MarkProgramTasks);
    permissions.insert(Permission::ViewOwnAssignments);
    permissions.insert(Permission::UpdateAssignmentStatus);

    permissions
});

static TEACHER_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(BASE_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ViewStudents);
    permissions.insert(Permission::LinkStudents);
    permissions.insert(Permission::EditPrograms);
    permissions.insert(Permission::CreateAssignments);

    permissions
});

pub fn permissions(role: UserRole) -> &'static HashSet<Permission> {
    match role {
        UserRole::Student => &STUDENT_PERMISSIONS,
        UserRole::Teacher => &TEACHER_PERMISSIONS,
        UserRole::Unknown => &BASE_PERMISSIONS,
    }
}

pub fn has_permission(role: UserRole, permission: Permission) -> bool {
    permissions(role).contains(&permission)
}
