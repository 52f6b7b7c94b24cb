//! Collision groups, controller sweep filters and collision flags.

use rapier3d::prelude::*;

/// Collision groups for the two kinds of actor a scene holds.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionGroup {
    /// Shapes stamped from prefabs onto rigid bodies
    Body = 1 << 0,
    /// Character controller volumes
    Character = 1 << 1,
}

impl CollisionGroup {
    /// Rigid body shapes touch everything.
    pub fn body() -> (Group, Group) {
        let membership = Group::from_bits_retain(Self::Body as u32);
        (membership, Group::ALL)
    }

    /// Characters are pushed around by bodies but never collide with each other.
    pub fn character() -> (Group, Group) {
        let membership = Group::from_bits_retain(Self::Character as u32);
        let filter = Group::from_bits_retain(Self::Body as u32);
        (membership, filter)
    }
}

/// Which sides of a controller touched something during one move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CollisionFlags(u8);

impl CollisionFlags {
    pub const NONE: Self = Self(0);
    pub const SIDES: Self = Self(1 << 0);
    pub const ABOVE: Self = Self(1 << 1);
    pub const BELOW: Self = Self(1 << 2);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for CollisionFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// What a controller sweep may collide with. Sensors are never included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerFilters {
    pub include_static: bool,
    pub include_dynamic: bool,
    /// Restrict the sweep to colliders matching these groups.
    pub groups: Option<InteractionGroups>,
}

impl Default for ControllerFilters {
    fn default() -> Self {
        Self {
            include_static: true,
            include_dynamic: true,
            groups: None,
        }
    }
}

impl ControllerFilters {
    /// Build the native query filter, leaving out the controller's own body.
    pub(crate) fn to_query_filter(&self, own_body: RigidBodyHandle) -> QueryFilter<'static> {
        let mut flags = QueryFilterFlags::EXCLUDE_SENSORS;
        if !self.include_static {
            flags |= QueryFilterFlags::EXCLUDE_FIXED;
        }
        if !self.include_dynamic {
            flags |= QueryFilterFlags::EXCLUDE_DYNAMIC;
        }

        let mut filter = QueryFilter::from(flags).exclude_rigid_body(own_body);
        if let Some(groups) = self.groups {
            filter = filter.groups(groups);
        }
        filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_combine() {
        let mut flags = CollisionFlags::NONE;
        assert!(flags.is_empty());
        flags.insert(CollisionFlags::BELOW);
        let flags = flags | CollisionFlags::SIDES;
        assert!(flags.contains(CollisionFlags::BELOW));
        assert!(flags.contains(CollisionFlags::SIDES));
        assert!(!flags.contains(CollisionFlags::ABOVE));
    }

    #[test]
    fn characters_ignore_each_other() {
        let (membership, filter) = CollisionGroup::character();
        let a = InteractionGroups::new(membership, filter);
        let (body_membership, body_filter) = CollisionGroup::body();
        let body = InteractionGroups::new(body_membership, body_filter);

        assert!(!a.test(a));
        assert!(a.test(body));
    }

    #[test]
    fn filters_always_skip_sensors() {
        let mut bodies = RigidBodySet::new();
        let own = bodies.insert(RigidBodyBuilder::kinematic_position_based().build());
        let filter = ControllerFilters {
            include_dynamic: false,
            ..Default::default()
        }
        .to_query_filter(own);

        assert!(filter.flags.contains(QueryFilterFlags::EXCLUDE_SENSORS));
        assert!(filter.flags.contains(QueryFilterFlags::EXCLUDE_DYNAMIC));
        assert!(!filter.flags.contains(QueryFilterFlags::EXCLUDE_FIXED));
        assert_eq!(filter.exclude_rigid_body, Some(own));
    }
}
