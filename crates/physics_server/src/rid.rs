//! Opaque resource handles
//!
//! Every server object lives in a typed slot map and is addressed by a
//! generational key, so stale handles are detected instead of dereferenced.

use slotmap::new_key_type;

new_key_type! {
    /// Handle to a shape
    pub struct ShapeRid;
    /// Handle to a rigid body
    pub struct BodyRid;
    /// Handle to an area
    pub struct AreaRid;
    /// Handle to a soft body
    pub struct SoftBodyRid;
    /// Handle to a space
    pub struct SpaceRid;
    /// Handle to a joint
    pub struct JointRid;
}

/// Handle to any collision object.
///
/// The derived ordering puts areas before bodies before soft bodies, which is
/// the precedence used to canonicalize overlapping pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectRid {
    /// An area
    Area(AreaRid),
    /// A rigid body
    Body(BodyRid),
    /// A soft body
    SoftBody(SoftBodyRid),
}

impl ObjectRid {
    /// The body handle, if this is a body
    pub const fn as_body(self) -> Option<BodyRid> {
        match self {
            Self::Body(rid) => Some(rid),
            _ => None,
        }
    }

    /// The area handle, if this is an area
    pub const fn as_area(self) -> Option<AreaRid> {
        match self {
            Self::Area(rid) => Some(rid),
            _ => None,
        }
    }

    /// The soft body handle, if this is a soft body
    pub const fn as_soft_body(self) -> Option<SoftBodyRid> {
        match self {
            Self::SoftBody(rid) => Some(rid),
            _ => None,
        }
    }
}

impl From<BodyRid> for ObjectRid {
    fn from(rid: BodyRid) -> Self {
        Self::Body(rid)
    }
}

impl From<AreaRid> for ObjectRid {
    fn from(rid: AreaRid) -> Self {
        Self::Area(rid)
    }
}

impl From<SoftBodyRid> for ObjectRid {
    fn from(rid: SoftBodyRid) -> Self {
        Self::SoftBody(rid)
    }
}

/// Handle to any server resource, accepted by `PhysicsServer::free`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rid {
    /// A shape
    Shape(ShapeRid),
    /// A rigid body
    Body(BodyRid),
    /// An area
    Area(AreaRid),
    /// A soft body
    SoftBody(SoftBodyRid),
    /// A space
    Space(SpaceRid),
    /// A joint
    Joint(JointRid),
}

macro_rules! rid_from {
    ($($key:ident => $variant:ident),* $(,)?) => {
        $(impl From<$key> for Rid {
            fn from(rid: $key) -> Self {
                Self::$variant(rid)
            }
        })*
    };
}

rid_from!(
    ShapeRid => Shape,
    BodyRid => Body,
    AreaRid => Area,
    SoftBodyRid => SoftBody,
    SpaceRid => Space,
    JointRid => Joint,
);

impl From<ObjectRid> for Rid {
    fn from(rid: ObjectRid) -> Self {
        match rid {
            ObjectRid::Area(r) => Self::Area(r),
            ObjectRid::Body(r) => Self::Body(r),
            ObjectRid::SoftBody(r) => Self::SoftBody(r),
        }
    }
}
