//! Loosely typed parameter values
//!
//! The `*_set_param` / `*_set_state` entry points take one enum key and a
//! value whose expected type depends on the key. A mismatched value is a
//! precondition failure.

use crate::error::{PhysicsError, PhysicsResult};
use crate::foundation::math::{Real, Transform, Vec3};

/// Value carried by a parameter or state entry point
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    /// A scalar
    Real(Real),
    /// An integer
    Int(i64),
    /// A flag
    Bool(bool),
    /// A vector
    Vector(Vec3),
    /// A rigid transform
    Transform(Transform),
}

impl ParamValue {
    /// Scalar value; integers are widened
    pub fn as_real(&self) -> PhysicsResult<Real> {
        match *self {
            Self::Real(v) => Ok(v),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(v) => Ok(v as Real),
            other => Err(mismatch("scalar", &other)),
        }
    }

    /// Integer value
    pub fn as_int(&self) -> PhysicsResult<i64> {
        match *self {
            Self::Int(v) => Ok(v),
            other => Err(mismatch("integer", &other)),
        }
    }

    /// Flag value
    pub fn as_bool(&self) -> PhysicsResult<bool> {
        match *self {
            Self::Bool(v) => Ok(v),
            other => Err(mismatch("bool", &other)),
        }
    }

    /// Vector value
    pub fn as_vector(&self) -> PhysicsResult<Vec3> {
        match *self {
            Self::Vector(v) => Ok(v),
            other => Err(mismatch("vector", &other)),
        }
    }

    /// Transform value
    pub fn as_transform(&self) -> PhysicsResult<Transform> {
        match *self {
            Self::Transform(v) => Ok(v),
            other => Err(mismatch("transform", &other)),
        }
    }
}

fn mismatch(expected: &str, got: &ParamValue) -> PhysicsError {
    let err = PhysicsError::precondition(format!("expected a {expected} value, got {got:?}"));
    log::error!("{}", err);
    err
}

impl From<Real> for ParamValue {
    fn from(v: Real) -> Self {
        Self::Real(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<Vec3> for ParamValue {
    fn from(v: Vec3) -> Self {
        Self::Vector(v)
    }
}

impl From<Transform> for ParamValue {
    fn from(v: Transform) -> Self {
        Self::Transform(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(ParamValue::from(2.5).as_real().unwrap(), 2.5);
        assert_eq!(ParamValue::Int(3).as_real().unwrap(), 3.0);
        assert!(ParamValue::from(true).as_real().is_err());
        assert!(ParamValue::from(Vec3::x()).as_vector().is_ok());
        assert!(ParamValue::Real(1.0).as_int().is_err());
    }
}
