//! # Physics Settings
//!
//! Project-wide defaults applied when the server creates a space: the default
//! area's gravity and damping, the solver iteration count and the contact and
//! sleep tunables every new space starts with.

use serde::{Deserialize, Serialize};

use super::Config;
use crate::foundation::math::{Real, Vec3};

/// Server and per-space defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsSettings {
    /// Gravity magnitude of every space's default area
    pub default_gravity: Real,
    /// Gravity direction of every space's default area
    pub default_gravity_vector: Vec3,
    /// Linear damping of every space's default area
    pub default_linear_damp: Real,
    /// Angular damping of every space's default area
    pub default_angular_damp: Real,
    /// Solver iterations per island per step
    pub solver_iterations: usize,
    /// Contact points closer than this are treated as the same contact between steps
    pub contact_recycle_radius: Real,
    /// Contacts further apart than this are dropped
    pub contact_max_separation: Real,
    /// Penetration tolerated before position correction kicks in
    pub contact_max_allowed_penetration: Real,
    /// Position correction factor for contacts
    pub contact_default_bias: Real,
    /// Position correction factor for joints
    pub constraint_default_bias: Real,
    /// Linear speed below which a body counts as still
    pub sleep_threshold_linear: Real,
    /// Angular speed (radians/s) below which a body counts as still
    pub sleep_threshold_angular: Real,
    /// Seconds a body must stay still before it sleeps
    pub time_before_sleep: Real,
    /// Whether the server is driven from a thread other than the one querying it.
    /// Direct state access is then limited to the `sync()`/`end_sync()` window.
    pub run_on_separate_thread: bool,
}

impl Default for PhysicsSettings {
    fn default() -> Self {
        Self {
            default_gravity: 9.8,
            default_gravity_vector: Vec3::new(0.0, -1.0, 0.0),
            default_linear_damp: 0.1,
            default_angular_damp: 0.1,
            solver_iterations: 8,
            contact_recycle_radius: 0.01,
            contact_max_separation: 0.05,
            contact_max_allowed_penetration: 0.01,
            contact_default_bias: 0.8,
            constraint_default_bias: 0.01,
            sleep_threshold_linear: 0.1,
            sleep_threshold_angular: 8.0_f32.to_radians(),
            time_before_sleep: 0.5,
            run_on_separate_thread: false,
        }
    }
}

impl Config for PhysicsSettings {}

impl PhysicsSettings {
    /// Set the default gravity magnitude and direction
    pub fn with_gravity(mut self, magnitude: Real, direction: Vec3) -> Self {
        self.default_gravity = magnitude;
        self.default_gravity_vector = direction;
        self
    }

    /// Set default linear and angular damping
    pub fn with_damping(mut self, linear: Real, angular: Real) -> Self {
        self.default_linear_damp = linear;
        self.default_angular_damp = angular;
        self
    }

    /// Set the solver iteration count
    pub fn with_solver_iterations(mut self, iterations: usize) -> Self {
        self.solver_iterations = iterations;
        self
    }

    /// Set the sleep thresholds and delay
    pub fn with_sleep(mut self, linear: Real, angular: Real, time_before_sleep: Real) -> Self {
        self.sleep_threshold_linear = linear;
        self.sleep_threshold_angular = angular;
        self.time_before_sleep = time_before_sleep;
        self
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), String> {
        if self.solver_iterations == 0 {
            return Err("solver_iterations must be at least 1".to_string());
        }
        if !self.default_gravity.is_finite() || !self.default_gravity_vector.iter().all(|v| v.is_finite()) {
            return Err("default gravity must be finite".to_string());
        }
        let non_negative = [
            ("default_linear_damp", self.default_linear_damp),
            ("default_angular_damp", self.default_angular_damp),
            ("contact_recycle_radius", self.contact_recycle_radius),
            ("contact_max_separation", self.contact_max_separation),
            ("contact_max_allowed_penetration", self.contact_max_allowed_penetration),
            ("contact_default_bias", self.contact_default_bias),
            ("constraint_default_bias", self.constraint_default_bias),
            ("sleep_threshold_linear", self.sleep_threshold_linear),
            ("sleep_threshold_angular", self.sleep_threshold_angular),
            ("time_before_sleep", self.time_before_sleep),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.0) {
                return Err(format!("{name} must be non-negative, got {value}"));
            }
        }
        Ok(())
    }
}
