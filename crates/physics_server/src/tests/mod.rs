//! Whole-server scenarios driven through the public entry points

mod fixtures;
mod resting;
mod area_overrides;
