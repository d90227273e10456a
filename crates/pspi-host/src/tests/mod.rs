//! Shared test support: builders for module images and manifests, a fake
//! native memory layer, scripted entry points and the behaviour suite.

pub(crate) mod fakes;

mod behaviour;
