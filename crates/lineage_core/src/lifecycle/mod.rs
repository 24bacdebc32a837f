//! Lifecycle transitions: onboarding, configuration changes and resume.

mod engine;
mod saga;

pub use engine::LifecycleEngine;
pub use saga::{
    version_key, ChangeRequest, Onboarding, ResumeToken, Transition, TransitionPlan,
};
