//! Build and publish stages for coursepub.
//!
//! [`build`] turns unbuilt artifacts into built ones by running their recipes;
//! [`publish`] places built artifacts at their public paths. Both return a new
//! [`Universe`](coursepub_shared::Universe) and report progress through
//! caller-supplied callbacks.

pub mod build;
pub mod publish;
pub mod recipe;

pub use build::{BuildCallbacks, BuildOptions, build, build_artifact};
pub use publish::{PublishCallbacks, PublishOptions, public_path, publish};
pub use recipe::{BuildRecipe, ShellRecipe};
