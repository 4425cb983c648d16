//! Asset build tasks for static front-end projects.
//!
//! Turns a source tree of HTML partials, SCSS, scripts, images and fonts
//! into a deployable output tree, and provides the plan combinators used to
//! run the tasks.

pub mod build;
pub mod clean;
pub mod css;
pub mod fonts;
pub mod html;
pub mod images;
pub mod include;
pub mod js;
pub mod paths;
pub mod sprite;
pub mod svg;
pub mod task;
pub mod webp;

pub use build::{BuildResult, Pipeline};
pub use fonts::{FontStyleTask, OtfTask};
pub use paths::{AssetKind, PathSpec};
pub use sprite::SpriteTask;
pub use task::{
    concurrent, sequence, Artifact, OutputListener, Plan, Runner, Task, TaskError, TaskReport,
};
