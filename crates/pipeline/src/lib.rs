//! Event pipelines.
//!
//! A [`Pipeline`] runs filters then transforms in order and fans the result
//! out to its consumers. The [`PipelineManager`] fans each inbound envelope out
//! to every enabled pipeline. [`build_pipelines`] assembles one pipeline per
//! configured consumer from a [`danmu_plugins::PluginRegistry`].

pub mod builder;
pub mod error;
pub mod manager;
pub mod pipeline;

#[cfg(test)]
mod testing;

pub use {
    builder::{
        BuildFailure, BuildReport, EVENT_KIND_FILTER, FORMAT_TRANSFORM, build_pipelines,
        default_plugin_entries,
    },
    error::{Error, Result},
    manager::{ManagerStats, PipelineManager},
    pipeline::{Outcome, Pipeline, PipelineStats},
};
