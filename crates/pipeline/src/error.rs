use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("transform {plugin} failed in pipeline {pipeline}: {source}")]
    Transform {
        pipeline: String,
        plugin: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("pipeline {name} not found")]
    NotFound { name: String },

    #[error(transparent)]
    Plugin(#[from] danmu_plugins::Error),
}

impl Error {
    #[must_use]
    pub fn transform(pipeline: &str, plugin: &str, source: anyhow::Error) -> Self {
        Self::Transform {
            pipeline: pipeline.to_string(),
            plugin: plugin.to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
