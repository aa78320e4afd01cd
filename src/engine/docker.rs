//! Docker engine backed by bollard
//!
//! Implements both capability traits against the local Docker daemon. The
//! build context is shipped as an in-memory tar of the artifact directory;
//! run containers are force-removed on every exit path.

use super::{BuildOutcome, ContainerRunner, EngineError, ImageBuilder};
use async_trait::async_trait;
use bollard::container::{
    Config, LogsOptions, RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::image::BuildImageOptions;
use bollard::Docker;
use bytes::Bytes;
use futures_util::stream::StreamExt;
use std::path::Path;
use tracing::{debug, info, warn};

/// Thin wrapper around a bollard client
#[derive(Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connects to the local Docker daemon.
    pub fn connect() -> Result<Self, EngineError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;
        Ok(Self { docker })
    }

    /// Checks whether the daemon answers a version request.
    pub async fn ping(&self) -> bool {
        match self.docker.version().await {
            Ok(v) => {
                debug!(api_version = ?v.api_version, "Docker daemon reachable");
                true
            }
            Err(e) => {
                debug!("Docker daemon not reachable: {}", e);
                false
            }
        }
    }

    fn archive_context(context_dir: &Path) -> Result<Bytes, EngineError> {
        let mut builder = tar::Builder::new(Vec::new());
        builder.append_dir_all(".", context_dir)?;
        let data = builder.into_inner()?;
        Ok(Bytes::from(data))
    }

    async fn collect_output(&self, container_id: &str) -> String {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let mut log_stream = self.docker.logs(container_id, Some(options));
        let mut output = String::new();
        while let Some(chunk) = log_stream.next().await {
            if let Ok(log_output) = chunk {
                output.push_str(&log_output.to_string());
            }
        }
        output
    }
}

#[async_trait]
impl ImageBuilder for DockerEngine {
    async fn build(
        &self,
        context_dir: &Path,
        dockerfile_name: &str,
        tag: &str,
    ) -> Result<BuildOutcome, EngineError> {
        info!(tag = %tag, dockerfile = %dockerfile_name, "Starting image build");

        let context = Self::archive_context(context_dir)?;

        let options = BuildImageOptions {
            dockerfile: dockerfile_name.to_string(),
            t: tag.to_string(),
            rm: true,
            pull: false,
            ..Default::default()
        };

        let mut stream = self
            .docker
            .build_image(options, None, Some(context));

        let mut log = Vec::new();
        let mut error: Option<String> = None;

        while let Some(item) = stream.next().await {
            match item {
                Ok(info) => {
                    if let Some(line) = info.stream {
                        let line = line.trim_end();
                        if !line.is_empty() {
                            log.push(line.to_string());
                        }
                    }
                    if let Some(message) = info.error {
                        log.push(message.clone());
                        error = Some(message);
                    } else if let Some(detail) = info.error_detail {
                        if let Some(message) = detail.message {
                            log.push(message.clone());
                            error = Some(message);
                        }
                    }
                }
                // The daemon reports build failures as stream errors too;
                // the build itself failed, not the engine.
                Err(e) => {
                    let message = e.to_string();
                    log.push(message.clone());
                    error = Some(message);
                }
            }
        }

        match error {
            None => {
                info!(tag = %tag, "Image build succeeded");
                Ok(BuildOutcome::Success { log })
            }
            Some(error) => {
                warn!(tag = %tag, error = %error, "Image build failed");
                Ok(BuildOutcome::Failure { log, error })
            }
        }
    }
}

#[async_trait]
impl ContainerRunner for DockerEngine {
    async fn run(&self, tag: &str) -> Result<String, EngineError> {
        info!(tag = %tag, "Running container");

        let config = Config {
            image: Some(tag.to_string()),
            ..Default::default()
        };

        let container = self
            .docker
            .create_container::<String, String>(None, config)
            .await
            .map_err(|e| EngineError::Api(format!("create failed: {}", e)))?;

        let result = self.run_to_completion(&container.id).await;

        // Removal happens on every exit path.
        if let Err(e) = self
            .docker
            .remove_container(
                &container.id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            warn!(tag = %tag, "Failed to remove container: {}", e);
        } else {
            debug!(tag = %tag, "Removed container");
        }

        result
    }
}

impl DockerEngine {
    async fn run_to_completion(&self, container_id: &str) -> Result<String, EngineError> {
        self.docker
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| EngineError::Api(format!("start failed: {}", e)))?;

        // A non-zero exit status surfaces as a wait error; the captured
        // output is still the signal, so both arms fall through to logs.
        let mut wait = self
            .docker
            .wait_container(container_id, None::<WaitContainerOptions<String>>);
        while let Some(status) = wait.next().await {
            match status {
                Ok(response) => debug!(status_code = response.status_code, "Container exited"),
                Err(e) => debug!("Container wait reported: {}", e),
            }
        }

        Ok(self.collect_output(container_id).await)
    }
}
