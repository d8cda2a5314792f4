//! Container runtime abstraction. `StartTask`/`StopTask`/`InspectTask`
//! delegate here instead of calling a container engine client directly, so
//! the execution/status loops can be exercised in tests without a running
//! engine.
//!
//! `Runtime` is used behind `Box<dyn Runtime>`, so its methods return
//! boxed futures explicitly rather than being declared `async fn`.

use shared::Task;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of asking the runtime to start a task's container.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub container_id: String,
    pub host_ports: HashMap<String, String>,
}

/// A point-in-time read of a container's status.
#[derive(Debug, Clone)]
pub struct InspectResult {
    /// `None` if the runtime has no record of the container at all.
    pub status: Option<String>,
    pub host_ports: HashMap<String, String>,
}

impl InspectResult {
    pub fn absent() -> Self {
        Self {
            status: None,
            host_ports: HashMap::new(),
        }
    }

    pub fn is_exited(&self) -> bool {
        match &self.status {
            None => true,
            Some(status) => status == "exited",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("container engine error: {0}")]
    Engine(String),
}

/// Boundary over the external container engine. The worker's state-machine
/// logic never talks to `bollard` directly; only `BollardRuntime` does.
pub trait Runtime: Send + Sync {
    fn run<'a>(&'a self, task: &'a Task) -> BoxFuture<'a, Result<RunResult, RuntimeError>>;
    fn stop<'a>(&'a self, container_id: &'a str) -> BoxFuture<'a, Result<(), RuntimeError>>;
    fn inspect<'a>(&'a self, container_id: &'a str) -> BoxFuture<'a, Result<InspectResult, RuntimeError>>;
}

/// `Runtime` backed by the local container engine's HTTP API, reached
/// through the standard `DOCKER_HOST`/`DOCKER_TLS_VERIFY`/
/// `DOCKER_CERT_PATH` environment.
pub struct BollardRuntime {
    docker: bollard::Docker,
}

impl BollardRuntime {
    pub fn connect() -> Result<Self, RuntimeError> {
        let docker = bollard::Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::Engine(e.to_string()))?;
        Ok(Self { docker })
    }

    fn port_bindings(task: &Task) -> HashMap<String, Option<Vec<bollard::models::PortBinding>>> {
        task.exposed_ports
            .keys()
            .map(|port| {
                (
                    port.clone(),
                    Some(vec![bollard::models::PortBinding {
                        host_ip: Some("0.0.0.0".to_string()),
                        host_port: None,
                    }]),
                )
            })
            .collect()
    }

    fn exposed_ports(task: &Task) -> HashMap<String, HashMap<(), ()>> {
        task.exposed_ports
            .keys()
            .map(|port| (port.clone(), HashMap::new()))
            .collect()
    }

    async fn run_impl(&self, task: &Task) -> Result<RunResult, RuntimeError> {
        use bollard::container::{Config, CreateContainerOptions, StartContainerOptions};
        use bollard::image::CreateImageOptions;
        use futures_util::StreamExt;

        let mut pull = self.docker.create_image(
            Some(CreateImageOptions {
                from_image: task.image.clone(),
                ..Default::default()
            }),
            None,
            None,
        );
        while let Some(progress) = pull.next().await {
            progress.map_err(|e| RuntimeError::Engine(e.to_string()))?;
        }

        let host_config = bollard::models::HostConfig {
            port_bindings: Some(Self::port_bindings(task)),
            publish_all_ports: Some(true),
            memory: if task.memory > 0 {
                Some(task.memory as i64)
            } else {
                None
            },
            ..Default::default()
        };
        let config = Config {
            image: Some(task.image.clone()),
            exposed_ports: Some(Self::exposed_ports(task)),
            host_config: Some(host_config),
            ..Default::default()
        };

        let container = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: task.name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(|e| RuntimeError::Engine(e.to_string()))?;

        self.docker
            .start_container(&container.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| RuntimeError::Engine(e.to_string()))?;

        let inspected = self.inspect_impl(&container.id).await?;
        Ok(RunResult {
            container_id: container.id,
            host_ports: inspected.host_ports,
        })
    }

    async fn stop_impl(&self, container_id: &str) -> Result<(), RuntimeError> {
        use bollard::container::{RemoveContainerOptions, StopContainerOptions};

        self.docker
            .stop_container(container_id, None::<StopContainerOptions>)
            .await
            .map_err(|e| RuntimeError::Engine(e.to_string()))?;
        self.docker
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| RuntimeError::Engine(e.to_string()))?;
        Ok(())
    }

    async fn inspect_impl(&self, container_id: &str) -> Result<InspectResult, RuntimeError> {
        use bollard::container::InspectContainerOptions;

        let details = match self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
        {
            Ok(details) => details,
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => return Ok(InspectResult::absent()),
            Err(e) => return Err(RuntimeError::Engine(e.to_string())),
        };

        let status = details.state.and_then(|s| s.status).map(|s| s.to_string());
        let mut host_ports = HashMap::new();
        if let Some(network_settings) = details.network_settings {
            if let Some(ports) = network_settings.ports {
                for (port, bindings) in ports {
                    if let Some(binding) = bindings.and_then(|b| b.into_iter().next()) {
                        if let Some(host_port) = binding.host_port {
                            host_ports.insert(port, host_port);
                        }
                    }
                }
            }
        }

        Ok(InspectResult { status, host_ports })
    }
}

impl Runtime for BollardRuntime {
    fn run<'a>(&'a self, task: &'a Task) -> BoxFuture<'a, Result<RunResult, RuntimeError>> {
        Box::pin(self.run_impl(task))
    }

    fn stop<'a>(&'a self, container_id: &'a str) -> BoxFuture<'a, Result<(), RuntimeError>> {
        Box::pin(self.stop_impl(container_id))
    }

    fn inspect<'a>(&'a self, container_id: &'a str) -> BoxFuture<'a, Result<InspectResult, RuntimeError>> {
        Box::pin(self.inspect_impl(container_id))
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// In-memory `Runtime` fake for exercising the execution/status loops
    /// without a container engine present.
    #[derive(Default)]
    pub struct FakeRuntime {
        pub containers: Mutex<std::collections::HashMap<String, InspectResult>>,
        pub fail_run: bool,
    }

    impl Runtime for FakeRuntime {
        fn run<'a>(&'a self, _task: &'a Task) -> BoxFuture<'a, Result<RunResult, RuntimeError>> {
            Box::pin(async move {
                if self.fail_run {
                    return Err(RuntimeError::Engine("forced failure".to_string()));
                }
                let container_id = Uuid::new_v4().to_string();
                let mut host_ports = HashMap::new();
                host_ports.insert("80/tcp".to_string(), "32768".to_string());
                self.containers.lock().unwrap().insert(
                    container_id.clone(),
                    InspectResult {
                        status: Some("running".to_string()),
                        host_ports: host_ports.clone(),
                    },
                );
                Ok(RunResult {
                    container_id,
                    host_ports,
                })
            })
        }

        fn stop<'a>(&'a self, container_id: &'a str) -> BoxFuture<'a, Result<(), RuntimeError>> {
            Box::pin(async move {
                self.containers.lock().unwrap().remove(container_id);
                Ok(())
            })
        }

        fn inspect<'a>(&'a self, container_id: &'a str) -> BoxFuture<'a, Result<InspectResult, RuntimeError>> {
            Box::pin(async move {
                Ok(self
                    .containers
                    .lock()
                    .unwrap()
                    .get(container_id)
                    .cloned()
                    .unwrap_or_else(InspectResult::absent))
            })
        }
    }
}
