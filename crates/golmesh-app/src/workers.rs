//! Handles to compute workers, reached over HTTP or hosted in-process.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use golmesh_core::{ErrorBody, HEALTH_ROUTE, SLICE_ROUTE, Slice, SliceRequest, TERMINATE_ROUTE};
use golmesh_worker::{WorkerError, WorkerService};
use reqwest::blocking::{Client, Response};
use thiserror::Error;

/// Failures talking to a single worker.
#[derive(Debug, Error)]
pub enum WorkerCallError {
    #[error("worker {endpoint} unreachable: {message}")]
    Transport { endpoint: String, message: String },
    #[error("worker {endpoint} answered {status}: {message}")]
    Rejected {
        endpoint: String,
        status: u16,
        message: String,
    },
    #[error("no address configured for worker {index}")]
    NoAddress { index: usize },
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    #[error("in-process worker {index}: {source}")]
    Local {
        index: usize,
        #[source]
        source: WorkerError,
    },
}

/// One live connection to a worker, addressed by partition index.
pub trait SliceWorker: Send + Sync {
    /// Human-readable address used in logs and errors.
    fn endpoint(&self) -> &str;

    /// Check the worker is reachable before work is dispatched to it.
    fn probe(&self) -> Result<(), WorkerCallError> {
        Ok(())
    }

    fn compute_slice(&self, request: &SliceRequest) -> Result<Slice, WorkerCallError>;

    /// Ask the worker to finish in-flight work and shut down, waiting at most `timeout`.
    fn terminate(&self, timeout: Duration) -> Result<(), WorkerCallError>;
}

/// Source of worker handles; called once per run and again on quit.
pub trait WorkerPool: Send + Sync {
    fn connect(&self, count: usize) -> Result<Vec<Box<dyn SliceWorker>>, WorkerCallError>;
}

/// Where worker `i` lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerAddresses {
    /// Worker `i` listens on `host:(base_port + i)`.
    Sequential { host: String, base_port: u16 },
    Explicit(Vec<String>),
}

impl WorkerAddresses {
    #[must_use]
    pub fn address(&self, index: usize) -> Option<String> {
        match self {
            Self::Sequential { host, base_port } => {
                let offset = u16::try_from(index).ok()?;
                let port = base_port.checked_add(offset)?;
                Some(format!("{host}:{port}"))
            }
            Self::Explicit(addresses) => addresses.get(index).cloned(),
        }
    }
}

/// Settings for reaching workers over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPoolConfig {
    pub addresses: WorkerAddresses,
    /// Bound on a single slice call; `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    pub connect_timeout: Duration,
}

impl Default for HttpPoolConfig {
    fn default() -> Self {
        Self {
            addresses: WorkerAddresses::Sequential {
                host: "127.0.0.1".to_string(),
                base_port: 12346,
            },
            request_timeout: None,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Workers running as separate `golmesh-worker` processes.
#[derive(Debug, Clone)]
pub struct HttpWorkerPool {
    config: HttpPoolConfig,
}

impl HttpWorkerPool {
    #[must_use]
    pub fn new(config: HttpPoolConfig) -> Self {
        Self { config }
    }
}

impl WorkerPool for HttpWorkerPool {
    fn connect(&self, count: usize) -> Result<Vec<Box<dyn SliceWorker>>, WorkerCallError> {
        // Blocking clients own a runtime; build and drop them off the async executor.
        let client = Client::builder()
            .timeout(self.config.request_timeout)
            .connect_timeout(self.config.connect_timeout)
            .build()
            .map_err(|err| WorkerCallError::Client(err.to_string()))?;

        (0..count)
            .map(|index| {
                let address = self
                    .config
                    .addresses
                    .address(index)
                    .ok_or(WorkerCallError::NoAddress { index })?;
                Ok(Box::new(HttpWorker {
                    base_url: format!("http://{address}"),
                    endpoint: address,
                    client: client.clone(),
                }) as Box<dyn SliceWorker>)
            })
            .collect()
    }
}

struct HttpWorker {
    endpoint: String,
    base_url: String,
    client: Client,
}

impl HttpWorker {
    fn url(&self, route: &str) -> String {
        format!("{}{route}", self.base_url)
    }

    fn transport(&self, err: &reqwest::Error) -> WorkerCallError {
        WorkerCallError::Transport {
            endpoint: self.endpoint.clone(),
            message: err.to_string(),
        }
    }

    fn check(&self, response: Response) -> Result<Response, WorkerCallError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|body| body.error)
            .unwrap_or(body);
        Err(WorkerCallError::Rejected {
            endpoint: self.endpoint.clone(),
            status: status.as_u16(),
            message,
        })
    }
}

impl SliceWorker for HttpWorker {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn probe(&self) -> Result<(), WorkerCallError> {
        let response = self
            .client
            .get(self.url(HEALTH_ROUTE))
            .send()
            .map_err(|err| self.transport(&err))?;
        self.check(response).map(|_| ())
    }

    fn compute_slice(&self, request: &SliceRequest) -> Result<Slice, WorkerCallError> {
        let response = self
            .client
            .post(self.url(SLICE_ROUTE))
            .json(request)
            .send()
            .map_err(|err| self.transport(&err))?;
        self.check(response)?
            .json::<Slice>()
            .map_err(|err| self.transport(&err))
    }

    fn terminate(&self, timeout: Duration) -> Result<(), WorkerCallError> {
        let response = self
            .client
            .post(self.url(TERMINATE_ROUTE))
            .timeout(timeout)
            .send()
            .map_err(|err| self.transport(&err))?;
        self.check(response).map(|_| ())
    }
}

/// Workers hosted inside the broker process, one [`WorkerService`] per partition.
#[derive(Debug, Default)]
pub struct InProcessWorkerPool {
    services: Mutex<Vec<Arc<WorkerService>>>,
}

impl InProcessWorkerPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Services created so far, in partition order.
    pub fn services(&self) -> Vec<Arc<WorkerService>> {
        self.services
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl WorkerPool for InProcessWorkerPool {
    fn connect(&self, count: usize) -> Result<Vec<Box<dyn SliceWorker>>, WorkerCallError> {
        let mut services = self
            .services
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while services.len() < count {
            services.push(Arc::new(WorkerService::new()));
        }
        Ok(services
            .iter()
            .take(count)
            .enumerate()
            .map(|(index, service)| {
                Box::new(LocalWorker {
                    index,
                    endpoint: format!("in-process#{index}"),
                    service: Arc::clone(service),
                }) as Box<dyn SliceWorker>
            })
            .collect())
    }
}

struct LocalWorker {
    index: usize,
    endpoint: String,
    service: Arc<WorkerService>,
}

impl SliceWorker for LocalWorker {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn compute_slice(&self, request: &SliceRequest) -> Result<Slice, WorkerCallError> {
        self.service
            .compute_slice(request)
            .map_err(|source| WorkerCallError::Local {
                index: self.index,
                source,
            })
    }

    fn terminate(&self, _timeout: Duration) -> Result<(), WorkerCallError> {
        self.service
            .terminate()
            .map_err(|source| WorkerCallError::Local {
                index: self.index,
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use golmesh_core::{RowRange, Turn, World};

    #[test]
    fn sequential_addresses_count_up_from_base_port() {
        let addresses = WorkerAddresses::Sequential {
            host: "10.0.0.7".into(),
            base_port: 12346,
        };
        assert_eq!(addresses.address(0).as_deref(), Some("10.0.0.7:12346"));
        assert_eq!(addresses.address(3).as_deref(), Some("10.0.0.7:12349"));

        let crowded = WorkerAddresses::Sequential {
            host: "h".into(),
            base_port: u16::MAX,
        };
        assert_eq!(crowded.address(1), None, "port overflow has no address");
    }

    #[test]
    fn explicit_addresses_are_indexed() {
        let addresses = WorkerAddresses::Explicit(vec!["a:1".into(), "b:2".into()]);
        assert_eq!(addresses.address(1).as_deref(), Some("b:2"));
        assert_eq!(addresses.address(2), None);
    }

    #[test]
    fn http_pool_reports_missing_addresses() {
        let pool = HttpWorkerPool::new(HttpPoolConfig {
            addresses: WorkerAddresses::Explicit(vec!["127.0.0.1:1".into()]),
            ..HttpPoolConfig::default()
        });
        let err = pool.connect(2).err().expect("second worker has no address");
        assert!(matches!(err, WorkerCallError::NoAddress { index: 1 }));
    }

    #[test]
    fn in_process_pool_reuses_services_across_connects() {
        let pool = InProcessWorkerPool::new();
        let first = pool.connect(2).expect("connect");
        assert_eq!(first[1].endpoint(), "in-process#1");
        let again = pool.connect(3).expect("reconnect");
        assert_eq!(again.len(), 3);
        assert_eq!(pool.services().len(), 3);

        let world = World::with_alive(4, 4, &[(1, 0), (1, 1), (1, 2)]).expect("blinker");
        let request = SliceRequest::new(Turn(1), RowRange::new(0, 4), Arc::new(world));
        let slice = again[0].compute_slice(&request).expect("slice");
        assert_eq!(slice.alive, 3);
        let column: Vec<_> = (0..3).map(|row| slice.cells[row * 4 + 1]).collect();
        assert!(column.iter().all(|cell| cell.is_alive()), "blinker turns vertical");

        again[0].terminate(Duration::from_secs(1)).expect("terminate");
        assert!(pool.services()[0].is_terminating());
        let err = first[0].compute_slice(&request).expect_err("terminated");
        assert!(matches!(
            err,
            WorkerCallError::Local {
                index: 0,
                source: WorkerError::Terminating
            }
        ));
    }
}
