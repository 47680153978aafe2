//! Fan-out of per-panel requests with independent deadlines.

use crate::encode::{encoder_for, Payload};
use crate::transport::{PanelInfo, PanelTransport, TransportError};
use futures::stream::{FuturesUnordered, StreamExt};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::time::Duration;
use tapestry_core::{PanelAddress, PayloadEncoding};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    Unreachable,
    Timeout,
    Rejected { status: u16 },
    Protocol,
    Encode,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    #[serde(flatten)]
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn timeout(after: Duration) -> Self {
        Self::new(FailureKind::Timeout, format!("no answer within {after:?}"))
    }

    fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "dispatch cancelled")
    }
}

impl From<TransportError> for Failure {
    fn from(err: TransportError) -> Self {
        let kind = match &err {
            TransportError::Unreachable(_) => FailureKind::Unreachable,
            TransportError::Timeout(_) => FailureKind::Timeout,
            TransportError::Rejected { status, .. } => FailureKind::Rejected { status: *status },
            TransportError::Protocol(_) => FailureKind::Protocol,
        };
        Self::new(kind, err.to_string())
    }
}

/// Result of one delivery.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Delivered,
    Failed(Failure),
}

impl Outcome {
    #[inline]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Outcome::Delivered)
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Outcome::Delivered => None,
            Outcome::Failed(f) => Some(f.kind),
        }
    }
}

impl From<Result<(), Failure>> for Outcome {
    fn from(r: Result<(), Failure>) -> Self {
        match r {
            Ok(()) => Outcome::Delivered,
            Err(f) => Outcome::Failed(f),
        }
    }
}

/// One tile bound for one panel, in the panel's native orientation.
#[derive(Clone, Debug)]
pub struct DispatchJob {
    pub address: PanelAddress,
    pub tile: RgbImage,
    pub encoding: PayloadEncoding,
}

impl DispatchJob {
    pub fn new(address: PanelAddress, tile: RgbImage, encoding: PayloadEncoding) -> Self {
        Self {
            address,
            tile,
            encoding,
        }
    }
}

/// Per-panel outcomes of one dispatch call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub outcomes: BTreeMap<PanelAddress, Outcome>,
}

impl DispatchReport {
    pub fn delivered(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_delivered()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.delivered()
    }

    #[inline]
    pub fn all_delivered(&self) -> bool {
        self.failed() == 0
    }

    /// Addresses a caller may want to retry.
    pub fn failed_addresses(&self) -> Vec<&PanelAddress> {
        self.outcomes
            .iter()
            .filter(|(_, o)| !o.is_delivered())
            .map(|(a, _)| a)
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DispatchParams {
    /// Deadline for each panel request, measured independently.
    #[serde(with = "secs_f64")]
    pub timeout: Duration,
    /// Ask panels to fully clear before drawing.
    #[serde(default)]
    pub clear: bool,
}

impl Default for DispatchParams {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            clear: false,
        }
    }
}

mod secs_f64 {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Sends tiles to panels, one concurrent request each.
#[derive(Clone, Debug)]
pub struct Dispatcher<T> {
    transport: T,
    params: DispatchParams,
}

impl<T: PanelTransport> Dispatcher<T> {
    pub fn new(transport: T, params: DispatchParams) -> Self {
        Self { transport, params }
    }

    pub fn params(&self) -> &DispatchParams {
        &self.params
    }

    /// Deliver every job and wait for all of them.
    pub async fn dispatch(&self, jobs: Vec<DispatchJob>) -> DispatchReport {
        self.dispatch_with_cancel(jobs, futures::future::pending())
            .await
    }

    /// Like [`dispatch`](Self::dispatch), but stops as soon as `cancel`
    /// resolves. Finished outcomes are kept; in-flight requests are dropped
    /// and reported as cancelled.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, jobs, cancel), fields(panels = jobs.len()))
    )]
    pub async fn dispatch_with_cancel(
        &self,
        jobs: Vec<DispatchJob>,
        cancel: impl Future<Output = ()>,
    ) -> DispatchReport {
        let jobs = dedup_jobs(jobs);
        let clear = self.params.clear;
        // Encoding is CPU work; finish it before any request starts so it
        // does not eat into the per-panel deadlines.
        let payloads: Vec<Result<Payload, Failure>> = jobs
            .iter()
            .map(|job| {
                encoder_for(job.encoding)
                    .encode(&job.tile)
                    .map_err(|e| Failure::new(FailureKind::Encode, e.to_string()))
            })
            .collect();
        let queued = &jobs;
        let encoded = &payloads;
        let results = self
            .fan_out(
                jobs.len(),
                move |i| {
                    let address = &queued[i].address;
                    async move {
                        match &encoded[i] {
                            Ok(payload) => self
                                .transport
                                .draw(address, payload, clear)
                                .await
                                .map_err(Failure::from),
                            Err(failure) => Err(failure.clone()),
                        }
                    }
                },
                cancel,
            )
            .await;

        let report = DispatchReport {
            outcomes: jobs
                .iter()
                .zip(results)
                .map(|(job, r)| (job.address.clone(), Outcome::from(r)))
                .collect(),
        };
        log_report("draw", &report);
        report
    }

    /// Blank every listed panel.
    pub async fn clear_all(&self, addresses: &[PanelAddress]) -> DispatchReport {
        let addresses = dedup_addresses(addresses);
        let targets = &addresses;
        let results = self
            .fan_out(
                addresses.len(),
                move |i| {
                    let address = &targets[i];
                    async move { self.transport.clear(address).await.map_err(Failure::from) }
                },
                futures::future::pending(),
            )
            .await;

        let report = DispatchReport {
            outcomes: addresses
                .iter()
                .zip(results)
                .map(|(a, r)| (a.clone(), Outcome::from(r)))
                .collect(),
        };
        log_report("clear", &report);
        report
    }

    /// Ask every listed panel for its [`PanelInfo`].
    pub async fn probe(
        &self,
        addresses: &[PanelAddress],
    ) -> BTreeMap<PanelAddress, Result<PanelInfo, Failure>> {
        let addresses = dedup_addresses(addresses);
        let targets = &addresses;
        let results = self
            .fan_out(
                addresses.len(),
                move |i| {
                    let address = &targets[i];
                    async move { self.transport.info(address).await.map_err(Failure::from) }
                },
                futures::future::pending(),
            )
            .await;
        addresses.into_iter().zip(results).collect()
    }

    /// Run `count` requests concurrently, each under its own deadline, and
    /// collect their results by index. Slots still empty when `cancel`
    /// fires are reported as cancelled.
    async fn fan_out<R, Fut>(
        &self,
        count: usize,
        make: impl Fn(usize) -> Fut,
        cancel: impl Future<Output = ()>,
    ) -> Vec<Result<R, Failure>>
    where
        Fut: Future<Output = Result<R, Failure>>,
    {
        let deadline = self.params.timeout;
        let mut slots: Vec<Option<Result<R, Failure>>> = (0..count).map(|_| None).collect();
        let mut pending: FuturesUnordered<_> = (0..count)
            .map(|i| {
                let request = make(i);
                async move {
                    let result = match tokio::time::timeout(deadline, request).await {
                        Ok(r) => r,
                        Err(_) => Err(Failure::timeout(deadline)),
                    };
                    (i, result)
                }
            })
            .collect();

        tokio::pin!(cancel);
        loop {
            tokio::select! {
                biased;
                _ = &mut cancel => {
                    log::warn!("dispatch cancelled with {} requests in flight", pending.len());
                    break;
                }
                next = pending.next() => match next {
                    Some((i, result)) => slots[i] = Some(result),
                    None => break,
                },
            }
        }
        drop(pending);

        slots
            .into_iter()
            .map(|s| s.unwrap_or_else(|| Err(Failure::cancelled())))
            .collect()
    }
}

fn dedup_jobs(jobs: Vec<DispatchJob>) -> Vec<DispatchJob> {
    let mut seen = HashSet::new();
    jobs.into_iter()
        .filter(|j| {
            let fresh = seen.insert(j.address.clone());
            if !fresh {
                log::warn!("{}: more than one tile queued, keeping the first", j.address);
            }
            fresh
        })
        .collect()
}

fn dedup_addresses(addresses: &[PanelAddress]) -> Vec<PanelAddress> {
    let mut seen = HashSet::new();
    addresses
        .iter()
        .filter(|a| seen.insert((*a).clone()))
        .cloned()
        .collect()
}

fn log_report(what: &str, report: &DispatchReport) {
    for (address, outcome) in &report.outcomes {
        if let Outcome::Failed(f) = outcome {
            log::warn!("{what} {address}: {}", f.message);
        }
    }
    log::info!(
        "{what}: {} delivered, {} failed",
        report.delivered(),
        report.failed()
    );
}
