/*!
Breadth-first CDP crawl.

The crawl proceeds in waves: every queued entry at depth `d` is claimed and scanned (up to
`concurrency` scans at a time) before any entry at depth `d + 1` is claimed. Scan results
are merged into the graph by the crawl task alone, in claim order, so the resulting graph
does not depend on how scans interleave.
*/

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::watch,
    task::JoinSet,
    time::{Instant, timeout},
};
use tracing::{debug, info, warn};

use crate::{
    config::{ConfigError, CrawlConfig},
    network::{network_graph::TopologyGraph, node::NodeStatus},
    topology::{
        frontier::{Frontier, FrontierEntry},
        source::{DeviceReport, DiscoveryError, NeighborSource},
    },
};

pub const DEFAULT_MAX_DEPTH: usize = 5;
pub const DEFAULT_DEVICE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlSettings {
    /// Hops from a seed beyond which devices are recorded but never scanned.
    pub max_depth: usize,
    /// Scans allowed in flight at once. 1 scans strictly one device after another.
    pub concurrency: usize,
    pub device_timeout: Duration,
    /// Wall-clock budget for the whole crawl.
    pub deadline: Option<Duration>,
    /// Enqueue neighbors known only by identity and let the source resolve them.
    pub resolve_identities: bool,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            concurrency: 1,
            device_timeout: DEFAULT_DEVICE_TIMEOUT,
            deadline: None,
            resolve_identities: false,
        }
    }
}

impl CrawlSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_depth == 0 {
            return Err(ConfigError::ZeroDepth);
        }
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.device_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("device_timeout"));
        }
        if self.deadline.is_some_and(|deadline| deadline.is_zero()) {
            return Err(ConfigError::ZeroDuration("deadline"));
        }
        Ok(())
    }
}

/// Counters reported when a crawl finishes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CrawlStats {
    pub scanned: usize,
    pub partial: usize,
    pub failed: usize,
    pub unresolved: usize,
    /// Claimed devices whose scan was abandoned when the crawl stopped early.
    pub abandoned: usize,
    pub waves: usize,
}

/// Why a crawl ended before its frontier was empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Deadline,
    Cancelled,
}

/// Results of one wave, indexed by claim order.
struct Wave {
    claimed: Vec<FrontierEntry>,
    results: Vec<Option<Result<DeviceReport, DiscoveryError>>>,
    stopped: Option<StopReason>,
}

pub struct Crawler {
    source: Arc<dyn NeighborSource>,
    seeds: Vec<String>,
    settings: CrawlSettings,
}

impl Crawler {
    pub fn new(source: Arc<dyn NeighborSource>, seeds: Vec<String>, settings: CrawlSettings) -> Result<Self, ConfigError> {
        if seeds.is_empty() {
            return Err(ConfigError::NoSeeds);
        }
        if seeds.iter().any(|seed| seed.trim().is_empty()) {
            return Err(ConfigError::EmptySeed);
        }
        settings.validate()?;
        Ok(Self {
            source,
            seeds,
            settings,
        })
    }

    /// Validates `config`, enumerates its seeds and builds the source it selects.
    pub fn from_config(config: &CrawlConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Self::new(config.build_source()?, config.seed_addresses()?, config.settings())
    }

    pub fn settings(&self) -> &CrawlSettings {
        &self.settings
    }

    pub fn seeds(&self) -> &[String] {
        &self.seeds
    }

    /// Crawls until the frontier is empty or the deadline passes.
    pub async fn crawl(&self) -> TopologyGraph {
        let (_keep_open, cancel) = watch::channel(false);
        self.crawl_with_cancel(cancel).await
    }

    /// Like [`Crawler::crawl`], also stopping once `cancel` turns true. The graph built so
    /// far is returned either way.
    pub async fn crawl_with_cancel(&self, cancel: watch::Receiver<bool>) -> TopologyGraph {
        self.crawl_with_stats(cancel).await.0
    }

    pub async fn crawl_with_stats(&self, mut cancel: watch::Receiver<bool>) -> (TopologyGraph, CrawlStats) {
        let started = Instant::now();
        let deadline = self.settings.deadline.map(|budget| started + budget);

        let mut frontier = Frontier::new(self.settings.max_depth);
        frontier.seed(&self.seeds);
        let mut graph = TopologyGraph::new();
        let mut stats = CrawlStats::default();

        info!(
            source = self.source.kind(),
            seeds = self.seeds.len(),
            max_depth = self.settings.max_depth,
            concurrency = self.settings.concurrency,
            "starting crawl"
        );

        let mut stopped = None;
        while let Some(depth) = frontier.next_depth() {
            let wave = self.run_wave(&mut frontier, depth, deadline, &mut cancel).await;
            stats.waves += 1;
            debug!(depth, devices = wave.claimed.len(), "wave finished");

            for (entry, result) in wave.claimed.into_iter().zip(wave.results) {
                match result {
                    Some(result) => self.merge(&mut graph, &mut frontier, &entry, result, &mut stats),
                    None => stats.abandoned += 1,
                }
            }
            if wave.stopped.is_some() {
                stopped = wave.stopped;
                break;
            }
        }

        match stopped {
            Some(StopReason::Deadline) => warn!(pending = frontier.len(), "crawl deadline reached, returning partial topology"),
            Some(StopReason::Cancelled) => warn!(pending = frontier.len(), "crawl cancelled, returning partial topology"),
            None => {}
        }
        info!(
            nodes = graph.node_count(),
            links = graph.edge_count(),
            scanned = stats.scanned,
            partial = stats.partial,
            failed = stats.failed,
            elapsed = ?started.elapsed(),
            "crawl finished"
        );
        (graph, stats)
    }

    /// Scans every queued entry at `depth`. New scans are started in claim order as slots
    /// free up; the wave ends early on deadline or cancellation.
    async fn run_wave(
        &self,
        frontier: &mut Frontier,
        depth: usize,
        deadline: Option<Instant>,
        cancel: &mut watch::Receiver<bool>,
    ) -> Wave {
        let mut wave = Wave {
            claimed: Vec::new(),
            results: Vec::new(),
            stopped: None,
        };
        let mut tasks = JoinSet::new();

        loop {
            while tasks.len() < self.settings.concurrency && frontier.next_depth() == Some(depth) {
                if let Some(reason) = stop_requested(deadline, cancel) {
                    wave.stopped = Some(reason);
                    break;
                }
                let Some(entry) = frontier.claim_next() else {
                    break;
                };
                debug!(address = %entry.address, depth, "scanning device");
                tasks.spawn(scan(
                    Arc::clone(&self.source),
                    entry.address.clone(),
                    self.settings.device_timeout,
                    wave.claimed.len(),
                ));
                wave.claimed.push(entry);
                wave.results.push(None);
            }
            if wave.stopped.is_some() || tasks.is_empty() {
                break;
            }

            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok((slot, result))) => {
                        if let Some(cell) = wave.results.get_mut(slot) {
                            *cell = Some(result);
                        }
                    }
                    Some(Err(e)) => warn!(depth, error = %e, "scan task ended abnormally"),
                    None => break,
                },
                _ = sleep_until(deadline) => {
                    wave.stopped = Some(StopReason::Deadline);
                }
                _ = wait_cancelled(cancel) => {
                    wave.stopped = Some(StopReason::Cancelled);
                }
            }
            if wave.stopped.is_some() {
                break;
            }
        }

        if wave.stopped.is_some() {
            tasks.abort_all();
            // Scans that completed before the abort still count.
            while let Some(joined) = tasks.join_next().await {
                if let Ok((slot, result)) = joined {
                    if let Some(cell) = wave.results.get_mut(slot) {
                        *cell = Some(result);
                    }
                }
            }
        }
        wave
    }

    fn merge(
        &self,
        graph: &mut TopologyGraph,
        frontier: &mut Frontier,
        entry: &FrontierEntry,
        result: Result<DeviceReport, DiscoveryError>,
        stats: &mut CrawlStats,
    ) {
        let address = entry.address.as_str();
        match result {
            Ok(report) => {
                graph.record_device(address, &report.display_name, NodeStatus::Scanned);
                let mut queued = 0;
                for record in &report.neighbors {
                    if !graph.record_neighbor(address, record) {
                        continue;
                    }
                    let scannable = record.has_address() || self.settings.resolve_identities;
                    if scannable && frontier.push(record.key(), entry.depth + 1) {
                        queued += 1;
                    }
                }
                stats.scanned += 1;
                debug!(
                    address,
                    depth = entry.depth,
                    name = %report.display_name,
                    neighbors = report.neighbors.len(),
                    queued,
                    "device scanned"
                );
            }
            Err(DiscoveryError::Transport {
                reason,
                display_name: Some(name),
            }) => {
                graph.record_device(address, &name, NodeStatus::Partial);
                stats.partial += 1;
                warn!(address, depth = entry.depth, name = %name, error = %reason, "device identified itself but its neighbors could not be read");
            }
            Err(DiscoveryError::Unresolvable(target)) => {
                stats.unresolved += 1;
                debug!(address, depth = entry.depth, target = %target, "skipping unresolvable neighbor");
            }
            Err(e) => {
                stats.failed += 1;
                warn!(address, depth = entry.depth, error = %e, "device scan failed");
            }
        }
    }
}

/// One device scan bounded by `device_timeout`, tagged with its claim slot.
async fn scan(
    source: Arc<dyn NeighborSource>,
    address: String,
    device_timeout: Duration,
    slot: usize,
) -> (usize, Result<DeviceReport, DiscoveryError>) {
    let result = match timeout(device_timeout, source.discover(&address)).await {
        Ok(result) => result,
        Err(_) => Err(DiscoveryError::Timeout(device_timeout)),
    };
    (slot, result)
}

fn stop_requested(deadline: Option<Instant>, cancel: &watch::Receiver<bool>) -> Option<StopReason> {
    if *cancel.borrow() {
        return Some(StopReason::Cancelled);
    }
    match deadline {
        Some(deadline) if Instant::now() >= deadline => Some(StopReason::Deadline),
        _ => None,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Resolves once cancellation is requested. A dropped sender can no longer cancel.
async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}
