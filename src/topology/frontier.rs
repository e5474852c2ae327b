use std::collections::{HashSet, VecDeque};

/// An address waiting to be scanned and its hop count from the nearest seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub address: String,
    pub depth: usize,
}

/// FIFO work list for the breadth-first crawl.
///
/// An address is marked seen when it is claimed, not when it is queued, so it is scanned
/// at most once and always at the depth it was first claimed at.
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<FrontierEntry>,
    queued: HashSet<String>,
    seen: HashSet<String>,
    max_depth: usize,
}

impl Frontier {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            ..Default::default()
        }
    }

    /// Queues every seed at depth 0, in order.
    pub fn seed<I, S>(&mut self, seeds: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for seed in seeds {
            self.push(seed.as_ref(), 0);
        }
    }

    /// Queues an address unless it was already claimed, is already waiting, or lies
    /// beyond the depth bound. Returns whether it was queued.
    pub fn push(&mut self, address: &str, depth: usize) -> bool {
        if depth > self.max_depth || self.seen.contains(address) || self.queued.contains(address) {
            return false;
        }
        self.queued.insert(address.to_string());
        self.queue.push_back(FrontierEntry {
            address: address.to_string(),
            depth,
        });
        true
    }

    /// Pops the next scannable entry and marks it seen.
    pub fn claim_next(&mut self) -> Option<FrontierEntry> {
        while let Some(entry) = self.queue.pop_front() {
            self.queued.remove(&entry.address);
            if entry.depth > self.max_depth || self.seen.contains(&entry.address) {
                continue;
            }
            self.seen.insert(entry.address.clone());
            return Some(entry);
        }
        None
    }

    /// Depth of the entry at the head of the queue.
    pub fn next_depth(&self) -> Option<usize> {
        self.queue.front().map(|entry| entry.depth)
    }

    pub fn is_seen(&self, address: &str) -> bool {
        self.seen.contains(address)
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
