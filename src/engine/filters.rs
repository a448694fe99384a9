//! Subscription filters: batching and fan-in caps between nodes.
//!
//! A filter sits on the edge(s) into a node and decides which of the
//! offered contexts travel onward *now*. Filters are stateful across offers
//! — held contexts survive between external triggers because the cached
//! publisher graph (and with it every filter instance) is memoized per
//! stream.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::context::FlowContext;

/// Pure batching decision over a list of contexts.
///
/// Implementations hold their own interior state; `offer` is the only
/// mutation path, `drain` the manual escape hatch.
pub trait SubscriptionFilter: Send + Sync {
    /// Offer a batch; returns the contexts allowed to travel now.
    fn offer(&self, batch: Vec<FlowContext>) -> Vec<FlowContext>;

    /// Forcibly release everything currently held.
    fn drain(&self) -> Vec<FlowContext>;

    /// Number of contexts currently held back.
    fn held(&self) -> usize;
}

/// Holds contexts until the buffer reaches a threshold, then forwards the
/// whole buffer unchanged. No partial passthrough: below the threshold
/// nothing travels.
///
/// # Examples
///
/// ```rust
/// use flowmesh::context::FlowContext;
/// use flowmesh::engine::{BatchSizeFilter, SubscriptionFilter};
///
/// let filter = BatchSizeFilter::new(3);
/// let two: Vec<FlowContext> = (0..2).map(|_| FlowContext::new("s-1", "a")).collect();
/// assert!(filter.offer(two).is_empty());
/// assert_eq!(filter.held(), 2);
///
/// let one = vec![FlowContext::new("s-1", "a")];
/// assert_eq!(filter.offer(one).len(), 3);
/// assert_eq!(filter.held(), 0);
/// ```
pub struct BatchSizeFilter {
    threshold: usize,
    buffer: Mutex<Vec<FlowContext>>,
}

impl BatchSizeFilter {
    #[must_use]
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            buffer: Mutex::new(Vec::new()),
        }
    }
}

impl SubscriptionFilter for BatchSizeFilter {
    fn offer(&self, batch: Vec<FlowContext>) -> Vec<FlowContext> {
        let mut buffer = self.buffer.lock();
        buffer.extend(batch);
        if buffer.len() >= self.threshold {
            std::mem::take(&mut *buffer)
        } else {
            Vec::new()
        }
    }

    fn drain(&self) -> Vec<FlowContext> {
        std::mem::take(&mut *self.buffer.lock())
    }

    fn held(&self) -> usize {
        self.buffer.lock().len()
    }
}

/// Caps fan-in per fork batch: forwards only the first `threshold` contexts
/// sharing a `batch_id`, dropping the remainder of that batch. Contexts
/// without a batch id pass through untouched.
///
/// Counting state persists across offers so a join cap applies to the whole
/// life of a forked lineage, not to one delivery.
pub struct TransBatchSizeFilter {
    threshold: usize,
    seen: Mutex<FxHashMap<String, usize>>,
}

impl TransBatchSizeFilter {
    #[must_use]
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            seen: Mutex::new(FxHashMap::default()),
        }
    }
}

impl SubscriptionFilter for TransBatchSizeFilter {
    fn offer(&self, batch: Vec<FlowContext>) -> Vec<FlowContext> {
        let mut seen = self.seen.lock();
        batch
            .into_iter()
            .filter(|ctx| match &ctx.batch_id {
                Some(batch_id) => {
                    let count = seen.entry(batch_id.clone()).or_insert(0);
                    if *count < self.threshold {
                        *count += 1;
                        true
                    } else {
                        tracing::debug!(
                            batch_id = %batch_id,
                            context_id = %ctx.id,
                            "fan-in cap reached; dropping surplus branch context"
                        );
                        false
                    }
                }
                None => true,
            })
            .collect()
    }

    fn drain(&self) -> Vec<FlowContext> {
        // Nothing is buffered here; surplus contexts are dropped, not held.
        Vec::new()
    }

    fn held(&self) -> usize {
        0
    }
}

/// Applies filters in order, feeding each stage's pass-through to the next.
pub struct FilterChain {
    filters: Vec<Box<dyn SubscriptionFilter>>,
}

impl FilterChain {
    #[must_use]
    pub fn new(filters: Vec<Box<dyn SubscriptionFilter>>) -> Self {
        Self { filters }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl SubscriptionFilter for FilterChain {
    fn offer(&self, batch: Vec<FlowContext>) -> Vec<FlowContext> {
        self.filters
            .iter()
            .fold(batch, |acc, f| if acc.is_empty() { acc } else { f.offer(acc) })
    }

    fn drain(&self) -> Vec<FlowContext> {
        let mut drained = Vec::new();
        for filter in &self.filters {
            drained.extend(filter.drain());
        }
        drained
    }

    fn held(&self) -> usize {
        self.filters.iter().map(|f| f.held()).sum()
    }
}
