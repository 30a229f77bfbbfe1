//! ClusterManager - Authoritative item set, zoom tracking and partition diffing
//!
//! The manager decides *when* to re-partition (zoom bucket changes and pending mutations) and
//! reduces each new partition to a [`Reconciliation`] against the previous one, so the renderer
//! only touches screen objects whose identity appeared, disappeared or changed.

use crate::{ClusterItem, GridClusterAlgorithm, Identity, Partition, RenderNode};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Decides which zoom changes are significant enough to re-partition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomThreshold {
    /// Width of one zoom bucket (1.0 = re-cluster on every integer zoom change)
    pub step: f64,
}

impl Default for ZoomThreshold {
    fn default() -> Self {
        Self { step: 1.0 }
    }
}

impl ZoomThreshold {
    /// Bucket containing `zoom`
    #[inline]
    pub fn bucket(&self, zoom: f64) -> i64 {
        (zoom / self.step).floor() as i64
    }

    /// Zoom level a bucket is clustered at
    #[inline]
    pub fn bucket_zoom(&self, bucket: i64) -> f64 {
        bucket as f64 * self.step
    }
}

/// Three-way diff between two successive partitions
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// Identities new in this partition
    pub to_add: Vec<RenderNode>,
    /// Identities present in both partitions whose drawn state changed
    pub to_update: Vec<RenderNode>,
    /// Identities absent from this partition
    pub to_remove: Vec<Identity>,
    /// Identities present in both partitions and left untouched
    pub unchanged: usize,
}

impl Reconciliation {
    /// True when applying this diff would issue no draw calls
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_update.is_empty() && self.to_remove.is_empty()
    }
}

/// Owner of the live item set and of the last applied partition
#[derive(Debug)]
pub struct ClusterManager {
    /// All live items, ordered by id
    items: BTreeMap<String, ClusterItem>,
    algorithm: GridClusterAlgorithm,
    threshold: ZoomThreshold,
    /// Latest zoom reported by the host
    zoom: f64,
    /// Bucket of the last partition, `None` before the first pass
    applied_bucket: Option<i64>,
    /// Ids touched since the last pass
    pending: BTreeSet<String>,
    /// Last partition, by identity
    previous: BTreeMap<Identity, RenderNode>,
    /// Identity currently representing each partitioned item
    membership: HashMap<String, Identity>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl ClusterManager {
    pub fn new(
        algorithm: GridClusterAlgorithm,
        threshold: ZoomThreshold,
        initial_zoom: f64,
    ) -> Self {
        Self {
            items: BTreeMap::new(),
            algorithm,
            threshold,
            zoom: initial_zoom,
            applied_bucket: None,
            pending: BTreeSet::new(),
            previous: BTreeMap::new(),
            membership: HashMap::new(),
        }
    }

    /// Insert a new item or overwrite an existing one
    ///
    /// Returns `true` when the id was not live before. Writing an identical item does not
    /// schedule a pass.
    pub fn insert_or_update(&mut self, item: ClusterItem) -> bool {
        match self.items.get_mut(&item.id) {
            Some(existing) => {
                if *existing != item {
                    self.pending.insert(item.id.clone());
                    *existing = item;
                }
                false
            }
            None => {
                self.pending.insert(item.id.clone());
                self.items.insert(item.id.clone(), item);
                true
            }
        }
    }

    /// Remove an item; unknown ids are ignored
    pub fn remove(&mut self, id: &str) -> Option<ClusterItem> {
        let removed = self.items.remove(id)?;
        self.pending.insert(removed.id.clone());
        Some(removed)
    }

    #[inline]
    pub fn get(&self, id: &str) -> Option<&ClusterItem> {
        self.items.get(id)
    }

    #[inline]
    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> impl Iterator<Item = &ClusterItem> {
        self.items.values()
    }

    /// Latest zoom level reported by the host
    #[inline]
    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Whether mutations are waiting for the next pass
    #[inline]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Identity under which an item was drawn by the last pass
    pub fn identity_of(&self, id: &str) -> Option<&Identity> {
        self.membership.get(id)
    }

    /// Node drawn for an identity by the last pass
    pub fn node(&self, identity: &Identity) -> Option<&RenderNode> {
        self.previous.get(identity)
    }

    /// Number of screen objects in the last partition
    pub fn rendered_len(&self) -> usize {
        self.previous.len()
    }

    /// Record a new zoom level, re-partitioning if it moved to another bucket
    pub fn on_zoom_changed(&mut self, zoom: f64) -> Option<Reconciliation> {
        self.zoom = zoom;
        if self.applied_bucket == Some(self.threshold.bucket(zoom)) {
            return None;
        }
        Some(self.recluster())
    }

    /// Run a pass if the zoom bucket changed or mutations are pending
    pub fn flush(&mut self) -> Option<Reconciliation> {
        let bucket = self.threshold.bucket(self.zoom);
        if self.applied_bucket == Some(bucket) && self.pending.is_empty() {
            return None;
        }
        Some(self.recluster())
    }

    /// Partition the current item set and diff it against the previous partition
    pub fn recluster(&mut self) -> Reconciliation {
        #[cfg(feature = "profiling")]
        profiling::scope!("manager::recluster");

        let bucket = self.threshold.bucket(self.zoom);
        let partition = self.algorithm.cluster(
            self.items.values().filter(|item| item.visual.visible),
            self.threshold.bucket_zoom(bucket),
        );
        let reconciliation = self.reconcile(partition);

        tracing::debug!(
            bucket,
            touched = self.pending.len(),
            added = reconciliation.to_add.len(),
            updated = reconciliation.to_update.len(),
            removed = reconciliation.to_remove.len(),
            unchanged = reconciliation.unchanged,
            "Re-partitioned {} items",
            self.items.len()
        );

        self.applied_bucket = Some(bucket);
        self.pending.clear();
        reconciliation
    }

    /// Replace the previous partition with `partition`, returning the diff
    fn reconcile(&mut self, partition: Partition) -> Reconciliation {
        let mut next: BTreeMap<Identity, RenderNode> = BTreeMap::new();
        let mut membership = HashMap::with_capacity(self.items.len());
        for node in partition.nodes {
            let identity = node.identity();
            for id in node.member_ids() {
                membership.insert(id, identity.clone());
            }
            next.insert(identity, node);
        }

        let mut reconciliation = Reconciliation::default();
        for (identity, node) in &next {
            match self.previous.get(identity) {
                None => reconciliation.to_add.push(node.clone()),
                Some(prev) if prev.needs_redraw(node) => {
                    reconciliation.to_update.push(node.clone())
                }
                Some(_) => reconciliation.unchanged += 1,
            }
        }
        reconciliation.to_remove = self
            .previous
            .keys()
            .filter(|identity| !next.contains_key(*identity))
            .cloned()
            .collect();

        self.previous = next;
        self.membership = membership;
        reconciliation
    }
}
