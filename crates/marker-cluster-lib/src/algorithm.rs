//! Grid-based clustering of items for a given zoom level
//!
//! The world is tiled into square cells of a fixed size in screen pixels. At zoom `z` there are
//! `256 * 2^z / grid_size` cells per side of the Web-Mercator square, so cells stay roughly the
//! same size on screen regardless of zoom. Items sharing a cell are grouped: groups of one stay
//! singletons, larger groups become a [`Cluster`] centered on the mean member position.

use crate::{ClusterError, ClusterItem, Result, utils};
use geo::{Centroid, MultiPoint, Point};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};

/// Stable identity of a rendered entry, derived from membership
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Identity {
    /// A singleton, identified by its item id
    Item(String),
    /// A cluster, identified by a hash of its sorted member ids
    Cluster(u64),
}

impl Identity {
    /// Identity of a cluster made of `members`, which must be sorted
    pub fn for_members(members: &[String]) -> Self {
        let mut hasher = DefaultHasher::new();
        members.len().hash(&mut hasher);
        for member in members {
            member.hash(&mut hasher);
        }
        Identity::Cluster(hasher.finish())
    }
}

/// An aggregate standing in for two or more nearby items
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    identity: Identity,
    /// Mean of the member positions
    pub centroid: Point<f64>,
    /// Member ids, sorted
    pub members: Vec<String>,
    /// Highest z-index among the members
    pub z_index: i32,
}

impl Cluster {
    /// Build a cluster from its members; returns `None` for fewer than two items
    fn from_members(mut members: Vec<&ClusterItem>) -> Option<Self> {
        if members.len() < 2 {
            return None;
        }
        members.sort_by(|a, b| a.id.cmp(&b.id));

        let points: MultiPoint<f64> = members.iter().map(|item| item.position).collect();
        let centroid = points.centroid()?;
        let z_index = members
            .iter()
            .map(|item| item.visual.z_index)
            .max()
            .unwrap_or_default();
        let members: Vec<String> = members.into_iter().map(|item| item.id.clone()).collect();

        Some(Self {
            identity: Identity::for_members(&members),
            centroid,
            members,
            z_index,
        })
    }

    #[inline]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.members.len()
    }
}

/// One screen object of a partition: either a singleton or a cluster
#[derive(Debug, Clone, PartialEq)]
pub enum RenderNode {
    Singleton(ClusterItem),
    Cluster(Cluster),
}

impl RenderNode {
    pub fn identity(&self) -> Identity {
        match self {
            RenderNode::Singleton(item) => Identity::Item(item.id.clone()),
            RenderNode::Cluster(cluster) => cluster.identity.clone(),
        }
    }

    /// Where the node is drawn
    pub fn position(&self) -> Point<f64> {
        match self {
            RenderNode::Singleton(item) => item.position,
            RenderNode::Cluster(cluster) => cluster.centroid,
        }
    }

    /// Ids of the items represented by this node
    pub fn member_ids(&self) -> Vec<String> {
        match self {
            RenderNode::Singleton(item) => vec![item.id.clone()],
            RenderNode::Cluster(cluster) => cluster.members.clone(),
        }
    }

    /// Whether redrawing is needed when going from `self` to `next` under the same identity
    pub fn needs_redraw(&self, next: &RenderNode) -> bool {
        self != next
    }
}

/// Result of one partition pass
#[derive(Debug, Clone, Default)]
pub struct Partition {
    /// Zoom level the partition was computed at
    pub zoom: f64,
    /// Nodes ordered by identity
    pub nodes: Vec<RenderNode>,
}

impl Partition {
    pub fn cluster_count(&self) -> usize {
        self.clusters().count()
    }

    pub fn singleton_count(&self) -> usize {
        self.nodes.len() - self.cluster_count()
    }

    /// Number of items absorbed into clusters
    pub fn clustered_item_count(&self) -> usize {
        self.clusters().map(Cluster::size).sum()
    }

    pub fn clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.nodes.iter().filter_map(|node| match node {
            RenderNode::Cluster(cluster) => Some(cluster),
            RenderNode::Singleton(_) => None,
        })
    }
}

/// Partitions items into clusters by bucketing them into fixed-size screen cells
#[derive(Debug, Clone)]
pub struct GridClusterAlgorithm {
    /// Cell side in screen pixels
    grid_size: u32,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl GridClusterAlgorithm {
    /// Create an algorithm with the given cell side in screen pixels
    pub fn new(grid_size: u32) -> Result<Self> {
        if grid_size == 0 {
            return Err(ClusterError::InvalidConfig(
                "grid size must be positive".to_string(),
            ));
        }
        Ok(Self { grid_size })
    }

    #[inline]
    pub fn grid_size(&self) -> u32 {
        self.grid_size
    }

    /// Partition a snapshot of items at `zoom`
    ///
    /// Items are bucketed in a single sweep; the output order depends only on the item ids.
    pub fn cluster<'a>(
        &self,
        items: impl IntoIterator<Item = &'a ClusterItem>,
        zoom: f64,
    ) -> Partition {
        #[cfg(feature = "profiling")]
        profiling::scope!("algorithm::cluster");

        let mut cells: HashMap<(i64, i64), SmallVec<[&ClusterItem; 4]>> = HashMap::new();
        for item in items {
            let cell = utils::grid_cell(&item.position, zoom, self.grid_size);
            cells.entry(cell).or_default().push(item);
        }

        let mut nodes: Vec<RenderNode> = cells
            .into_values()
            .map(|group| {
                if group.len() == 1 {
                    RenderNode::Singleton(group[0].clone())
                } else {
                    match Cluster::from_members(group.to_vec()) {
                        Some(cluster) => RenderNode::Cluster(cluster),
                        // Centroid of a non-empty point set always exists
                        None => RenderNode::Singleton(group[0].clone()),
                    }
                }
            })
            .collect();
        nodes.sort_by_cached_key(RenderNode::identity);

        Partition { zoom, nodes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{cells_per_side, lat_lon};

    fn item(id: &str, lat: f64, lon: f64) -> ClusterItem {
        ClusterItem::new(id, lat_lon(lat, lon))
    }

    /// Longitude of the middle of grid column `column` at `zoom`
    fn column_center_lon(column: f64, zoom: f64, grid_size: u32) -> f64 {
        (column + 0.5) / cells_per_side(zoom, grid_size) * 360.0 - 180.0
    }

    #[test]
    fn test_rejects_zero_grid_size() {
        assert!(GridClusterAlgorithm::new(0).is_err());
        assert!(GridClusterAlgorithm::new(1).is_ok());
    }

    #[test]
    fn test_empty_input() {
        let algorithm = GridClusterAlgorithm::new(100).unwrap();
        let partition = algorithm.cluster(std::iter::empty(), 10.0);
        assert!(partition.nodes.is_empty());
        assert_eq!(partition.cluster_count(), 0);
    }

    #[test]
    fn test_three_close_items_and_one_far() {
        // At zoom 12 with a 100px grid a cell spans ~3.8 km at the equator
        let zoom = 12.0;
        let algorithm = GridClusterAlgorithm::new(100).unwrap();
        let cells = cells_per_side(zoom, 100);
        let lon = column_center_lon((cells / 2.0).floor(), zoom, 100);

        // 0.0002 degrees is roughly 22 m
        let items = vec![
            item("a", 0.0, lon),
            item("b", 0.0002, lon),
            item("c", -0.0002, lon + 0.0002),
            item("far", 0.0, lon + 0.09), // ~10 km east
        ];
        let partition = algorithm.cluster(&items, zoom);

        assert_eq!(partition.cluster_count(), 1);
        assert_eq!(partition.singleton_count(), 1);
        let cluster = partition.clusters().next().unwrap();
        assert_eq!(cluster.members, vec!["a", "b", "c"]);
        assert!(partition.nodes.iter().any(
            |node| matches!(node, RenderNode::Singleton(item) if item.id == "far")
        ));
    }

    #[test]
    fn test_antimeridian_items_share_a_cell() {
        let algorithm = GridClusterAlgorithm::new(100).unwrap();
        let items = vec![item("east", 10.0, 180.0), item("west", 10.0, -180.0)];
        let partition = algorithm.cluster(&items, 0.0);
        assert_eq!(partition.nodes.len(), 1);
        assert_eq!(partition.cluster_count(), 1);
    }

    #[test]
    fn test_centroid_is_mean_of_members() {
        let algorithm = GridClusterAlgorithm::new(256).unwrap();
        let items = vec![item("a", 10.0, 10.0), item("b", 20.0, 30.0)];
        let partition = algorithm.cluster(&items, 0.0);
        let cluster = partition.clusters().next().unwrap();
        assert!((cluster.centroid.y() - 15.0).abs() < 1e-9);
        assert!((cluster.centroid.x() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_partition_is_order_independent() {
        let algorithm = GridClusterAlgorithm::new(100).unwrap();
        let items = vec![
            item("a", 1.0, 1.0),
            item("b", 1.0001, 1.0001),
            item("c", 40.0, 40.0),
            item("d", -30.0, 100.0),
        ];
        let mut reversed = items.clone();
        reversed.reverse();

        let first = algorithm.cluster(&items, 5.0);
        let second = algorithm.cluster(&reversed, 5.0);
        assert_eq!(first.nodes, second.nodes);
    }

    #[test]
    fn test_cluster_identity_depends_only_on_membership() {
        let members = vec!["a".to_string(), "b".to_string()];
        assert_eq!(Identity::for_members(&members), Identity::for_members(&members));
        let other = vec!["a".to_string(), "c".to_string()];
        assert_ne!(Identity::for_members(&members), Identity::for_members(&other));

        // Moving a member inside its cell keeps the identity but changes the centroid
        let algorithm = GridClusterAlgorithm::new(256).unwrap();
        let before = algorithm.cluster(&[item("a", 10.0, 10.0), item("b", 20.0, 20.0)], 0.0);
        let after = algorithm.cluster(&[item("a", 11.0, 10.0), item("b", 20.0, 20.0)], 0.0);
        assert_eq!(before.nodes[0].identity(), after.nodes[0].identity());
        assert!(before.nodes[0].needs_redraw(&after.nodes[0]));
    }

    #[test]
    fn test_cluster_z_index_is_member_max() {
        let algorithm = GridClusterAlgorithm::new(256).unwrap();
        let mut high = item("a", 10.0, 10.0);
        high.visual.z_index = 7;
        let partition = algorithm.cluster(&[high, item("b", 10.0, 10.1)], 0.0);
        assert_eq!(partition.clusters().next().unwrap().z_index, 7);
    }

    #[test]
    fn test_zooming_in_never_increases_aggregation() {
        // Evenly spaced 20x20 grid of points roughly 1 km apart
        let mut items = Vec::new();
        for row in 0..20 {
            for col in 0..20 {
                items.push(item(
                    &format!("p{row}-{col}"),
                    row as f64 * 0.01,
                    col as f64 * 0.01,
                ));
            }
        }

        let algorithm = GridClusterAlgorithm::new(100).unwrap();
        let mut previous: Option<Partition> = None;
        for zoom in 0..=18 {
            let partition = algorithm.cluster(&items, zoom as f64);
            if let Some(prev) = &previous {
                assert!(partition.clustered_item_count() <= prev.clustered_item_count());
                assert!(partition.nodes.len() >= prev.nodes.len());
            }
            previous = Some(partition);
        }

        // Fully zoomed out everything is one cluster; fully zoomed in nothing is clustered
        assert_eq!(algorithm.cluster(&items, 0.0).cluster_count(), 1);
        assert_eq!(algorithm.cluster(&items, 18.0).clustered_item_count(), 0);
    }
}
