//! Graph traversal.
//!
//! Stateless breadth-first and depth-first walks over the relationship and
//! entity stores. Cycles are handled with visited sets: BFS marks nodes on
//! enqueue, and path enumeration keeps an on-path set so a node never
//! repeats within a single path.

use crate::models::{
    Direction, Entity, EntityId, EntityType, Relationship, RelationshipFilter, RelationshipId,
    RelationshipType,
};
use crate::storage::{EntityStore, RelationshipStore};
use crate::Result;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::instrument;

/// Options for neighborhood expansion.
#[derive(Debug, Clone)]
pub struct NeighborhoodOptions {
    /// Maximum hops from the seed.
    pub max_depth: u32,
    /// Edge direction to follow.
    pub direction: Direction,
    /// Restrict to these edge types.
    pub types: Option<Vec<RelationshipType>>,
    /// Minimum edge weight.
    pub min_weight: Option<f32>,
}

impl Default for NeighborhoodOptions {
    fn default() -> Self {
        Self {
            max_depth: 2,
            direction: Direction::Both,
            types: None,
            min_weight: None,
        }
    }
}

/// Options for reachability walks.
#[derive(Debug, Clone)]
pub struct ReachableOptions {
    /// Maximum hops; `None` walks until exhaustion.
    pub max_depth: Option<u32>,
    /// Edge direction to follow.
    pub direction: Direction,
    /// Restrict to these edge types.
    pub types: Option<Vec<RelationshipType>>,
}

impl Default for ReachableOptions {
    fn default() -> Self {
        Self {
            max_depth: None,
            direction: Direction::Out,
            types: None,
        }
    }
}

/// A neighborhood: the entities and deduplicated edges reached from a seed.
///
/// Ordering within `relationships` is not guaranteed.
#[derive(Debug, Clone, Default)]
pub struct Neighborhood {
    /// Entities reached (seed included when it exists).
    pub entities: Vec<Entity>,
    /// Edges traversed, deduplicated by id.
    pub relationships: Vec<Relationship>,
}

/// A path through the graph.
#[derive(Debug, Clone)]
pub struct GraphPath {
    /// Node ids in path order, endpoints included.
    pub nodes: Vec<EntityId>,
    /// Edges in path order; `edges.len() == nodes.len() - 1`.
    pub edges: Vec<Relationship>,
    /// Sum of edge weights.
    pub total_weight: f32,
    /// Hop count: `nodes.len() - 1`.
    pub length: usize,
}

/// Aggregate statistics over the project graph.
#[derive(Debug, Clone, Default)]
pub struct GraphStatistics {
    /// Total entities.
    pub entity_count: usize,
    /// Total edges.
    pub relationship_count: usize,
    /// `2·|E| / |V_touched|`.
    pub average_degree: f64,
    /// Edge counts by type.
    pub relationships_by_type: HashMap<RelationshipType, usize>,
    /// Ten highest-degree entities.
    pub top_connected_entities: Vec<(EntityId, usize)>,
}

/// Stateless traversal over the entity and relationship stores.
pub struct GraphTraversal {
    entities: Arc<EntityStore>,
    relationships: Arc<RelationshipStore>,
}

impl GraphTraversal {
    /// Creates a traversal over the given stores.
    #[must_use]
    pub const fn new(entities: Arc<EntityStore>, relationships: Arc<RelationshipStore>) -> Self {
        Self {
            entities,
            relationships,
        }
    }

    fn edge_filter(
        types: Option<&[RelationshipType]>,
        min_weight: Option<f32>,
    ) -> RelationshipFilter {
        RelationshipFilter {
            types: types.map(<[RelationshipType]>::to_vec),
            min_weight,
            limit: None,
        }
    }

    /// BFS neighborhood around `seed`, up to `max_depth` hops.
    ///
    /// Entities are hydrated by id after the walk; unknown ids (dangling
    /// edges) are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a store operation fails.
    #[instrument(skip(self, options), fields(seed = %seed))]
    pub fn get_neighborhood(
        &self,
        seed: &EntityId,
        options: &NeighborhoodOptions,
    ) -> Result<Neighborhood> {
        let filter = Self::edge_filter(options.types.as_deref(), options.min_weight);
        let mut visited: HashSet<EntityId> = HashSet::from([seed.clone()]);
        let mut seen_edges: HashSet<RelationshipId> = HashSet::new();
        let mut edges: Vec<Relationship> = Vec::new();
        let mut queue: VecDeque<(EntityId, u32)> = VecDeque::from([(seed.clone(), 0)]);

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= options.max_depth {
                continue;
            }
            for edge in self
                .relationships
                .get_for_entity(&current, options.direction, &filter)?
            {
                if seen_edges.insert(edge.id.clone()) {
                    edges.push(edge.clone());
                }
                if let Some(neighbor) = edge.other_endpoint(&current)
                    && !visited.contains(neighbor)
                {
                    visited.insert(neighbor.clone());
                    queue.push_back((neighbor.clone(), depth + 1));
                }
            }
        }

        let ids: Vec<EntityId> = visited.into_iter().collect();
        Ok(Neighborhood {
            entities: self.entities.get_many(&ids)?,
            relationships: edges,
        })
    }

    /// Shortest path from `from` to `to` along outgoing edges.
    ///
    /// BFS marks nodes on enqueue; ties resolve to the first path the walk
    /// discovers. Returns `None` when `to` is unreachable.
    ///
    /// # Errors
    ///
    /// Returns an error if a store operation fails.
    #[instrument(skip(self, types), fields(from = %from, to = %to))]
    pub fn find_shortest_path(
        &self,
        from: &EntityId,
        to: &EntityId,
        types: Option<&[RelationshipType]>,
    ) -> Result<Option<GraphPath>> {
        if from == to {
            return Ok(Some(GraphPath {
                nodes: vec![from.clone()],
                edges: Vec::new(),
                total_weight: 0.0,
                length: 0,
            }));
        }

        let filter = Self::edge_filter(types, None);
        let mut parents: HashMap<EntityId, (EntityId, Relationship)> = HashMap::new();
        let mut visited: HashSet<EntityId> = HashSet::from([from.clone()]);
        let mut queue: VecDeque<EntityId> = VecDeque::from([from.clone()]);

        'walk: while let Some(current) = queue.pop_front() {
            for edge in self
                .relationships
                .get_for_entity(&current, Direction::Out, &filter)?
            {
                let neighbor = edge.target_id.clone();
                if visited.contains(&neighbor) {
                    continue;
                }
                visited.insert(neighbor.clone());
                parents.insert(neighbor.clone(), (current.clone(), edge));
                if neighbor == *to {
                    break 'walk;
                }
                queue.push_back(neighbor);
            }
        }

        if !parents.contains_key(to) {
            return Ok(None);
        }

        // Reconstruct from the target backwards.
        let mut nodes = vec![to.clone()];
        let mut edges = Vec::new();
        let mut cursor = to.clone();
        while let Some((prev, edge)) = parents.get(&cursor) {
            edges.push(edge.clone());
            nodes.push(prev.clone());
            cursor = prev.clone();
        }
        nodes.reverse();
        edges.reverse();

        let total_weight = edges.iter().map(|e| e.weight).sum();
        let length = nodes.len() - 1;
        Ok(Some(GraphPath {
            nodes,
            edges,
            total_weight,
            length,
        }))
    }

    /// Enumerates up to the ten shortest paths from `from` to `to`.
    ///
    /// DFS with an on-path visited set; results sort by length ascending,
    /// then total weight ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if a store operation fails.
    #[instrument(skip(self, types), fields(from = %from, to = %to))]
    pub fn find_paths(
        &self,
        from: &EntityId,
        to: &EntityId,
        max_depth: u32,
        types: Option<&[RelationshipType]>,
    ) -> Result<Vec<GraphPath>> {
        let filter = Self::edge_filter(types, None);
        let mut paths: Vec<GraphPath> = Vec::new();
        let mut on_path: HashSet<EntityId> = HashSet::from([from.clone()]);
        let mut node_stack = vec![from.clone()];
        let mut edge_stack: Vec<Relationship> = Vec::new();

        self.dfs_paths(
            from,
            to,
            max_depth,
            &filter,
            &mut on_path,
            &mut node_stack,
            &mut edge_stack,
            &mut paths,
        )?;

        paths.sort_by(|a, b| {
            a.length.cmp(&b.length).then_with(|| {
                a.total_weight
                    .partial_cmp(&b.total_weight)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        });
        paths.truncate(10);
        Ok(paths)
    }

    #[allow(clippy::too_many_arguments)]
    fn dfs_paths(
        &self,
        current: &EntityId,
        to: &EntityId,
        remaining: u32,
        filter: &RelationshipFilter,
        on_path: &mut HashSet<EntityId>,
        node_stack: &mut Vec<EntityId>,
        edge_stack: &mut Vec<Relationship>,
        paths: &mut Vec<GraphPath>,
    ) -> Result<()> {
        if current == to {
            let nodes = node_stack.clone();
            let edges = edge_stack.clone();
            let total_weight = edges.iter().map(|e| e.weight).sum();
            let length = nodes.len() - 1;
            paths.push(GraphPath {
                nodes,
                edges,
                total_weight,
                length,
            });
            return Ok(());
        }
        if remaining == 0 {
            return Ok(());
        }

        for edge in self
            .relationships
            .get_for_entity(current, Direction::Out, filter)?
        {
            let neighbor = edge.target_id.clone();
            if on_path.contains(&neighbor) {
                continue;
            }
            on_path.insert(neighbor.clone());
            node_stack.push(neighbor.clone());
            edge_stack.push(edge);

            self.dfs_paths(
                &neighbor, to, remaining - 1, filter, on_path, node_stack, edge_stack, paths,
            )?;

            edge_stack.pop();
            node_stack.pop();
            on_path.remove(&neighbor);
        }
        Ok(())
    }

    /// Every entity reachable from `seed`, excluding the seed itself.
    ///
    /// # Errors
    ///
    /// Returns an error if a store operation fails.
    #[instrument(skip(self, options), fields(seed = %seed))]
    pub fn get_reachable(
        &self,
        seed: &EntityId,
        options: &ReachableOptions,
    ) -> Result<Vec<EntityId>> {
        let filter = Self::edge_filter(options.types.as_deref(), None);
        let mut visited: HashSet<EntityId> = HashSet::from([seed.clone()]);
        let mut order: Vec<EntityId> = Vec::new();
        let mut queue: VecDeque<(EntityId, u32)> = VecDeque::from([(seed.clone(), 0)]);

        while let Some((current, depth)) = queue.pop_front() {
            if options.max_depth.is_some_and(|max| depth >= max) {
                continue;
            }
            for edge in self
                .relationships
                .get_for_entity(&current, options.direction, &filter)?
            {
                if let Some(neighbor) = edge.other_endpoint(&current)
                    && !visited.contains(neighbor)
                {
                    visited.insert(neighbor.clone());
                    order.push(neighbor.clone());
                    queue.push_back((neighbor.clone(), depth + 1));
                }
            }
        }
        Ok(order)
    }

    /// Entities that depend on `id`: reachability along incoming edges.
    ///
    /// # Errors
    ///
    /// Returns an error if a store operation fails.
    pub fn get_dependents(&self, id: &EntityId, depth: Option<u32>) -> Result<Vec<EntityId>> {
        self.get_reachable(
            id,
            &ReachableOptions {
                max_depth: depth,
                direction: Direction::In,
                types: None,
            },
        )
    }

    /// Entities that `id` depends on: reachability along outgoing edges.
    ///
    /// # Errors
    ///
    /// Returns an error if a store operation fails.
    pub fn get_dependencies(&self, id: &EntityId, depth: Option<u32>) -> Result<Vec<EntityId>> {
        self.get_reachable(
            id,
            &ReachableOptions {
                max_depth: depth,
                direction: Direction::Out,
                types: None,
            },
        )
    }

    /// Intersection of the one-hop both-direction neighborhoods of `a`
    /// and `b`, hydrated.
    ///
    /// # Errors
    ///
    /// Returns an error if a store operation fails.
    pub fn find_common_neighbors(&self, a: &EntityId, b: &EntityId) -> Result<Vec<Entity>> {
        let one_hop = ReachableOptions {
            max_depth: Some(1),
            direction: Direction::Both,
            types: None,
        };
        let neighbors_a: HashSet<EntityId> = self.get_reachable(a, &one_hop)?.into_iter().collect();
        let neighbors_b: HashSet<EntityId> = self.get_reachable(b, &one_hop)?.into_iter().collect();

        let mut common: Vec<EntityId> = neighbors_a.intersection(&neighbors_b).cloned().collect();
        common.sort();
        self.entities.get_many(&common)
    }

    /// Subgraph induced by the listed entity types: only edges with **both**
    /// endpoints inside the node set are included.
    ///
    /// # Errors
    ///
    /// Returns an error if a store operation fails.
    #[instrument(skip(self, entity_types, relationship_types))]
    pub fn get_subgraph_by_entity_types(
        &self,
        entity_types: &[EntityType],
        relationship_types: Option<&[RelationshipType]>,
    ) -> Result<Neighborhood> {
        let entities = self.entities.list_by_types(entity_types)?;
        let node_ids: HashSet<&str> = entities.iter().map(|e| e.id.as_str()).collect();

        let candidate_types: Vec<RelationshipType> = relationship_types
            .map_or_else(|| RelationshipType::all().to_vec(), <[RelationshipType]>::to_vec);

        let mut relationships = Vec::new();
        for ty in candidate_types {
            for edge in self.relationships.get_by_type(ty, None)? {
                if node_ids.contains(edge.source_id.as_str())
                    && node_ids.contains(edge.target_id.as_str())
                {
                    relationships.push(edge);
                }
            }
        }

        Ok(Neighborhood {
            entities,
            relationships,
        })
    }

    /// Aggregate graph statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if a store operation fails.
    pub fn get_statistics(&self) -> Result<GraphStatistics> {
        Ok(GraphStatistics {
            entity_count: self.entities.count()?,
            relationship_count: self.relationships.count(None)?,
            average_degree: self.relationships.average_degree()?,
            relationships_by_type: self.relationships.stats_by_type()?,
            top_connected_entities: self.relationships.most_connected(10)?,
        })
    }
}
