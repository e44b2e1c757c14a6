//! City road graph: nodes, directed weighted edges and per-edge queues
//!
//! Topology is fixed after construction; only the edge queues mutate at
//! runtime. Nodes and edges live in id-indexed tables and every
//! cross-reference is an id or a graph index, never an owning pointer.

use log::warn;
use ordered_float::OrderedFloat;
use petgraph::algo::astar;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeMap, HashMap};

use super::traffic_light::TrafficLight;
use super::types::{NodeId, NodeKind, Position, VehicleId, CONGESTION_PENALTY};

/// Queue ordering key: emergency priority rank first, then entry order
pub type QueueKey = (u8, u64);

/// A node in the city graph
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub position: Position,
    /// Present iff the node is an intersection
    pub light: Option<TrafficLight>,
}

/// A directed road segment
///
/// The queue holds the vehicles currently traversing the edge, ordered by
/// (priority rank, entry sequence). Its length feeds the dynamic routing
/// weight.
#[derive(Debug, Clone)]
pub struct RoadEdge {
    pub base_weight: f32,
    queue: BTreeMap<QueueKey, VehicleId>,
}

impl RoadEdge {
    fn new(base_weight: f32) -> Self {
        Self {
            base_weight,
            queue: BTreeMap::new(),
        }
    }

    /// Dynamic routing weight: congestion adds to the physical cost.
    pub fn current_weight(&self) -> f32 {
        self.base_weight + self.queue.len() as f32 * CONGESTION_PENALTY
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// The vehicle currently first in line on this edge
    pub fn head(&self) -> Option<VehicleId> {
        self.queue.first_key_value().map(|(_, vehicle)| *vehicle)
    }

    /// Queued vehicles in service order
    pub fn queued_vehicles(&self) -> impl Iterator<Item = VehicleId> + '_ {
        self.queue.values().copied()
    }
}

/// Per-orientation vehicle load approaching an intersection
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproachLoads {
    pub north_south: usize,
    pub east_west: usize,
}

/// The city road network
#[derive(Default)]
pub struct CityGraph {
    graph: DiGraph<NodeId, RoadEdge>,
    nodes: HashMap<NodeId, Node>,
    node_to_index: HashMap<NodeId, NodeIndex>,
    edge_lookup: HashMap<(NodeId, NodeId), EdgeIndex>,
    next_entry_seq: u64,
}

impl CityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Intersections get a traffic light.
    pub fn add_node(&mut self, id: NodeId, name: &str, kind: NodeKind, position: Position) {
        if self.nodes.contains_key(&id) {
            warn!("node {id} already exists, ignoring duplicate");
            return;
        }

        let index = self.graph.add_node(id);
        self.node_to_index.insert(id, index);

        let light = (kind == NodeKind::Intersection).then(TrafficLight::new);
        self.nodes.insert(
            id,
            Node {
                id,
                name: name.to_string(),
                kind,
                position,
                light,
            },
        );
    }

    /// Add a directed edge. Unknown endpoints are logged and skipped
    /// rather than aborting graph construction.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, base_weight: f32) {
        let (Some(&start), Some(&end)) =
            (self.node_to_index.get(&from), self.node_to_index.get(&to))
        else {
            warn!("edge {from} -> {to} references an unknown node, skipping");
            return;
        };

        let edge = self.graph.add_edge(start, end, RoadEdge::new(base_weight));
        self.edge_lookup.insert((from, to), edge);
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn road_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All directed road links as (from, to) pairs
    pub fn road_links(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.edge_lookup.keys().copied()
    }

    /// Edge lookup by endpoint pair
    pub fn edge_between(&self, from: NodeId, to: NodeId) -> Option<EdgeIndex> {
        self.edge_lookup.get(&(from, to)).copied()
    }

    pub fn edge(&self, edge: EdgeIndex) -> Option<&RoadEdge> {
        self.graph.edge_weight(edge)
    }

    /// Queued vehicles on the edge between two nodes, in service order
    pub fn queue_of(&self, from: NodeId, to: NodeId) -> Vec<VehicleId> {
        self.edge_between(from, to)
            .and_then(|edge| self.edge(edge))
            .map(|road| road.queued_vehicles().collect())
            .unwrap_or_default()
    }

    /// Enqueue a vehicle on an edge with a fresh entry sequence number.
    /// Returns the queue key the vehicle now occupies.
    pub fn enqueue(&mut self, edge: EdgeIndex, priority: u8, vehicle: VehicleId) -> Option<QueueKey> {
        let road = self.graph.edge_weight_mut(edge)?;
        let key = (priority, self.next_entry_seq);
        self.next_entry_seq += 1;
        road.queue.insert(key, vehicle);
        Some(key)
    }

    pub fn dequeue(&mut self, edge: EdgeIndex, key: QueueKey) {
        if let Some(road) = self.graph.edge_weight_mut(edge) {
            road.queue.remove(&key);
        }
    }

    /// Empty every edge queue (traffic reset)
    pub fn clear_queues(&mut self) {
        for road in self.graph.edge_weights_mut() {
            road.queue.clear();
        }
    }

    pub fn total_queued(&self) -> usize {
        self.graph.edge_weights().map(RoadEdge::queue_len).sum()
    }

    /// Sum queued vehicles on incoming edges by approach orientation.
    /// An approach is vertical when its coordinate delta is taller than
    /// it is wide.
    pub fn approach_loads(&self, intersection: NodeId) -> ApproachLoads {
        let mut loads = ApproachLoads::default();

        let (Some(&index), Some(target)) = (
            self.node_to_index.get(&intersection),
            self.nodes.get(&intersection),
        ) else {
            return loads;
        };

        for edge in self.graph.edges_directed(index, Direction::Incoming) {
            let from_id = self.graph[edge.source()];
            let Some(from) = self.nodes.get(&from_id) else {
                continue;
            };

            let vertical = (from.position.y - target.position.y).abs()
                > (from.position.x - target.position.x).abs();
            if vertical {
                loads.north_south += edge.weight().queue_len();
            } else {
                loads.east_west += edge.weight().queue_len();
            }
        }

        loads
    }

    /// Congestion-aware shortest path (Dijkstra via A* with a null
    /// heuristic). Edge weights are re-read at call time, so every
    /// invocation observes the current queue lengths; results are never
    /// cached.
    pub fn find_path(&self, start: NodeId, end: NodeId) -> Option<Vec<NodeId>> {
        let &start_index = self.node_to_index.get(&start)?;
        let &end_index = self.node_to_index.get(&end)?;

        let (_, indices) = astar(
            &self.graph,
            start_index,
            |node| node == end_index,
            |edge| OrderedFloat(edge.weight().current_weight()),
            |_| OrderedFloat(0.0),
        )?;

        Some(indices.into_iter().map(|index| self.graph[index]).collect())
    }

    /// Total dynamic weight of a node path against current congestion
    pub fn path_cost(&self, path: &[NodeId]) -> Option<f32> {
        let mut total = 0.0;
        for pair in path.windows(2) {
            let edge = self.edge_between(pair[0], pair[1])?;
            total += self.edge(edge)?.current_weight();
        }
        Some(total)
    }

    /// The fixed city map: a 6x3 intersection grid with apartments,
    /// parking lots and emergency stations scattered around it.
    pub fn city_map() -> Self {
        let mut graph = Self::new();

        // 18 intersections on a 6-column grid
        let (start_x, start_y, gap) = (100.0, 100.0, 120.0);
        for i in 1..=18u32 {
            let row = (i - 1) / 6;
            let col = (i - 1) % 6;
            graph.add_node(
                NodeId(i),
                &format!("INTR{i}"),
                NodeKind::Intersection,
                Position::new(start_x + col as f32 * gap, start_y + row as f32 * gap),
            );
        }

        // Apartments scattered around the grid
        let apartment_coords = [
            (50.0, 50.0),
            (300.0, 50.0),
            (500.0, 50.0),
            (700.0, 50.0),
            (850.0, 150.0),
            (850.0, 300.0),
            (850.0, 450.0),
            (700.0, 550.0),
            (500.0, 550.0),
            (300.0, 550.0),
            (50.0, 550.0),
            (50.0, 400.0),
            (50.0, 250.0),
            (200.0, 200.0),
            (600.0, 200.0),
        ];
        for (i, &(x, y)) in apartment_coords.iter().enumerate() {
            graph.add_node(
                NodeId(51 + i as u32),
                &format!("APT{}", i + 1),
                NodeKind::Apartment,
                Position::new(x, y),
            );
        }

        graph.add_node(NodeId(71), "P1", NodeKind::Parking, Position::new(200.0, 80.0));
        graph.add_node(NodeId(72), "P2", NodeKind::Parking, Position::new(800.0, 400.0));
        graph.add_node(NodeId(73), "P3", NodeKind::Parking, Position::new(400.0, 350.0));
        graph.add_node(NodeId(81), "POLICE", NodeKind::Police, Position::new(650.0, 150.0));
        graph.add_node(NodeId(82), "HOSP", NodeKind::Hospital, Position::new(750.0, 150.0));
        graph.add_node(NodeId(83), "FIRE", NodeKind::FireStation, Position::new(400.0, 150.0));

        // Directed links between intersections
        const INTERSECTION_LINKS: [(u32, u32, f32); 42] = [
            (1, 2, 2.7),
            (1, 6, 0.9),
            (1, 16, 1.5),
            (2, 1, 2.7),
            (2, 4, 2.8),
            (2, 16, 3.1),
            (3, 4, 3.0),
            (4, 2, 2.8),
            (4, 3, 3.0),
            (4, 5, 1.6),
            (4, 9, 1.5),
            (5, 4, 1.6),
            (5, 6, 1.6),
            (6, 5, 1.6),
            (6, 7, 1.6),
            (6, 1, 0.9),
            (7, 6, 1.6),
            (7, 8, 0.4),
            (7, 17, 0.9),
            (8, 7, 0.4),
            (8, 9, 4.0),
            (8, 10, 1.4),
            (9, 4, 1.5),
            (9, 8, 4.0),
            (10, 8, 1.4),
            (11, 12, 5.0),
            (12, 11, 5.0),
            (12, 13, 1.7),
            (13, 12, 1.7),
            (13, 14, 1.4),
            (14, 13, 1.4),
            (14, 17, 2.6),
            (14, 15, 1.5),
            (15, 16, 1.1),
            (15, 14, 1.5),
            (16, 1, 1.5),
            (16, 2, 3.1),
            (16, 15, 1.1),
            (17, 7, 0.9),
            (17, 18, 1.3),
            (17, 14, 2.6),
            (18, 17, 1.3),
        ];
        for (from, to, weight) in INTERSECTION_LINKS {
            graph.add_edge(NodeId(from), NodeId(to), weight);
        }

        // Each apartment connects both ways to its matching intersection
        for i in 1..=15u32 {
            graph.add_edge(NodeId(50 + i), NodeId(i), 0.5);
            graph.add_edge(NodeId(i), NodeId(50 + i), 0.5);
        }

        // Parking lots and emergency stations
        const SERVICE_LINKS: [(u32, u32, f32); 7] = [
            (71, 2, 0.5),
            (72, 18, 0.5),
            (73, 9, 0.2),
            (81, 6, 0.5),
            (82, 10, 0.5),
            (82, 11, 1.5),
            (83, 3, 0.5),
        ];
        for (a, b, weight) in SERVICE_LINKS {
            graph.add_edge(NodeId(a), NodeId(b), weight);
            graph.add_edge(NodeId(b), NodeId(a), weight);
        }

        graph
    }
}
