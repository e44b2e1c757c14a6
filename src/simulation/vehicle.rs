//! Vehicle records and per-tick movement
//!
//! Movement uses a look-ahead admission check: whether a vehicle may enter
//! the upcoming intersection is decided before the progress increment that
//! would carry it across is applied.

use anyhow::{Context, Result};
use petgraph::graph::EdgeIndex;

use super::graph::{CityGraph, QueueKey};
use super::types::{NodeId, NodeKind, VehicleId, VehicleKind, SPEED_SCALE};

/// What the engine should do with a vehicle after its movement update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleUpdateResult {
    /// Still travelling along its path
    Moving,
    /// Arrived at the final node of its path this tick
    ReachedEnd,
}

/// A vehicle travelling through the city
#[derive(Debug, Clone)]
pub struct Vehicle {
    pub id: VehicleId,
    /// Display label with sequential per-category numbering, e.g. `AMB-3`
    pub label: String,
    pub kind: VehicleKind,
    /// Node the vehicle last departed from
    pub current: NodeId,
    /// Node the vehicle is heading to; `None` once the path is finished
    pub next: Option<NodeId>,
    pub destination: NodeId,
    /// Full ordered node sequence from origin to destination
    pub path: Vec<NodeId>,
    /// Index of `current` within `path`
    pub path_index: usize,
    /// Fraction of the current edge already covered, in `[0, 1)`
    pub progress: f32,
    /// Set once an emergency vehicle starts its trip back to base
    pub returning: bool,
    /// Edge the vehicle occupies, with the queue key it holds there
    current_edge: Option<(EdgeIndex, QueueKey)>,
}

impl Vehicle {
    pub(crate) fn new(
        id: VehicleId,
        label: String,
        kind: VehicleKind,
        path: Vec<NodeId>,
    ) -> Option<Self> {
        let &current = path.first()?;
        let &destination = path.last()?;

        Some(Self {
            id,
            label,
            kind,
            current,
            next: path.get(1).copied(),
            destination,
            path,
            path_index: 0,
            progress: 0.0,
            returning: false,
            current_edge: None,
        })
    }

    /// Register this vehicle on the edge between `current` and `next` with
    /// a fresh entry sequence. Harmless when no such edge exists; the
    /// vehicle then travels unqueued, as on bus-route shortcuts.
    pub(crate) fn enter_current_edge(&mut self, graph: &mut CityGraph) {
        self.current_edge = None;
        if let Some(next) = self.next {
            if let Some(edge) = graph.edge_between(self.current, next) {
                self.current_edge = graph
                    .enqueue(edge, self.kind.priority(), self.id)
                    .map(|key| (edge, key));
            }
        }
    }

    pub(crate) fn leave_current_edge(&mut self, graph: &mut CityGraph) {
        if let Some((edge, key)) = self.current_edge.take() {
            graph.dequeue(edge, key);
        }
    }

    /// True when no other vehicle precedes this one on its current edge:
    /// either the vehicle is absent from the queue or it is the minimum
    /// (priority rank, entry sequence) entry.
    fn is_queue_head(&self, graph: &CityGraph) -> bool {
        match self.current_edge {
            Some((edge, _)) => graph
                .edge(edge)
                .and_then(|road| road.head())
                .map_or(true, |head| head == self.id),
            None => true,
        }
    }

    /// One tick of movement. Returns `ReachedEnd` when the vehicle crossed
    /// the final segment of its path; end-of-path handling belongs to the
    /// engine.
    pub(crate) fn advance(&mut self, graph: &mut CityGraph) -> Result<VehicleUpdateResult> {
        let Some(next_id) = self.next else {
            // Single-node path: already at the destination.
            return Ok(VehicleUpdateResult::ReachedEnd);
        };

        let current_pos = graph
            .node(self.current)
            .with_context(|| format!("current node {} missing", self.current))?
            .position;

        let (next_pos, next_is_intersection, light_allows) = {
            let node = graph
                .node(next_id)
                .with_context(|| format!("next node {next_id} missing"))?;
            let allows = node
                .light
                .as_ref()
                .map_or(true, |light| light.can_pass(current_pos, node.position));
            (node.position, node.kind == NodeKind::Intersection, allows)
        };

        let distance = current_pos.distance(&next_pos).max(1.0);
        let increment = self.kind.base_speed() * SPEED_SCALE / distance;

        // Look-ahead: decide admission before crossing into an intersection.
        if self.progress + increment >= 1.0 && next_is_intersection {
            let head_of_queue = self.is_queue_head(graph);

            // Emergency vehicles ignore the light but still respect the
            // ordering of their own edge's queue.
            let admitted = if self.kind.is_emergency() {
                head_of_queue
            } else {
                light_allows && head_of_queue
            };

            if !admitted {
                return Ok(VehicleUpdateResult::Moving);
            }
        }

        self.progress += increment;

        if self.progress >= 1.0 {
            self.progress = 0.0;
            self.leave_current_edge(graph);
            self.path_index += 1;

            if self.path_index + 1 >= self.path.len() {
                self.current = next_id;
                self.next = None;
                return Ok(VehicleUpdateResult::ReachedEnd);
            }

            self.current = self.path[self.path_index];
            self.next = Some(self.path[self.path_index + 1]);
            self.enter_current_edge(graph);
        }

        Ok(VehicleUpdateResult::Moving)
    }
}
