//! Standalone traffic simulation core
//!
//! This module contains all the simulation logic: the city graph, the
//! congestion-aware pathfinder, the adaptive traffic lights and the tick
//! engine. It runs headless and can be driven from the console or from an
//! external rendering collaborator.

mod engine;
mod graph;
mod traffic_light;
mod types;
mod vehicle;

// Re-export public types for external use
pub use engine::{
    NodeSnapshot, Session, SimEngine, VehicleSnapshot, AMBIENT_PERIOD_TICKS,
    BUS_WAVE_DELAY_TICKS, EMERGENCY_DISPATCH_CYCLE, INITIAL_CAR_TRIPS, TICK_INTERVAL_MS,
};
pub use graph::{ApproachLoads, CityGraph, Node, RoadEdge};
pub use traffic_light::{
    LightPhase, TrafficLight, DEFAULT_DURATION, LOAD_MARGIN, MAX_DURATION, MIN_DURATION,
};
pub use types::{
    NodeId, NodeKind, Position, UserRole, VehicleId, VehicleKind, CONGESTION_PENALTY,
    EMERGENCY_PRIORITY_CUTOFF, SPEED_SCALE,
};
