//! Graph, pathfinding and traffic-light behavior
//!
//! These tests exercise the routing layer directly: dynamic edge weights,
//! congestion-aware path selection and the adaptive light policy.

use city_traffic::simulation::{
    CityGraph, LightPhase, NodeId, NodeKind, Position, TrafficLight, VehicleId,
    CONGESTION_PENALTY, MAX_DURATION, MIN_DURATION,
};

/// Three nodes in a line: 1 -> 2 -> 3 with base weights 10 and 15
fn line_graph() -> CityGraph {
    let mut graph = CityGraph::new();
    graph.add_node(NodeId(1), "A", NodeKind::Apartment, Position::new(0.0, 0.0));
    graph.add_node(NodeId(2), "B", NodeKind::Apartment, Position::new(100.0, 0.0));
    graph.add_node(NodeId(3), "C", NodeKind::Apartment, Position::new(200.0, 0.0));
    graph.add_edge(NodeId(1), NodeId(2), 10.0);
    graph.add_edge(NodeId(2), NodeId(3), 15.0);
    graph
}

#[test]
fn shortest_path_follows_base_weights() {
    let graph = line_graph();

    let path = graph
        .find_path(NodeId(1), NodeId(3))
        .expect("path should exist");
    assert_eq!(path, vec![NodeId(1), NodeId(2), NodeId(3)]);
    assert_eq!(graph.path_cost(&path), Some(25.0));
}

#[test]
fn path_to_self_is_single_node() {
    let graph = line_graph();
    assert_eq!(graph.find_path(NodeId(2), NodeId(2)), Some(vec![NodeId(2)]));
}

#[test]
fn disconnected_nodes_have_no_path() {
    let mut graph = line_graph();
    graph.add_node(NodeId(9), "ISLAND", NodeKind::Parking, Position::new(500.0, 500.0));

    assert!(graph.find_path(NodeId(1), NodeId(9)).is_none());
    // Edges are directed: 3 cannot reach 1 either.
    assert!(graph.find_path(NodeId(3), NodeId(1)).is_none());
}

#[test]
fn unknown_endpoints_have_no_path() {
    let graph = line_graph();
    assert!(graph.find_path(NodeId(1), NodeId(42)).is_none());
    assert!(graph.find_path(NodeId(42), NodeId(1)).is_none());
}

#[test]
fn edge_with_unknown_endpoint_is_skipped() {
    let mut graph = line_graph();
    let roads_before = graph.road_count();

    graph.add_edge(NodeId(1), NodeId(99), 1.0);
    graph.add_edge(NodeId(99), NodeId(1), 1.0);

    assert_eq!(graph.road_count(), roads_before);
    assert!(graph.edge_between(NodeId(1), NodeId(99)).is_none());
}

#[test]
fn dynamic_weight_tracks_queue_length() {
    let mut graph = line_graph();
    let edge = graph
        .edge_between(NodeId(1), NodeId(2))
        .expect("edge should exist");

    assert_eq!(graph.edge(edge).unwrap().current_weight(), 10.0);

    for (priority, serial) in [(5, 1), (5, 2), (1, 3)] {
        assert!(graph.enqueue(edge, priority, VehicleId(serial)).is_some());
    }

    let road = graph.edge(edge).unwrap();
    assert_eq!(road.queue_len(), 3);
    assert_eq!(road.current_weight(), 10.0 + 3.0 * CONGESTION_PENALTY);

    // The emergency entry jumps the queue despite entering last.
    assert_eq!(road.head(), Some(VehicleId(3)));
}

#[test]
fn congestion_shifts_route_choice() {
    // Two routes from 1 to 4: via 2 (cost 4) and via 3 (cost 5).
    let mut graph = CityGraph::new();
    for (id, x) in [(1, 0.0), (2, 100.0), (3, 100.0), (4, 200.0)] {
        graph.add_node(
            NodeId(id),
            &format!("N{id}"),
            NodeKind::Apartment,
            Position::new(x, 0.0),
        );
    }
    graph.add_edge(NodeId(1), NodeId(2), 2.0);
    graph.add_edge(NodeId(2), NodeId(4), 2.0);
    graph.add_edge(NodeId(1), NodeId(3), 2.5);
    graph.add_edge(NodeId(3), NodeId(4), 2.5);

    let quiet = graph.find_path(NodeId(1), NodeId(4)).unwrap();
    assert_eq!(quiet, vec![NodeId(1), NodeId(2), NodeId(4)]);

    // Three queued vehicles add 1.5 to the cheap route, tipping the choice.
    let edge = graph.edge_between(NodeId(1), NodeId(2)).unwrap();
    for serial in 1..=3 {
        assert!(graph.enqueue(edge, 5, VehicleId(serial)).is_some());
    }

    let congested = graph.find_path(NodeId(1), NodeId(4)).unwrap();
    assert_eq!(congested, vec![NodeId(1), NodeId(3), NodeId(4)]);
}

#[test]
fn light_alternates_within_duration_bounds() {
    let mut light = TrafficLight::new();
    let mut intervals = Vec::new();
    let mut since_flip = 0u32;

    for _ in 0..2000 {
        since_flip += 1;
        if light.update(3, 3) {
            intervals.push(since_flip);
            since_flip = 0;
        }
    }

    assert!(intervals.len() > 2, "light never alternated");
    for interval in intervals {
        assert!(
            (MIN_DURATION..=MAX_DURATION).contains(&interval),
            "flip interval {interval} outside [{MIN_DURATION}, {MAX_DURATION}]"
        );
    }
}

#[test]
fn starved_green_collapses_to_min_duration() {
    let mut light = TrafficLight::new();
    assert_eq!(light.phase, LightPhase::NorthSouthGreen);

    // Nothing approaches north-south while east-west has demand.
    let mut ticks = 0;
    while !light.update(0, 5) {
        ticks += 1;
        assert!(ticks < MAX_DURATION, "light never flipped");
    }

    assert_eq!(ticks + 1, MIN_DURATION);
    assert_eq!(light.phase, LightPhase::EastWestGreen);
}

#[test]
fn dominant_green_extends_to_max_duration() {
    let mut light = TrafficLight::new();

    let mut ticks = 0;
    while !light.update(10, 1) {
        ticks += 1;
        assert!(ticks < 2 * MAX_DURATION, "light never flipped");
    }

    assert_eq!(ticks + 1, MAX_DURATION);
}

#[test]
fn can_pass_follows_approach_axis() {
    let mut light = TrafficLight::new();
    let intersection = Position::new(100.0, 100.0);
    let from_north = Position::new(100.0, 0.0);
    let from_west = Position::new(0.0, 100.0);

    // North-south green: vertical approaches pass, horizontal ones wait.
    assert!(light.can_pass(from_north, intersection));
    assert!(!light.can_pass(from_west, intersection));

    while !light.update(0, 1) {}

    assert_eq!(light.phase, LightPhase::EastWestGreen);
    assert!(!light.can_pass(from_north, intersection));
    assert!(light.can_pass(from_west, intersection));
}
