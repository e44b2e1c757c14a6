//! Simulation engine: tick loop, arbitration and traffic scheduling
//!
//! The engine owns the vehicle collection and the city graph. One call to
//! [`SimEngine::tick`] advances scheduled spawn tasks, every vehicle and
//! every traffic light. External collaborators drive it through the spawn
//! and session API and read pull-based state snapshots; a real-time runner
//! supplies the pacing (one tick every [`TICK_INTERVAL_MS`]).

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::Rng;
use rand::SeedableRng;
use std::collections::HashMap;

use super::graph::CityGraph;
use super::traffic_light::LightPhase;
use super::types::{NodeId, NodeKind, Position, UserRole, VehicleId, VehicleKind};
use super::vehicle::{Vehicle, VehicleUpdateResult};

/// Suggested wall-clock interval between ticks for real-time drivers
pub const TICK_INTERVAL_MS: u64 = 50;

/// Ticks between scheduled bus waves (25 s at the 50 ms tick)
pub const BUS_WAVE_DELAY_TICKS: u64 = 500;

/// Ticks between ambient car spawns (1 s at the 50 ms tick)
pub const AMBIENT_PERIOD_TICKS: u64 = 20;

/// Every Nth ambient cycle also dispatches one of each emergency type
pub const EMERGENCY_DISPATCH_CYCLE: u64 = 10;

/// Random car trips seeded by [`SimEngine::initialize_traffic`]
pub const INITIAL_CAR_TRIPS: usize = 20;

/// The three fixed bus loop routes through the city map
const BUS_ROUTES: [&[u32]; 3] = [
    &[71, 2, 16, 15, 14, 17, 7, 8, 9, 4, 3, 4, 2, 71],
    &[72, 18, 17, 14, 15, 16, 1, 6, 5, 4, 9, 8, 7, 17, 18, 72],
    &[73, 9, 8, 10, 82, 11, 12, 13, 14, 17, 7, 8, 9, 73],
];

const ROUTE_LETTERS: [char; 3] = ['A', 'B', 'C'];

/// Session context fed by the external login collaborator
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub role: Option<UserRole>,
    pub user_id: Option<String>,
}

/// A spawn task scheduled against the monotonic tick counter
#[derive(Debug, Clone, Copy)]
enum ScheduledTask {
    BusWave,
}

#[derive(Debug, Clone, Copy)]
struct Scheduled {
    due_tick: u64,
    task: ScheduledTask,
}

/// Recurring ambient-traffic generator state
#[derive(Debug, Clone, Copy, Default)]
struct AmbientGenerator {
    running: bool,
    next_due_tick: u64,
    cycles: u64,
}

/// Read-only node state for rendering collaborators
#[derive(Debug, Clone)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub position: Position,
    pub light_phase: Option<LightPhase>,
}

/// Read-only vehicle state for rendering collaborators
#[derive(Debug, Clone)]
pub struct VehicleSnapshot {
    pub id: VehicleId,
    pub label: String,
    pub kind: VehicleKind,
    pub current: NodeId,
    pub next: Option<NodeId>,
    pub destination: NodeId,
    pub progress: f32,
    pub returning: bool,
}

/// The traffic simulation engine
pub struct SimEngine {
    pub graph: CityGraph,
    vehicles: HashMap<VehicleId, Vehicle>,
    session: Session,
    tick_count: u64,
    next_vehicle_id: u64,
    kind_counters: HashMap<VehicleKind, u64>,
    bus_wave_counter: u32,
    scheduled: Vec<Scheduled>,
    ambient: AmbientGenerator,
    initialized: bool,
    /// Optional seeded RNG for reproducible simulations
    rng: Option<StdRng>,
}

impl SimEngine {
    fn new_internal(graph: CityGraph, rng: Option<StdRng>) -> Self {
        Self {
            graph,
            vehicles: HashMap::new(),
            session: Session::default(),
            tick_count: 0,
            next_vehicle_id: 0,
            kind_counters: HashMap::new(),
            bus_wave_counter: 0,
            scheduled: Vec::new(),
            ambient: AmbientGenerator::default(),
            initialized: false,
            rng,
        }
    }

    pub fn new(graph: CityGraph) -> Self {
        Self::new_internal(graph, None)
    }

    /// Create an engine with a seeded RNG for reproducible simulations
    pub fn with_seed(graph: CityGraph, seed: u64) -> Self {
        Self::new_internal(graph, Some(StdRng::seed_from_u64(seed)))
    }

    /// Engine over the fixed city map
    pub fn create_city() -> Self {
        Self::new(CityGraph::city_map())
    }

    pub fn create_city_with_seed(seed: u64) -> Self {
        Self::with_seed(CityGraph::city_map(), seed)
    }

    fn random_range(&mut self, range: std::ops::Range<f32>) -> f32 {
        match &mut self.rng {
            Some(rng) => rng.random_range(range),
            None => rand::rng().random_range(range),
        }
    }

    fn random_index(&mut self, upper: usize) -> usize {
        match &mut self.rng {
            Some(rng) => rng.random_range(0..upper),
            None => rand::rng().random_range(0..upper),
        }
    }

    fn choose_random<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        if slice.is_empty() {
            return None;
        }
        match &mut self.rng {
            Some(rng) => slice.choose(rng),
            None => slice.choose(&mut rand::rng()),
        }
    }

    fn alloc_vehicle_id(&mut self) -> VehicleId {
        self.next_vehicle_id += 1;
        VehicleId(self.next_vehicle_id)
    }

    fn next_label(&mut self, kind: VehicleKind) -> String {
        let counter = self.kind_counters.entry(kind).or_insert(0);
        *counter += 1;
        format!("{}-{}", kind.label_prefix(), counter)
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Store the session context. The bus-driver role starts the bus
    /// routes.
    pub fn set_current_user(&mut self, role: UserRole, user_id: &str) {
        info!("session user {user_id} with role {role:?}");
        self.session = Session {
            role: Some(role),
            user_id: Some(user_id.to_string()),
        };

        if role == UserRole::BusDriver {
            self.spawn_bus_route(user_id);
        }
    }

    /// Main simulation tick
    pub fn tick(&mut self) {
        self.tick_count += 1;

        self.run_scheduled();
        self.run_ambient();
        self.move_vehicles();
        self.update_lights();
    }

    /// Spawn a vehicle routed from `start` to `end`. Returns `false` and
    /// leaves the simulation untouched when no route exists.
    pub fn spawn_vehicle(&mut self, start: NodeId, end: NodeId, kind: VehicleKind) -> bool {
        match self.try_spawn_vehicle(start, end, kind) {
            Some(_) => true,
            None => {
                debug!("no route from {start} to {end}, spawn rejected");
                false
            }
        }
    }

    fn try_spawn_vehicle(
        &mut self,
        start: NodeId,
        end: NodeId,
        kind: VehicleKind,
    ) -> Option<VehicleId> {
        let path = self.graph.find_path(start, end)?;

        let id = self.alloc_vehicle_id();
        let label = self.next_label(kind);
        let mut vehicle = Vehicle::new(id, label, kind, path)?;
        vehicle.enter_current_edge(&mut self.graph);
        self.vehicles.insert(id, vehicle);
        Some(id)
    }

    /// Start the three fixed bus loop routes: one bus per route now, and
    /// two further waves scheduled against the tick counter. Pending waves
    /// are cancelled by [`SimEngine::reset_traffic`].
    pub fn spawn_bus_route(&mut self, driver_id: &str) {
        info!("bus routes started for driver {driver_id}");
        self.spawn_bus_wave();

        for wave in 1..=2u64 {
            self.scheduled.push(Scheduled {
                due_tick: self.tick_count + wave * BUS_WAVE_DELAY_TICKS,
                task: ScheduledTask::BusWave,
            });
        }
    }

    fn spawn_bus_wave(&mut self) {
        self.bus_wave_counter += 1;
        let wave = self.bus_wave_counter;

        for (route, letter) in BUS_ROUTES.iter().zip(ROUTE_LETTERS) {
            let path: Vec<NodeId> = route.iter().map(|&id| NodeId(id)).collect();
            if path.iter().any(|id| self.graph.node(*id).is_none()) {
                warn!("bus route {letter} references nodes missing from the map, skipping");
                continue;
            }

            let id = self.alloc_vehicle_id();
            let label = format!("BUS-{wave}{letter}");
            let Some(mut bus) = Vehicle::new(id, label, VehicleKind::Bus, path) else {
                continue;
            };
            bus.enter_current_edge(&mut self.graph);
            self.vehicles.insert(id, bus);
        }
    }

    /// One-time traffic seeding at session start: a batch of random car
    /// trips, one dispatch per emergency service, everything scattered
    /// along its route, and the recurring ambient generator armed.
    pub fn initialize_traffic(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;
        info!("seeding city traffic");

        let residences = self.residential_nodes();
        for _ in 0..INITIAL_CAR_TRIPS {
            let (Some(&start), Some(&end)) = (
                self.choose_random(&residences),
                self.choose_random(&residences),
            ) else {
                break;
            };
            if start != end {
                self.spawn_vehicle(start, end, VehicleKind::Car);
            }
        }

        self.dispatch_emergencies(&residences);
        self.scatter_vehicles();

        self.ambient = AmbientGenerator {
            running: true,
            next_due_tick: self.tick_count + AMBIENT_PERIOD_TICKS,
            cycles: 0,
        };
    }

    /// Remove every vehicle, empty every edge queue, restart the id
    /// counters and drop pending bus waves so none fire afterwards.
    pub fn reset_traffic(&mut self) {
        info!("traffic reset");
        self.vehicles.clear();
        self.graph.clear_queues();
        self.next_vehicle_id = 0;
        self.kind_counters.clear();
        self.bus_wave_counter = 0;
        self.scheduled.clear();
    }

    /// Ordered node state for rendering collaborators
    pub fn node_snapshots(&self) -> Vec<NodeSnapshot> {
        let mut nodes: Vec<NodeSnapshot> = self
            .graph
            .nodes()
            .map(|node| NodeSnapshot {
                id: node.id,
                name: node.name.clone(),
                kind: node.kind,
                position: node.position,
                light_phase: node.light.as_ref().map(|light| light.phase),
            })
            .collect();
        nodes.sort_by_key(|node| node.id);
        nodes
    }

    /// Ordered vehicle state for rendering collaborators
    pub fn vehicle_snapshots(&self) -> Vec<VehicleSnapshot> {
        let mut vehicles: Vec<VehicleSnapshot> = self
            .vehicles
            .values()
            .map(|vehicle| VehicleSnapshot {
                id: vehicle.id,
                label: vehicle.label.clone(),
                kind: vehicle.kind,
                current: vehicle.current,
                next: vehicle.next,
                destination: vehicle.destination,
                progress: vehicle.progress,
                returning: vehicle.returning,
            })
            .collect();
        vehicles.sort_by_key(|vehicle| vehicle.id);
        vehicles
    }

    fn run_scheduled(&mut self) {
        let tick = self.tick_count;
        let mut due = Vec::new();
        self.scheduled.retain(|entry| {
            if entry.due_tick <= tick {
                due.push(entry.task);
                false
            } else {
                true
            }
        });

        for task in due {
            match task {
                ScheduledTask::BusWave => self.spawn_bus_wave(),
            }
        }
    }

    fn run_ambient(&mut self) {
        if !self.ambient.running || self.tick_count < self.ambient.next_due_tick {
            return;
        }
        self.ambient.next_due_tick = self.tick_count + AMBIENT_PERIOD_TICKS;
        self.ambient.cycles += 1;

        let residences = self.residential_nodes();
        let (Some(&start), Some(&end)) = (
            self.choose_random(&residences),
            self.choose_random(&residences),
        ) else {
            return;
        };
        if start != end {
            self.spawn_vehicle(start, end, VehicleKind::Car);
        }

        if self.ambient.cycles % EMERGENCY_DISPATCH_CYCLE == 0 {
            self.dispatch_emergencies(&residences);
        }
    }

    /// One dispatch per emergency service, from its station to a random
    /// residence
    fn dispatch_emergencies(&mut self, residences: &[NodeId]) {
        for (kind, station_kind) in [
            (VehicleKind::PoliceCar, NodeKind::Police),
            (VehicleKind::Ambulance, NodeKind::Hospital),
            (VehicleKind::FireTruck, NodeKind::FireStation),
        ] {
            let Some(station) = self.station(station_kind) else {
                continue;
            };
            let Some(&destination) = self.choose_random(residences) else {
                continue;
            };
            if destination != station {
                self.spawn_vehicle(station, destination, kind);
            }
        }
    }

    fn station(&self, kind: NodeKind) -> Option<NodeId> {
        self.graph
            .nodes()
            .filter(|node| node.kind == kind)
            .map(|node| node.id)
            .min()
    }

    /// Non-intersection residential nodes, sorted so seeded runs are
    /// reproducible
    fn residential_nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self
            .graph
            .nodes()
            .filter(|node| node.kind == NodeKind::Apartment)
            .map(|node| node.id)
            .collect();
        nodes.sort();
        nodes
    }

    /// Throw freshly seeded vehicles to random positions along their
    /// routes so the network does not start empty. Queue membership is
    /// re-homed to keep the edge/vehicle agreement intact.
    fn scatter_vehicles(&mut self) {
        let mut ids: Vec<VehicleId> = self.vehicles.keys().copied().collect();
        ids.sort();

        for id in ids {
            let Some(mut vehicle) = self.vehicles.remove(&id) else {
                continue;
            };

            if vehicle.kind != VehicleKind::Bus && vehicle.path.len() > 2 {
                let index = self.random_index(vehicle.path.len() - 1);
                vehicle.leave_current_edge(&mut self.graph);
                vehicle.path_index = index;
                vehicle.current = vehicle.path[index];
                vehicle.next = vehicle.path.get(index + 1).copied();
                vehicle.progress = self.random_range(0.0..1.0);
                vehicle.enter_current_edge(&mut self.graph);
            }

            self.vehicles.insert(id, vehicle);
        }
    }

    fn move_vehicles(&mut self) {
        let mut ids: Vec<VehicleId> = self.vehicles.keys().copied().collect();
        ids.sort();

        for id in ids {
            let Some(mut vehicle) = self.vehicles.remove(&id) else {
                continue;
            };

            match vehicle.advance(&mut self.graph) {
                Ok(VehicleUpdateResult::Moving) => {
                    self.vehicles.insert(id, vehicle);
                }
                Ok(VehicleUpdateResult::ReachedEnd) => self.handle_end_of_path(vehicle),
                Err(err) => {
                    warn!("removing vehicle {}: {err:#}", vehicle.label);
                    vehicle.leave_current_edge(&mut self.graph);
                }
            }
        }
    }

    /// End-of-path state machine: buses loop, emergency vehicles make one
    /// return trip, everything else is removed.
    fn handle_end_of_path(&mut self, mut vehicle: Vehicle) {
        let Some(&origin) = vehicle.path.first() else {
            return;
        };

        match vehicle.kind {
            VehicleKind::Bus => {
                vehicle.path_index = 0;
                vehicle.progress = 0.0;
                vehicle.current = origin;
                vehicle.next = vehicle.path.get(1).copied();
                vehicle.enter_current_edge(&mut self.graph);
                self.vehicles.insert(vehicle.id, vehicle);
            }
            kind if kind.is_emergency() && !vehicle.returning => {
                // First arrival: route back to base through the current
                // congestion picture.
                match self.graph.find_path(vehicle.current, origin) {
                    Some(path) => {
                        vehicle.current = path[0];
                        vehicle.next = path.get(1).copied();
                        vehicle.path = path;
                        vehicle.path_index = 0;
                        vehicle.progress = 0.0;
                        vehicle.destination = origin;
                        vehicle.returning = true;
                        vehicle.enter_current_edge(&mut self.graph);
                        self.vehicles.insert(vehicle.id, vehicle);
                    }
                    None => debug!("no return path for {}, removing", vehicle.label),
                }
            }
            _ => {
                // Ordinary arrival, or an emergency vehicle back at base.
            }
        }
    }

    fn update_lights(&mut self) {
        let intersections: Vec<NodeId> = self
            .graph
            .nodes()
            .filter(|node| node.light.is_some())
            .map(|node| node.id)
            .collect();

        for id in intersections {
            let loads = self.graph.approach_loads(id);
            if let Some(light) = self.graph.node_mut(id).and_then(|node| node.light.as_mut()) {
                light.update(loads.north_south, loads.east_west);
            }
        }
    }

    /// Print a terminal summary of the simulation state
    pub fn print_summary(&self) {
        println!("=== City Traffic Summary ===");
        println!("Tick: {}", self.tick_count);
        println!(
            "Nodes: {}, Roads: {}, Queued vehicles: {}",
            self.graph.node_count(),
            self.graph.road_count(),
            self.graph.total_queued()
        );

        println!("Vehicles: {}", self.vehicles.len());
        for kind in [
            VehicleKind::Ambulance,
            VehicleKind::FireTruck,
            VehicleKind::PoliceCar,
            VehicleKind::Bus,
            VehicleKind::Car,
        ] {
            let count = self.vehicles.values().filter(|v| v.kind == kind).count();
            if count > 0 {
                println!("  {kind:?}: {count}");
            }
        }

        let (mut ns_green, mut ew_green) = (0, 0);
        for node in self.graph.nodes() {
            match node.light.as_ref().map(|light| light.phase) {
                Some(LightPhase::NorthSouthGreen) => ns_green += 1,
                Some(LightPhase::EastWestGreen) => ew_green += 1,
                None => {}
            }
        }
        println!("Lights: {ns_green} north-south green, {ew_green} east-west green");
    }
}
