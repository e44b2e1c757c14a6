//! City Traffic Simulation Library
//!
//! Simulates vehicle flow over a fixed city road network: congestion-aware
//! routing, adaptive traffic lights, emergency preemption, bus routes and
//! ambient background traffic. The core runs headless; rendering and login
//! collaborators consume the pull-based snapshot API.

pub mod simulation;
