//! relaygrid-autoscale — backlog-driven worker fleet scaling.
//!
//! Samples the request channel depth and the tagged instance fleet every
//! cycle, and starts or stops instances. Scale-up reacts immediately;
//! scale-down needs several consecutive idle cycles so a single dip in
//! backlog does not make the fleet flap.
//!
//! # Scaling Algorithm
//!
//! ```text
//! pending = approximate request channel depth
//! running, stopped = fleet snapshot (instances named <tag_prefix>*)
//!
//! if pending <= running:
//!     idle_counter += 1
//!     if idle_counter >= idle_threshold:
//!         stop (running - pending) instances   // never below backlog
//!         idle_counter = 0
//! else:
//!     idle_counter = 0
//!     start min(pending - running, stopped, max_fleet - running) instances
//!
//! sleep (pending == 0 ? idle_interval : busy_interval) + uniform(0, jitter)
//! ```
//!
//! A failed cycle is logged and followed by a fixed backoff; the loop only
//! ends on shutdown.

pub mod controller;
pub mod error;
pub mod fleet;

pub use controller::{FleetController, ScaleDecision, VictimSelector};
pub use error::{FleetError, FleetResult};
pub use fleet::{FleetApi, FleetSnapshot, Instance, InstanceState, MemoryFleet};
