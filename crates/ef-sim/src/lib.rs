//! ef-sim: Acoustic simulation for EchoForge
//!
//! ## Fields and responses
//! - `energy_field` - SH-directional, banded, time-binned energy
//! - `impulse_response` - multichannel time-domain IRs
//!
//! ## Simulation
//! - `models` - distance attenuation, air absorption, directivity
//! - `direct_sim` - per-source direct-path parameters
//! - `reflection` - Monte-Carlo ray tracing into energy fields
//! - `reconstructor` - energy field to impulse response
//! - `reverb_estimator` - 3-band T60 fits and the hybrid splice solve
//!
//! ## Probes, baking, pathing
//! - `probes` - generation, batches, neighborhoods, baked payloads
//! - `baker` - parallel reflection and path baking with cancellation
//! - `path` - visibility graphs and runtime path finding
//!
//! ## Orchestration
//! - `manager` - `SimulationManager` running the three passes and
//!   publishing per-source results through triple buffers

mod baker;
mod direct_sim;
mod energy_field;
mod impulse_response;
mod manager;
mod models;
mod path;
mod probes;
mod reconstructor;
mod reflection;
mod reverb_estimator;

pub use baker::*;
pub use direct_sim::*;
pub use energy_field::*;
pub use impulse_response::*;
pub use manager::*;
pub use models::*;
pub use path::*;
pub use probes::*;
pub use reconstructor::*;
pub use reflection::*;
pub use reverb_estimator::*;

use thiserror::Error;

/// Simulation errors
#[derive(Error, Debug)]
pub enum SimError {
    /// Serialized baked data failed validation
    #[error("malformed baked data: {0}")]
    MalformedBakedData(String),

    /// Envelope-level payload failure
    #[error(transparent)]
    Payload(#[from] ef_core::CoreError),
}

/// Result type for simulation operations
pub type SimResult<T> = Result<T, SimError>;
