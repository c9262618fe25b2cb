pub mod config;
pub mod model;
pub mod severity;

// Probe command and output parsing
pub mod probe;

// Host registry and fetch bookkeeping
pub mod fleet;
pub mod ordering;

pub mod coalesce;
pub mod search;

// Transport seam and host-key trust
pub mod executor;
pub mod trust;
