//! Communication layer and the collective stages of the surface gather.

pub mod communicator;
pub mod gather;
pub mod size_exchange;
pub mod wire;

pub use gather::gather_to_coordinator;
pub use size_exchange::exchange_partition_sizes;
