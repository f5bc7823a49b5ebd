pub mod client_manager;
pub mod discovery;
pub mod expenses;
pub mod registry;
pub mod router;
pub mod users;

pub use registry::{DiscoveryRegistry, ServiceHealthStatus, ServiceInstance, ServiceRegistry};
