pub mod broker;
pub mod inventory;
pub mod persistence;
pub mod probe;

pub use broker::BrokerPort;
pub use inventory::InventoryPort;
pub use persistence::PersistencePort;
pub use probe::ProbeAdapter;
