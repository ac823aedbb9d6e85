pub mod agent;
pub mod event;
pub mod offer;
pub mod order;
pub mod tracking;
