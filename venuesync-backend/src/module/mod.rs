pub mod clock;
pub mod lease;
pub mod osm;
pub mod reconcile;
pub mod scheduled;
