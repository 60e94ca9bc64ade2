pub mod connection;
pub mod correlator;
pub mod event_router;
