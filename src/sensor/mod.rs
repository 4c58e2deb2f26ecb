//! # Soil Sensor API
//!
//! Client for the two sensor endpoints (daily-average history and latest
//! reading), the transport seam it talks through, and the typed samples it
//! produces.

pub mod client;
pub mod transport;
pub mod types;

pub use client::SoilApiClient;
pub use transport::{
    FormPayload, HttpSensorTransport, SensorTransport, TransportError, TransportResponse,
};
pub use types::{HumidityTable, LatestReading, ReadingSource, SoilSample};
