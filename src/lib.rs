/*!
 # Daikin Altherma heat pump client

 A Rust client for the local interface of Daikin Altherma heat pumps, as
 exposed by the BRP069A61/BRP069A62 LAN adapters on `ws://<adapter>/mca`.
 Requests and responses are oneM2M JSON objects, one per WebSocket message.

 ## Features

 * Sensor readings (indoor, outdoor, leaving water and tank temperatures)
 * Power state, operation mode and energy consumption
 * Unit and adapter metadata
 * Setpoint, power, date/time and holiday mode control
 * Weekly heating and tank schedules, read and write

 The crate does not open sockets itself: plug any WebSocket client in by
 implementing [`Transport`].

 ## Example

 ```rust,no_run
 use daikin_altherma::*;

 async fn show(transport: impl Transport) -> Result<()> {
     let unit = DaikinAltherma::new(transport);

     println!("Outdoor: {}°C", unit.outdoor_temperature().await?);
     let mut schedule = unit.heating_schedules().await?.remove(0);
     schedule.insert(Weekday::Mo, "0630", 21.0);
     unit.set_heating_schedule(&schedule).await?;

     Ok(())
 }
 ```
*/

use thiserror::Error;

/// Error types for the Daikin Altherma client
#[derive(Error, Debug)]
pub enum Error {
    /// Schedule string does not have the expected layout
    #[error("Malformed schedule: {0}")]
    Format(String),

    /// A day holds more entries than the unit can store
    #[error("{day} has {entries} schedule entries, at most 6 are supported")]
    CapacityExceeded {
        day: schedule::Weekday,
        entries: usize,
    },

    /// Raw code outside of the expected domain
    #[error("Unknown code: {0}")]
    UnknownCode(String),

    /// Value that could not be parsed
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Response did not answer our request
    #[error("Response id {got} does not match request id {expected}")]
    RequestIdMismatch { expected: String, got: String },

    /// Response was addressed to another originator
    #[error("Response addressed to {0}")]
    UnexpectedRecipient(String),

    /// The unit refused the request
    #[error("Request rejected with response code {0}")]
    Rejected(u64),

    /// Field absent from the response
    #[error("Missing field {0} in response")]
    MissingField(String),

    /// No response within the configured delay
    #[error("No response after {0:?}")]
    Timeout(std::time::Duration),

    /// Error reported by the transport
    #[error("Transport error: {0}")]
    Transport(String),

    /// Error from serde_json
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Error from chrono
    #[error(transparent)]
    DateTime(#[from] chrono::ParseError),
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod device;
pub mod protocol;
pub mod schedule;

pub use device::{
    ClientConfig, DaikinAltherma, HeatingScheduleState, OperationMode, Status, TankScheduleState,
    Transport,
};
pub use schedule::{
    decode, encode, parse_temperature, DaySlots, HeatingSchedule, TankSchedule, TankState,
    TimeOfDay, WeekSchedule, Weekday, WireValue,
};
