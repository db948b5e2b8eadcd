use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time;
use tracing::{debug, error, info, instrument, trace, warn};

// Import our custom error type
use crate::{Error, Result};

use crate::protocol::{heat_pump_item, number_of, text_of, Request, Response};
use crate::schedule::{
    self, parse_temperature, HeatingSchedule, TankSchedule, TankState, WeekSchedule, WireValue,
};

/// Date format used by the unit clock
pub const DATETIME_FMT: &str = "%Y%m%dT%H%M%SZ";

/// Path of the adapter model in a device info response
const ADAPTER_MODEL_PATH: &str = "/m2m:rsp/pc/m2m:dvi/mod";

/// A message channel to the LAN adapter, typically a WebSocket on `ws://<adapter>/mca`.
///
/// Each request is a single text message answered by a single text message.
#[async_trait]
pub trait Transport: Send {
    /// Sends one text message
    async fn send(&mut self, message: String) -> Result<()>;

    /// Waits for the next text message
    async fn recv(&mut self) -> Result<String>;
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Originator put in every request. Responses must be addressed to it.
    pub user_agent: String,
    /// Maximum time to wait for a response
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: "rust-daikin-altherma".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Whether the unit is heating or cooling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationMode {
    Heating,
    Cooling,
    Auto,
}

impl FromStr for OperationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "heating" => Ok(OperationMode::Heating),
            "cooling" => Ok(OperationMode::Cooling),
            "auto" => Ok(OperationMode::Auto),
            _ => Err(Error::UnknownCode(s.to_string())),
        }
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationMode::Heating => write!(f, "Heating"),
            OperationMode::Cooling => write!(f, "Cooling"),
            OperationMode::Auto => write!(f, "Auto"),
        }
    }
}

/// Next heating schedule transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatingScheduleState {
    pub operation_mode: OperationMode,
    pub start_time: u32,
    pub day: String,
    /// Target temperature in °C
    pub target_temperature: f64,
}

/// Next tank schedule transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TankScheduleState {
    pub operation_mode: OperationMode,
    pub start_time: u32,
    pub day: String,
    pub tank_state: TankState,
}

/// Schedule state as the unit reports it
#[derive(Debug, Deserialize)]
struct NextScheduleList {
    data: NextSchedule,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NextSchedule {
    operation_mode: String,
    start_time: Value,
    // Tank states are also reported here
    target_temperature: Value,
    day: String,
}

impl NextSchedule {
    fn parse(con: &str) -> Result<Self> {
        let list: NextScheduleList = serde_json::from_str(con)?;
        Ok(list.data)
    }

    fn start_time(&self) -> Result<u32> {
        let start = number_of(&self.start_time)?;
        if start < 0.0 || start.fract() != 0.0 || start > u32::MAX as f64 {
            return Err(Error::InvalidValue(text_of(&self.start_time)));
        }
        Ok(start as u32)
    }
}

/// Main struct for talking to a heat pump through its LAN adapter
pub struct DaikinAltherma<T> {
    /// Transport to the adapter. Locked for a whole request/response exchange,
    /// so only one request is ever outstanding.
    transport: Mutex<T>,
    config: ClientConfig,
}

impl<T: Transport> DaikinAltherma<T> {
    /// Creates a client with the default configuration
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ClientConfig::default())
    }

    pub fn with_config(transport: T, config: ClientConfig) -> Self {
        debug!("Using originator {}", config.user_agent);
        Self {
            transport: Mutex::new(transport),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Gives the transport back
    pub fn into_inner(self) -> T {
        self.transport.into_inner()
    }

    /// Sends a request and waits for its response.
    ///
    /// Replies to earlier requests that timed out are still queued on the
    /// transport; they are skipped until ours arrives or the deadline passes.
    #[instrument(skip(self, request), fields(rqi = %request.id()))]
    async fn exchange(&self, request: Request) -> Result<Response> {
        let message = request.to_json()?;
        let timeout = self.config.request_timeout;

        let mut transport = self.transport.lock().await;
        trace!("Sending {}", message);
        transport.send(message).await?;

        let deadline = time::Instant::now() + timeout;
        loop {
            let reply = match time::timeout_at(deadline, transport.recv()).await {
                Ok(reply) => reply?,
                Err(_) => {
                    error!("No response within {:?}", timeout);
                    return Err(Error::Timeout(timeout));
                }
            };
            trace!("Received {}", reply);

            match Response::parse(&reply, &request) {
                Err(Error::RequestIdMismatch { got, .. }) => {
                    warn!("Skipping stale response to request {}", got);
                }
                parsed => return parsed,
            }
        }
    }

    /// Reads a resource, `item` being the path below `/[0]/`
    async fn retrieve(&self, item: &str) -> Result<Response> {
        let request = Request::retrieve(&self.config.user_agent, item);
        self.exchange(request).await
    }

    /// Reads the content of a heat pump resource
    async fn read(&self, item: &str) -> Result<Value> {
        let response = self.retrieve(&heat_pump_item(item)).await?;
        Ok(response.content()?.clone())
    }

    async fn read_text(&self, item: &str) -> Result<String> {
        Ok(text_of(&self.read(item).await?))
    }

    async fn read_number(&self, item: &str) -> Result<f64> {
        number_of(&self.read(item).await?)
    }

    /// Writes content to a heat pump resource
    async fn write(&self, item: &str, con: Value) -> Result<()> {
        let request = Request::create(&self.config.user_agent, &heat_pump_item(item), con);
        self.exchange(request).await?;
        Ok(())
    }

    /// Returns the model of the LAN adapter, e.g. BRP069A61
    #[instrument(skip(self))]
    pub async fn adapter_model(&self) -> Result<String> {
        let response = self.retrieve("MNCSE-node/deviceInfo").await?;
        Ok(text_of(response.get(ADAPTER_MODEL_PATH)?))
    }

    /// Returns the current date of the unit. Takes time to refresh.
    #[instrument(skip(self))]
    pub async fn unit_datetime(&self) -> Result<NaiveDateTime> {
        let raw = self.read_text("0/DateTime/la").await?;
        Ok(NaiveDateTime::parse_from_str(&raw, DATETIME_FMT)?)
    }

    /// Sets the unit clock
    #[instrument(skip(self))]
    pub async fn set_unit_datetime(&self, datetime: NaiveDateTime) -> Result<()> {
        let formatted = datetime.format(DATETIME_FMT).to_string();
        debug!("Setting unit clock to {}", formatted);
        self.write("0/DateTime", Value::from(formatted)).await?;
        info!("Unit clock set to {}", datetime);
        Ok(())
    }

    /// Returns the model of the heating unit, e.g. EAVH16S23DA6V
    #[instrument(skip(self))]
    pub async fn unit_model(&self) -> Result<String> {
        self.read_text("1/UnitInfo/ModelNumber/la").await
    }

    #[instrument(skip(self))]
    pub async fn unit_type(&self) -> Result<String> {
        self.read_text("1/UnitInfo/UnitType/la").await
    }

    #[instrument(skip(self))]
    pub async fn indoor_unit_version(&self) -> Result<String> {
        self.read_text("1/UnitInfo/Version/IndoorSettings/la").await
    }

    #[instrument(skip(self))]
    pub async fn indoor_unit_software_version(&self) -> Result<String> {
        self.read_text("1/UnitInfo/Version/IndoorSoftware/la").await
    }

    #[instrument(skip(self))]
    pub async fn outdoor_unit_software_version(&self) -> Result<String> {
        self.read_text("1/UnitInfo/Version/OutdoorSoftware/la").await
    }

    /// Returns the remote console settings version
    #[instrument(skip(self))]
    pub async fn remote_setting_version(&self) -> Result<String> {
        self.read_text("1/UnitInfo/Version/RemoconSettings/la").await
    }

    /// Returns the remote console software version
    #[instrument(skip(self))]
    pub async fn remote_software_version(&self) -> Result<String> {
        self.read_text("1/UnitInfo/Version/RemoconSoftware/la").await
    }

    /// Returns the pin code of the LAN adapter
    #[instrument(skip(self))]
    pub async fn pin_code(&self) -> Result<String> {
        self.read_text("1/ChildLock/PinCode/la").await
    }

    /// Returns the unit profile, describing which resources the unit supports
    #[instrument(skip(self))]
    pub async fn unit_profile(&self) -> Result<Value> {
        match self.read("1/UnitProfile/la").await? {
            Value::String(raw) => Ok(serde_json::from_str(&raw)?),
            other => Ok(other),
        }
    }

    /// Returns the hot water tank temperature, in °C
    #[instrument(skip(self))]
    pub async fn tank_temperature(&self) -> Result<f64> {
        self.read_number("2/Sensor/TankTemperature/la").await
    }

    /// Returns the hot water tank setpoint (target) temperature, in °C
    #[instrument(skip(self))]
    pub async fn tank_setpoint_temperature(&self) -> Result<f64> {
        self.read_number("2/Operation/TargetTemperature/la").await
    }

    /// Sets the hot water tank setpoint (target) temperature, in °C
    #[instrument(skip(self))]
    pub async fn set_tank_setpoint_temperature(&self, temperature: f64) -> Result<()> {
        check_temperature(temperature)?;
        self.write("2/Operation/TargetTemperature", Value::from(temperature))
            .await?;
        info!("Tank setpoint set to {}°C", temperature);
        Ok(())
    }

    /// Returns whether tank heating is enabled
    #[instrument(skip(self))]
    pub async fn is_tank_heating_enabled(&self) -> Result<bool> {
        Ok(self.read_text("2/Operation/Power/la").await? == "on")
    }

    /// Turns tank heating on or off (standby)
    #[instrument(skip(self))]
    pub async fn set_tank_heating_enabled(&self, enabled: bool) -> Result<()> {
        self.write("2/Operation/Power", Value::from(power_value(enabled)))
            .await?;
        info!("Tank heating {}", power_value(enabled));
        Ok(())
    }

    /// Returns whether the tank is in powerful mode
    #[instrument(skip(self))]
    pub async fn is_tank_powerful(&self) -> Result<bool> {
        Ok(self.read_text("2/Operation/Powerful/la").await? == "1")
    }

    /// Turns the tank powerful mode on or off
    #[instrument(skip(self))]
    pub async fn set_tank_powerful(&self, powerful: bool) -> Result<()> {
        self.write("2/Operation/Powerful", Value::from(u8::from(powerful)))
            .await?;
        info!("Tank powerful mode set to {}", powerful);
        Ok(())
    }

    /// Returns the indoor temperature, in °C
    #[instrument(skip(self))]
    pub async fn indoor_temperature(&self) -> Result<f64> {
        self.read_number("1/Sensor/IndoorTemperature/la").await
    }

    /// Returns the outdoor temperature, in °C
    #[instrument(skip(self))]
    pub async fn outdoor_temperature(&self) -> Result<f64> {
        self.read_number("1/Sensor/OutdoorTemperature/la").await
    }

    /// Returns the indoor setpoint (target) temperature, in °C
    #[instrument(skip(self))]
    pub async fn indoor_setpoint_temperature(&self) -> Result<f64> {
        self.read_number("1/Operation/TargetTemperature/la").await
    }

    /// Sets the heating setpoint (target) temperature, in °C
    #[instrument(skip(self))]
    pub async fn set_setpoint_temperature(&self, temperature: f64) -> Result<()> {
        check_temperature(temperature)?;
        self.write("1/Operation/TargetTemperature", Value::from(temperature))
            .await?;
        info!("Heating setpoint set to {}°C", temperature);
        Ok(())
    }

    /// Returns the heating leaving water temperature, in °C
    #[instrument(skip(self))]
    pub async fn leaving_water_temperature(&self) -> Result<f64> {
        self.read_number("1/Sensor/LeavingWaterTemperatureCurrent/la")
            .await
    }

    /// Returns whether space heating is enabled
    #[instrument(skip(self))]
    pub async fn is_heating_enabled(&self) -> Result<bool> {
        Ok(self.read_text("1/Operation/Power/la").await? == "on")
    }

    /// Turns space heating on or off (standby)
    #[instrument(skip(self))]
    pub async fn set_heating_enabled(&self, enabled: bool) -> Result<()> {
        self.write("1/Operation/Power", Value::from(power_value(enabled)))
            .await?;
        info!("Heating {}", power_value(enabled));
        Ok(())
    }

    /// Returns whether the unit is heating or cooling
    #[instrument(skip(self))]
    pub async fn operation_mode(&self) -> Result<OperationMode> {
        self.read_text("1/Operation/OperationMode/la").await?.parse()
    }

    /// Returns the energy consumption in kWh per [D]ay, [W]eek and [M]onth
    #[instrument(skip(self))]
    pub async fn power_consumption(&self) -> Result<Value> {
        self.read("1/Consumption/la").await
    }

    /// Returns whether holiday mode is active
    #[instrument(skip(self))]
    pub async fn is_holiday_mode(&self) -> Result<bool> {
        Ok(self.read_text("1/Holiday/HolidayState/la").await? == "1")
    }

    /// Turns holiday mode on or off
    #[instrument(skip(self))]
    pub async fn set_holiday_mode(&self, active: bool) -> Result<()> {
        self.write("1/Holiday/HolidayState", Value::from(u8::from(active)))
            .await?;
        info!("Holiday mode set to {}", active);
        Ok(())
    }

    /// Returns the heating schedules stored on the unit
    #[instrument(skip(self))]
    pub async fn heating_schedules(&self) -> Result<Vec<HeatingSchedule>> {
        let con = self.read_text("1/Schedule/List/Heating/la").await?;
        let schedules = schedule::decode_list(&con, parse_temperature)?;
        debug!("Read {} heating schedules", schedules.len());
        Ok(schedules)
    }

    /// Returns the tank schedules stored on the unit
    #[instrument(skip(self))]
    pub async fn tank_schedules(&self) -> Result<Vec<TankSchedule>> {
        let con = self.read_text("2/Schedule/List/Heating/la").await?;
        let schedules = schedule::decode_list(&con, TankState::from_code)?;
        debug!("Read {} tank schedules", schedules.len());
        Ok(schedules)
    }

    /// Replaces the heating schedule
    #[instrument(skip(self, schedule))]
    pub async fn set_heating_schedule(&self, schedule: &HeatingSchedule) -> Result<()> {
        self.write_schedule("1/Schedule/List/Heating", schedule).await?;
        info!("Heating schedule updated");
        Ok(())
    }

    /// Replaces the tank schedule
    #[instrument(skip(self, schedule))]
    pub async fn set_tank_schedule(&self, schedule: &TankSchedule) -> Result<()> {
        self.write_schedule("2/Schedule/List/Heating", schedule).await?;
        info!("Tank schedule updated");
        Ok(())
    }

    async fn write_schedule<V: WireValue>(&self, item: &str, schedule: &WeekSchedule<V>) -> Result<()> {
        // Encode before sending anything, an oversized day must not reach the unit
        let con = schedule::encode_list(schedule)?;
        trace!("Schedule payload {}", con);
        self.write(item, Value::from(con)).await
    }

    /// Returns the next heating schedule transition
    #[instrument(skip(self))]
    pub async fn heating_schedule_state(&self) -> Result<HeatingScheduleState> {
        let next = NextSchedule::parse(&self.read_text("1/Schedule/Next/la").await?)?;
        Ok(HeatingScheduleState {
            operation_mode: next.operation_mode.parse()?,
            start_time: next.start_time()?,
            target_temperature: parse_temperature(&text_of(&next.target_temperature))?,
            day: next.day,
        })
    }

    /// Returns the next tank schedule transition
    #[instrument(skip(self))]
    pub async fn tank_schedule_state(&self) -> Result<TankScheduleState> {
        let next = NextSchedule::parse(&self.read_text("2/Schedule/Next/la").await?)?;
        Ok(TankScheduleState {
            operation_mode: next.operation_mode.parse()?,
            start_time: next.start_time()?,
            tank_state: TankState::from_code(&text_of(&next.target_temperature))?,
            day: next.day,
        })
    }

    /// Reads everything shown by [`Status`]'s `Display`
    #[instrument(skip(self))]
    pub async fn status(&self) -> Result<Status> {
        info!("Reading unit status");
        let status = Status {
            adapter_model: self.adapter_model().await?,
            unit_model: self.unit_model().await?,
            unit_type: self.unit_type().await?,
            unit_datetime: self.unit_datetime().await?,
            tank_temperature: self.tank_temperature().await?,
            tank_setpoint_temperature: self.tank_setpoint_temperature().await?,
            tank_heating_enabled: self.is_tank_heating_enabled().await?,
            tank_powerful: self.is_tank_powerful().await?,
            tank_schedule: self.tank_schedules().await?.into_iter().next(),
            tank_schedule_state: self.tank_schedule_state().await?,
            outdoor_temperature: self.outdoor_temperature().await?,
            indoor_temperature: self.indoor_temperature().await?,
            indoor_setpoint_temperature: self.indoor_setpoint_temperature().await?,
            heating_enabled: self.is_heating_enabled().await?,
            leaving_water_temperature: self.leaving_water_temperature().await?,
            operation_mode: self.operation_mode().await?,
            heating_schedule: self.heating_schedules().await?.into_iter().next(),
            heating_schedule_state: self.heating_schedule_state().await?,
        };

        if status.heating_schedule.is_none() {
            warn!("Unit reported no heating schedule");
        }
        Ok(status)
    }
}

fn power_value(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "standby"
    }
}

fn check_temperature(temperature: f64) -> Result<()> {
    if temperature.is_finite() {
        Ok(())
    } else {
        warn!("Refusing setpoint {}", temperature);
        Err(Error::InvalidValue(temperature.to_string()))
    }
}

/// Snapshot of the unit state
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub adapter_model: String,
    pub unit_model: String,
    pub unit_type: String,
    pub unit_datetime: NaiveDateTime,
    pub tank_temperature: f64,
    pub tank_setpoint_temperature: f64,
    pub tank_heating_enabled: bool,
    pub tank_powerful: bool,
    pub tank_schedule: Option<TankSchedule>,
    pub tank_schedule_state: TankScheduleState,
    pub outdoor_temperature: f64,
    pub indoor_temperature: f64,
    pub indoor_setpoint_temperature: f64,
    pub heating_enabled: bool,
    pub leaving_water_temperature: f64,
    pub operation_mode: OperationMode,
    pub heating_schedule: Option<HeatingSchedule>,
    pub heating_schedule_state: HeatingScheduleState,
}

fn fmt_schedule<V: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    schedule: Option<&WeekSchedule<V>>,
) -> fmt::Result {
    let Some(schedule) = schedule else {
        return writeln!(f, "none");
    };

    writeln!(f)?;
    for (day, slots) in schedule.iter() {
        let entries: Vec<String> = slots
            .iter()
            .map(|(time, value)| format!("{time} {value}"))
            .collect();
        writeln!(f, "        {day}: {}", entries.join(", "))?;
    }
    Ok(())
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Daikin adapter: {}", self.adapter_model)?;
        writeln!(f, "Daikin unit: {} {}", self.unit_model, self.unit_type)?;
        writeln!(f, "Daikin time: {}", self.unit_datetime)?;
        writeln!(f, "Hot water tank:")?;
        writeln!(
            f,
            "    Current: {}°C (target {}°C)",
            self.tank_temperature, self.tank_setpoint_temperature
        )?;
        writeln!(
            f,
            "    Heating enabled: {} (Powerful: {})",
            self.tank_heating_enabled, self.tank_powerful
        )?;
        write!(f, "    Schedule: ")?;
        fmt_schedule(f, self.tank_schedule.as_ref())?;
        writeln!(
            f,
            "    Schedule state: {} from {:04} on {} ({})",
            self.tank_schedule_state.tank_state,
            self.tank_schedule_state.start_time,
            self.tank_schedule_state.day,
            self.tank_schedule_state.operation_mode
        )?;
        writeln!(f, "Heating:")?;
        writeln!(f, "    Outdoor temp: {}°C", self.outdoor_temperature)?;
        writeln!(f, "    Indoor temp: {}°C", self.indoor_temperature)?;
        writeln!(
            f,
            "    Heating target: {}°C (is heating enabled: {})",
            self.indoor_setpoint_temperature, self.heating_enabled
        )?;
        writeln!(f, "    Leaving water: {}°C", self.leaving_water_temperature)?;
        writeln!(f, "    Heating mode: {}", self.operation_mode)?;
        write!(f, "    Schedule: ")?;
        fmt_schedule(f, self.heating_schedule.as_ref())?;
        writeln!(
            f,
            "    Schedule state: {}°C from {:04} on {} ({})",
            self.heating_schedule_state.target_temperature,
            self.heating_schedule_state.start_time,
            self.heating_schedule_state.day,
            self.heating_schedule_state.operation_mode
        )
    }
}
