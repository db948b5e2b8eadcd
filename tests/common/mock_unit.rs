#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use daikin_altherma::{Error, Result, Transport};
use parking_lot::Mutex;
use serde_json::{json, Value};

/// Schedule string with the same program every day
pub const HEATING_WIRE: &str = "$NULL|1|0000,180;0450,200;2300,180;,;,;,;0000,180;0450,200;2300,180;,;,;,;0000,180;0450,200;2300,180;,;,;,;0000,180;0450,200;2300,180;,;,;,;0000,180;0450,200;2300,180;,;,;,;0000,180;0450,200;2300,180;,;,;,;0000,180;0450,200;2300,180;,;,;,";

/// In-memory LAN adapter answering oneM2M requests from a resource table.
///
/// Writes to `X` are recorded and become readable at `X/la`.
#[derive(Clone, Default)]
pub struct MockUnit {
    resources: Arc<Mutex<HashMap<String, Value>>>,
    writes: Arc<Mutex<Vec<(String, Value)>>>,
    pending: Arc<Mutex<VecDeque<String>>>,
}

impl MockUnit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unit with every resource the status report reads
    pub fn populated() -> Self {
        let unit = Self::new()
            .with_content("MNAE/0/DateTime/la", json!("20240115T063000Z"))
            .with_content("MNAE/1/UnitInfo/ModelNumber/la", json!("EAVH16S23DA6V"))
            .with_content("MNAE/1/UnitInfo/UnitType/la", json!("HP"))
            .with_content("MNAE/2/Sensor/TankTemperature/la", json!(48))
            .with_content("MNAE/2/Operation/TargetTemperature/la", json!(50.0))
            .with_content("MNAE/2/Operation/Power/la", json!("on"))
            .with_content("MNAE/2/Operation/Powerful/la", json!(0))
            .with_content(
                "MNAE/2/Schedule/List/Heating/la",
                json!(json!({ "data": [HEATING_WIRE.replace("180", "0").replace("200", "1")] }).to_string()),
            )
            .with_content(
                "MNAE/2/Schedule/Next/la",
                json!(r#"{"data": {"OperationMode": "Heating", "StartTime": 2300, "TargetTemperature": 0, "Day": "Mo"}}"#),
            )
            .with_content("MNAE/1/Sensor/OutdoorTemperature/la", json!(4.5))
            .with_content("MNAE/1/Sensor/IndoorTemperature/la", json!("21.5"))
            .with_content("MNAE/1/Operation/TargetTemperature/la", json!(21))
            .with_content("MNAE/1/Operation/Power/la", json!("on"))
            .with_content("MNAE/1/Sensor/LeavingWaterTemperatureCurrent/la", json!(32))
            .with_content("MNAE/1/Operation/OperationMode/la", json!("heating"))
            .with_content(
                "MNAE/1/Schedule/List/Heating/la",
                json!(json!({ "data": [HEATING_WIRE] }).to_string()),
            )
            .with_content(
                "MNAE/1/Schedule/Next/la",
                json!(r#"{"data": {"OperationMode": "Heating", "StartTime": 450, "TargetTemperature": "200", "Day": "Mo"}}"#),
            );
        unit.with_pc("MNCSE-node/deviceInfo", json!({ "m2m:dvi": { "mod": "BRP069A61" } }))
    }

    /// Serves `con` as the content of `item`
    pub fn with_content(self, item: &str, con: Value) -> Self {
        self.with_pc(item, json!({ "m2m:cin": { "con": con } }))
    }

    /// Serves `pc` as the primitive content of `item`
    pub fn with_pc(self, item: &str, pc: Value) -> Self {
        self.resources.lock().insert(item.to_string(), pc);
        self
    }

    /// Content written so far, by resource
    pub fn writes(&self) -> Vec<(String, Value)> {
        self.writes.lock().clone()
    }

    fn answer(&self, request: &Value) -> Value {
        let rqp = &request["m2m:rqp"];
        let item = rqp["to"]
            .as_str()
            .unwrap_or_default()
            .trim_start_matches("/[0]/")
            .to_string();

        let mut rsp = json!({
            "rqi": rqp["rqi"],
            "to": rqp["fr"],
            "fr": rqp["to"],
        });

        if rqp["op"] == 1 {
            let con = rqp["pc"]["m2m:cin"]["con"].clone();
            self.writes.lock().push((item.clone(), con.clone()));
            self.resources
                .lock()
                .insert(format!("{item}/la"), json!({ "m2m:cin": { "con": con } }));
            rsp["rsc"] = json!(2001);
        } else if let Some(pc) = self.resources.lock().get(&item) {
            rsp["rsc"] = json!(2000);
            rsp["pc"] = pc.clone();
        } else {
            rsp["rsc"] = json!(4004);
        }

        json!({ "m2m:rsp": rsp })
    }
}

#[async_trait]
impl Transport for MockUnit {
    async fn send(&mut self, message: String) -> Result<()> {
        let request: Value = serde_json::from_str(&message)?;
        let reply = self.answer(&request);
        self.pending.lock().push_back(reply.to_string());
        Ok(())
    }

    async fn recv(&mut self) -> Result<String> {
        self.pending
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Transport("no pending response".to_string()))
    }
}

/// Adapter whose answer to the first request arrives after `delay`.
///
/// Replies are delivered in order, so anything asked before the late
/// reply is out waits behind it.
pub struct LateFirstReply {
    unit: MockUnit,
    delay: Duration,
    queue: VecDeque<(tokio::time::Instant, String)>,
    answered: usize,
}

impl LateFirstReply {
    pub fn new(unit: MockUnit, delay: Duration) -> Self {
        Self {
            unit,
            delay,
            queue: VecDeque::new(),
            answered: 0,
        }
    }
}

#[async_trait]
impl Transport for LateFirstReply {
    async fn send(&mut self, message: String) -> Result<()> {
        self.unit.send(message).await?;
        let reply = self.unit.recv().await?;

        let delay = if self.answered == 0 { self.delay } else { Duration::ZERO };
        self.answered += 1;
        self.queue.push_back((tokio::time::Instant::now() + delay, reply));
        Ok(())
    }

    async fn recv(&mut self) -> Result<String> {
        let ready_at = match self.queue.front() {
            Some((ready_at, _)) => *ready_at,
            None => return std::future::pending().await,
        };
        // Stays queued if the caller gives up while waiting
        tokio::time::sleep_until(ready_at).await;
        let (_, reply) = self.queue.pop_front().expect("front checked above");
        Ok(reply)
    }
}

/// Adapter that always answers with the same message
pub struct CannedReply(pub String);

#[async_trait]
impl Transport for CannedReply {
    async fn send(&mut self, _message: String) -> Result<()> {
        Ok(())
    }

    async fn recv(&mut self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Adapter that never answers
pub struct Silent;

#[async_trait]
impl Transport for Silent {
    async fn send(&mut self, _message: String) -> Result<()> {
        Ok(())
    }

    async fn recv(&mut self) -> Result<String> {
        std::future::pending().await
    }
}
