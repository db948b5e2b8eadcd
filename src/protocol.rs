/*!
 # oneM2M envelope

 Every exchange with the adapter is a single JSON request primitive
 (`m2m:rqp`) answered by a single response primitive (`m2m:rsp`). Reads
 retrieve the latest content instance (`.../la`) of a resource, writes create
 a new content instance on it.
*/

use serde::Serialize;
use serde_json::Value;
use tracing::{error, trace};
use uuid::Uuid;

use crate::{Error, Result};

/// Prefix of every resource living on the heat pump itself
pub const HEAT_PUMP_ROOT: &str = "MNAE/";
/// Path of the content value in a response
pub const CONTENT_PATH: &str = "/m2m:rsp/pc/m2m:cin/con";

const OP_CREATE: u8 = 1;
const OP_RETRIEVE: u8 = 2;
const TY_CONTENT_INSTANCE: u8 = 4;
const CONTENT_FORMAT: &str = "text/plain:0";
const REQUEST_ID_LEN: usize = 5;

/// Response status codes from 4000 up are errors
const FIRST_ERROR_CODE: u64 = 4000;

/// Resource path of an item on the heat pump
pub fn heat_pump_item(item: &str) -> String {
    format!("{HEAT_PUMP_ROOT}{item}")
}

/// Short random request identifier
pub fn request_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(REQUEST_ID_LEN);
    id
}

/// A request primitive, ready to be sent
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    #[serde(rename = "m2m:rqp")]
    primitive: RequestPrimitive,
}

#[derive(Debug, Clone, Serialize)]
struct RequestPrimitive {
    fr: String,
    rqi: String,
    op: u8,
    to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    ty: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pc: Option<PrimitiveContent>,
}

#[derive(Debug, Clone, Serialize)]
struct PrimitiveContent {
    #[serde(rename = "m2m:cin")]
    content_instance: ContentInstance,
}

#[derive(Debug, Clone, Serialize)]
struct ContentInstance {
    con: Value,
    cnf: &'static str,
}

impl Request {
    /// Reads `item`
    pub fn retrieve(originator: &str, item: &str) -> Self {
        Self {
            primitive: RequestPrimitive {
                fr: originator.to_string(),
                rqi: request_id(),
                op: OP_RETRIEVE,
                to: format!("/[0]/{item}"),
                ty: None,
                pc: None,
            },
        }
    }

    /// Writes `con` to `item`
    pub fn create(originator: &str, item: &str, con: impl Into<Value>) -> Self {
        let mut request = Self::retrieve(originator, item);
        request.primitive.op = OP_CREATE;
        request.primitive.ty = Some(TY_CONTENT_INSTANCE);
        request.primitive.pc = Some(PrimitiveContent {
            content_instance: ContentInstance {
                con: con.into(),
                cnf: CONTENT_FORMAT,
            },
        });
        request
    }

    pub fn id(&self) -> &str {
        &self.primitive.rqi
    }

    pub fn originator(&self) -> &str {
        &self.primitive.fr
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A response primitive that answers a given request
#[derive(Debug, Clone)]
pub struct Response {
    body: Value,
}

impl Response {
    /// Parses `text` and checks it answers `request`
    pub fn parse(text: &str, request: &Request) -> Result<Self> {
        let body: Value = serde_json::from_str(text)?;
        let response = Self { body };

        let rqi = response.get("/m2m:rsp/rqi").map(text_of)?;
        if rqi != request.id() {
            return Err(Error::RequestIdMismatch {
                expected: request.id().to_string(),
                got: rqi,
            });
        }

        let to = response.get("/m2m:rsp/to").map(text_of)?;
        if to != request.originator() {
            return Err(Error::UnexpectedRecipient(to));
        }

        if let Some(code) = response.body.pointer("/m2m:rsp/rsc").and_then(Value::as_u64) {
            trace!("Response code {}", code);
            if code >= FIRST_ERROR_CODE {
                return Err(Error::Rejected(code));
            }
        }

        Ok(response)
    }

    /// Looks up a field by slash separated path, the leading slash being optional
    pub fn get(&self, path: &str) -> Result<&Value> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(&self.body);
        }

        self.body
            .pointer(&format!("/{trimmed}"))
            .ok_or_else(|| {
                error!("Could not get {}. Maybe the unit is starting up?", path);
                Error::MissingField(path.to_string())
            })
    }

    /// The content value of a retrieved resource
    pub fn content(&self) -> Result<&Value> {
        self.get(CONTENT_PATH)
    }

    pub fn into_value(self) -> Value {
        self.body
    }
}

/// Text form of a value: strings as is, anything else as JSON
pub fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Numeric value, given either as a JSON number or as a numeric string
pub fn number_of(value: &Value) -> Result<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    number.ok_or_else(|| Error::InvalidValue(value.to_string()))
}
