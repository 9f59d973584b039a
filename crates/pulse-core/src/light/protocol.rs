//! JSON-over-UDP bulb protocol.
//!
//! Requests are `{"method": ..., "params": {...}}`. A `getPilot` reply carries
//! the bulb's current state in `result`; `setPilot` takes any subset of the
//! pilot fields. Absent fields are omitted on the wire, never sent as null.

use serde::{Deserialize, Serialize};

use crate::error::{LightError, Result};

pub const GET_PILOT: &str = "getPilot";
pub const SET_PILOT: &str = "setPilot";

/// Scene id bulbs report while in plain RGB / white mode.
const NO_SCENE: u16 = 0;

#[derive(Debug, Clone, Serialize)]
struct Request<'a> {
    method: &'a str,
    params: &'a Pilot,
}

/// Pilot fields shared by `getPilot` results and `setPilot` params.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pilot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimming: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub g: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub b: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp: Option<u16>,
    #[serde(rename = "sceneId", skip_serializing_if = "Option::is_none")]
    pub scene_id: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    result: Option<Pilot>,
    #[serde(default)]
    error: Option<ReplyError>,
}

#[derive(Debug, Deserialize)]
struct ReplyError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

impl Pilot {
    pub fn is_empty(&self) -> bool {
        *self == Pilot::default()
    }

    /// Smallest `setPilot` that puts a bulb back into this captured state:
    /// power and dimming if they were reported, plus one color source
    /// (scene, else RGB, else color temperature). `None` when nothing
    /// restorable was captured.
    pub fn restore_params(&self) -> Option<Pilot> {
        let mut params = Pilot {
            state: self.state,
            dimming: self.dimming,
            ..Pilot::default()
        };

        match (self.scene_id, self.r, self.g, self.b, self.temp) {
            (Some(scene), ..) if scene != NO_SCENE => params.scene_id = Some(scene),
            (_, Some(r), Some(g), Some(b), _) => {
                params.r = Some(r);
                params.g = Some(g);
                params.b = Some(b);
            }
            (.., Some(temp)) => params.temp = Some(temp),
            _ => {}
        }

        (!params.is_empty()).then_some(params)
    }
}

pub fn encode_get_pilot() -> Result<Vec<u8>> {
    encode(GET_PILOT, &Pilot::default())
}

pub fn encode_set_pilot(params: &Pilot) -> Result<Vec<u8>> {
    encode(SET_PILOT, params)
}

fn encode(method: &str, params: &Pilot) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&Request { method, params })?)
}

/// Parse a `getPilot` reply into the reported state.
pub fn decode_pilot_reply(data: &[u8]) -> Result<Pilot> {
    let reply: Reply = serde_json::from_slice(data)?;
    match (reply.result, reply.error) {
        (Some(pilot), _) => Ok(pilot),
        (None, Some(err)) => Err(LightError::Bulb {
            code: err.code,
            message: err.message,
        }),
        (None, None) => Err(LightError::NoReply),
    }
}
