//! Inbound payloads as clients send them, and their conversion to drafts.
//!
//! Payload fields are kept as raw JSON values and decoded one by one, so that
//! every missing or mistyped field can be reported by name in one error.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::arbitrator::ProposalDraft;
use crate::error::EngineError;
use crate::intake::{RequestDraft, WindowDraft};
use crate::model::{Location, RequestId, SubjectId, WasteType};
use crate::planner::RoutePlanRequest;
use crate::sites::SiteDraft;

/// Decode a JSON payload.
///
/// # Errors
///
/// Returns [`EngineError::Validation`] when `raw` is not a JSON document of
/// the expected shape.
pub fn parse_payload<T: DeserializeOwned>(raw: &str) -> Result<T, EngineError> {
    serde_json::from_str(raw).map_err(|err| EngineError::Validation {
        fields: Vec::new(),
        message: format!("Malformed payload: {err}"),
    })
}

/// Decodes payload fields, remembering the ones that are absent or mistyped.
#[derive(Default)]
struct Fields {
    missing: Vec<String>,
    invalid: Vec<String>,
}

impl Fields {
    /// A field that must be present. `null` counts as absent.
    fn required<T: DeserializeOwned>(&mut self, name: &str, raw: Option<Value>) -> Option<T> {
        match raw {
            None | Some(Value::Null) => {
                self.missing.push(name.to_owned());
                None
            }
            Some(value) => self.decode(name, value),
        }
    }

    /// A required string. Blank text counts as absent.
    fn required_text(&mut self, name: &str, raw: Option<Value>) -> Option<String> {
        let text: String = self.required(name, raw)?;
        if text.trim().is_empty() {
            self.absent(name);
            return None;
        }
        Some(text)
    }

    fn optional<T: DeserializeOwned>(&mut self, name: &str, raw: Option<Value>) -> Option<T> {
        match raw {
            None | Some(Value::Null) => None,
            Some(value) => self.decode(name, value),
        }
    }

    /// Record a field whose value was decoded but is empty.
    fn absent(&mut self, name: &str) {
        self.missing.push(name.to_owned());
    }

    fn decode<T: DeserializeOwned>(&mut self, name: &str, value: Value) -> Option<T> {
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(_) => {
                self.invalid.push(name.to_owned());
                None
            }
        }
    }

    fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.invalid.is_empty()
    }

    /// Missing fields take precedence over mistyped ones.
    fn into_error(self) -> EngineError {
        if !self.missing.is_empty() {
            return EngineError::missing(self.missing);
        }
        let message = format!("Invalid value for fields: {}", self.invalid.join(", "));
        EngineError::Validation {
            fields: self.invalid,
            message,
        }
    }
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.filter(|text| !text.trim().is_empty())
}

/// Pickup location as sent by clients.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationPayload {
    /// Street address.
    pub address: Option<Value>,
    /// Latitude.
    pub lat: Option<Value>,
    /// Longitude.
    pub lng: Option<Value>,
}

/// Availability window as sent by clients.
#[derive(Debug, Clone, Deserialize)]
pub struct WindowPayload {
    /// Window start.
    pub start: DateTime<Utc>,
    /// Window end.
    pub end: DateTime<Utc>,
}

/// Body of `createRequest`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPayload {
    /// Waste categories.
    #[serde(alias = "wasteTypes")]
    pub waste_type: Option<Value>,
    /// Cubic meters.
    pub volume: Option<Value>,
    /// Kilograms.
    pub weight: Option<Value>,
    /// Photo references.
    pub photos: Option<Value>,
    /// Pickup location.
    pub location: Option<Value>,
    /// Free text.
    pub description: Option<Value>,
    /// Offered pickup windows.
    pub availability_windows: Option<Value>,
}

impl RequestPayload {
    /// Decode the fields and build the draft.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] listing every missing or mistyped
    /// field, or the first domain rule the draft breaks.
    pub fn into_draft(self) -> Result<RequestDraft, EngineError> {
        let mut fields = Fields::default();
        let waste_types: Option<Vec<WasteType>> = fields.required("wasteType", self.waste_type);
        let volume: Option<f64> = fields.required("volume", self.volume);
        let location: LocationPayload = fields
            .optional("location", self.location)
            .unwrap_or_default();
        let address: Option<String> = fields.required("location.address", location.address);
        let lat: Option<f64> = fields.required("location.lat", location.lat);
        let lng: Option<f64> = fields.required("location.lng", location.lng);
        let weight: Option<f64> = fields.optional("weight", self.weight);
        let photos: Option<Vec<String>> = fields.optional("photos", self.photos);
        let description: Option<String> = fields.optional("description", self.description);
        let windows: Option<Vec<WindowPayload>> =
            fields.optional("availabilityWindows", self.availability_windows);

        match (waste_types, volume, address, lat, lng) {
            (Some(waste_types), Some(volume), Some(address), Some(lat), Some(lng))
                if fields.is_clean() =>
            {
                let draft = RequestDraft {
                    waste_types,
                    volume,
                    weight,
                    photos: photos.unwrap_or_default(),
                    location: Location { address, lat, lng },
                    description: non_blank(description),
                    windows: windows
                        .unwrap_or_default()
                        .into_iter()
                        .map(|window| WindowDraft {
                            start: window.start,
                            end: window.end,
                        })
                        .collect(),
                };
                draft.validate()?;
                Ok(draft)
            }
            _ => Err(fields.into_error()),
        }
    }
}

/// Body of `submitProposal`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalPayload {
    /// Target request.
    pub request_id: Option<Value>,
    /// Number or numeric string.
    pub price: Option<Value>,
    /// Proposed window start.
    pub scheduled_start: Option<Value>,
    /// Proposed window end.
    pub scheduled_end: Option<Value>,
}

/// Read a price given as a JSON number or a numeric string.
///
/// # Errors
///
/// Returns [`EngineError::Validation`] with `Invalid price value` for anything
/// that is not a finite number.
pub fn price_value(raw: &Value) -> Result<f64, EngineError> {
    let parsed = match raw {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
    };
    parsed
        .filter(|price| price.is_finite())
        .ok_or_else(|| EngineError::invalid("price", "Invalid price value"))
}

impl ProposalPayload {
    /// Decode the fields and build the draft for `collector`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] listing every missing or mistyped
    /// field, or for a price that is not a number.
    pub fn into_draft(self, collector: SubjectId) -> Result<ProposalDraft, EngineError> {
        let mut fields = Fields::default();
        let request_id = fields.required_text("requestId", self.request_id);
        let price: Option<Value> = fields.required("price", self.price);
        let scheduled_start: Option<DateTime<Utc>> =
            fields.required("scheduledStart", self.scheduled_start);
        let scheduled_end: Option<DateTime<Utc>> =
            fields.required("scheduledEnd", self.scheduled_end);

        match (request_id, price, scheduled_start, scheduled_end) {
            (Some(request_id), Some(price), Some(scheduled_start), Some(scheduled_end))
                if fields.is_clean() =>
            {
                Ok(ProposalDraft {
                    request_id: RequestId(request_id),
                    collector_id: collector,
                    price: price_value(&price)?,
                    scheduled_start,
                    scheduled_end,
                })
            }
            _ => Err(fields.into_error()),
        }
    }
}

/// Body of `computeRoute`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteComputePayload {
    /// Requests in visiting order.
    pub request_ids: Option<Value>,
    /// Collector driving the route, defaults to the caller.
    pub collector_id: Option<Value>,
    /// Planned departure.
    pub start_time: Option<Value>,
}

impl RouteComputePayload {
    /// Decode the fields and build the planning request.
    ///
    /// An empty id list passes here and is rejected by the planner.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] listing every missing or mistyped
    /// field.
    pub fn into_plan(self, caller: Option<&SubjectId>) -> Result<RoutePlanRequest, EngineError> {
        let mut fields = Fields::default();
        let request_ids: Option<Vec<String>> = fields.required("requestIds", self.request_ids);
        let collector = non_blank(fields.optional("collectorId", self.collector_id))
            .map(SubjectId)
            .or_else(|| caller.cloned());
        if collector.is_none() {
            fields.absent("collectorId");
        }
        let start_time: Option<DateTime<Utc>> = fields.required("startTime", self.start_time);

        match (request_ids, collector, start_time) {
            (Some(request_ids), Some(collector_id), Some(start_time)) if fields.is_clean() => {
                Ok(RoutePlanRequest {
                    request_ids: request_ids.into_iter().map(RequestId).collect(),
                    collector_id,
                    start_time,
                })
            }
            _ => Err(fields.into_error()),
        }
    }
}

/// Body of `registerDepositSite`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositPayload {
    /// Display name.
    pub name: Option<Value>,
    /// Postal address.
    pub address: Option<Value>,
    /// Latitude.
    pub lat: Option<Value>,
    /// Longitude.
    pub lng: Option<Value>,
    /// Categories the site takes.
    pub accepted_waste_types: Option<Value>,
    /// Whether the site takes payments, `false` when absent.
    pub payment_enabled: Option<Value>,
}

impl DepositPayload {
    /// Decode the fields and build the site draft.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] listing every missing or mistyped
    /// field.
    pub fn into_draft(self) -> Result<SiteDraft, EngineError> {
        let mut fields = Fields::default();
        let name = fields.required_text("name", self.name);
        let address = fields.required_text("address", self.address);
        let lat: Option<f64> = fields.required("lat", self.lat);
        let lng: Option<f64> = fields.required("lng", self.lng);
        let accepted: Option<Vec<WasteType>> =
            fields.required("acceptedWasteTypes", self.accepted_waste_types);
        let accepted = match accepted {
            Some(types) if types.is_empty() => {
                fields.absent("acceptedWasteTypes");
                None
            }
            other => other,
        };
        let payment_enabled: Option<bool> = fields.optional("paymentEnabled", self.payment_enabled);

        match (name, address, lat, lng, accepted) {
            (Some(name), Some(address), Some(lat), Some(lng), Some(accepted_waste_types))
                if fields.is_clean() =>
            {
                Ok(SiteDraft {
                    name,
                    location: Location { address, lat, lng },
                    accepted_waste_types,
                    payment_enabled: payment_enabled.unwrap_or(false),
                })
            }
            _ => Err(fields.into_error()),
        }
    }
}
