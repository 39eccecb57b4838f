//! Ledger records for pickup requests, proposals, disposal sites and routes.
//!
//! Field names follow the ledger's column names so records decode straight from
//! the store. Insert shapes (`New*`) omit server-assigned columns.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_owned())
            }
        }
    };
}

record_id!(
    /// Authenticated identity (client, collector or deposit operator).
    SubjectId
);
record_id!(
    /// Identifier of a pickup request.
    RequestId
);
record_id!(
    /// Identifier of a collector proposal.
    ProposalId
);
record_id!(
    /// Identifier of a disposal site.
    SiteId
);
record_id!(
    /// Identifier of a collection route.
    RouteId
);
record_id!(
    /// Identifier of a single route stop.
    StopId
);

/// Category of bulky waste. Unknown tags are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WasteType {
    /// Sofas, wardrobes, mattresses.
    Furniture,
    /// White goods.
    Appliances,
    /// Electrical and electronic equipment.
    Electronics,
    /// Construction rubble.
    Rubble,
    /// Garden clippings and branches.
    GreenWaste,
    /// Mixed household bulk.
    Household,
    /// Tag not known to this build.
    Other(String),
}

impl WasteType {
    /// Ledger tag for this category.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            WasteType::Furniture => "furniture",
            WasteType::Appliances => "appliances",
            WasteType::Electronics => "electronics",
            WasteType::Rubble => "rubble",
            WasteType::GreenWaste => "green_waste",
            WasteType::Household => "household",
            WasteType::Other(tag) => tag,
        }
    }
}

impl From<String> for WasteType {
    fn from(tag: String) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "furniture" => WasteType::Furniture,
            "appliances" => WasteType::Appliances,
            "electronics" => WasteType::Electronics,
            "rubble" => WasteType::Rubble,
            "green_waste" => WasteType::GreenWaste,
            "household" => WasteType::Household,
            _ => WasteType::Other(tag),
        }
    }
}

impl From<WasteType> for String {
    fn from(waste: WasteType) -> Self {
        match waste {
            WasteType::Other(tag) => tag,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for WasteType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
}

/// Postal address with coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Street address as entered by the client.
    pub address: String,
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
}

/// Lifecycle of a pickup request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Open for proposals.
    Pending,
    /// A proposal has been accepted.
    Matched,
    /// Withdrawn by the client.
    Cancelled,
}

/// Lifecycle of a collector proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    /// Awaiting the client's decision.
    Pending,
    /// Chosen by the client.
    Accepted,
    /// Declined, either explicitly or because a sibling was accepted.
    Rejected,
}

/// Lifecycle of a collection route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    /// Planned, not started.
    Scheduled,
    /// The collector is on the road.
    InProgress,
    /// Every stop reached a terminal state.
    Completed,
    /// Abandoned.
    Cancelled,
}

/// Lifecycle of a single stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopStatus {
    /// Not yet visited.
    Pending,
    /// Waste picked up.
    Completed,
    /// Passed over.
    Skipped,
}

impl StopStatus {
    /// Whether the stop counts toward route completion.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, StopStatus::Completed | StopStatus::Skipped)
    }
}

macro_rules! status_str {
    ($name:ident { $($variant:ident => $tag:literal),+ $(,)? }) => {
        impl $name {
            /// Ledger representation of the status.
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $tag),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str(self.as_str())
            }
        }
    };
}

status_str!(RequestStatus { Pending => "pending", Matched => "matched", Cancelled => "cancelled" });
status_str!(ProposalStatus { Pending => "pending", Accepted => "accepted", Rejected => "rejected" });
status_str!(RouteStatus {
    Scheduled => "scheduled",
    InProgress => "in_progress",
    Completed => "completed",
    Cancelled => "cancelled",
});
status_str!(StopStatus { Pending => "pending", Completed => "completed", Skipped => "skipped" });

/// Time span during which the client is available for a pickup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    /// Server-assigned identifier.
    pub id: String,
    /// Owning request.
    pub request_id: RequestId,
    /// Window start.
    pub start_time: DateTime<Utc>,
    /// Window end.
    pub end_time: DateTime<Utc>,
}

/// Insert shape for [`AvailabilityWindow`].
#[derive(Debug, Clone, Serialize)]
pub struct NewAvailabilityWindow {
    /// Owning request.
    pub request_id: RequestId,
    /// Window start.
    pub start_time: DateTime<Utc>,
    /// Window end.
    pub end_time: DateTime<Utc>,
}

/// Bulky-waste pickup request created by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Server-assigned identifier.
    pub id: RequestId,
    /// Owning client.
    pub client_id: SubjectId,
    /// Current status.
    pub status: RequestStatus,
    /// Waste categories, in the order the client listed them.
    pub waste_types: Vec<WasteType>,
    /// Volume in cubic meters.
    pub volume: f64,
    /// Weight in kilograms, when known.
    #[serde(default)]
    pub weight: Option<f64>,
    /// Photo references.
    #[serde(default)]
    pub photos: Option<Vec<String>>,
    /// Pickup address.
    pub location_address: String,
    /// Pickup latitude.
    pub location_lat: f64,
    /// Pickup longitude.
    pub location_lng: f64,
    /// Free-text description.
    #[serde(default)]
    pub description: Option<String>,
    /// Creation timestamp assigned by the ledger.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Availability windows, loaded separately from their own collection.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub availability_windows: Vec<AvailabilityWindow>,
}

impl Request {
    /// Pickup coordinates.
    #[must_use]
    pub fn position(&self) -> GeoPoint {
        GeoPoint {
            lat: self.location_lat,
            lng: self.location_lng,
        }
    }
}

/// Insert shape for [`Request`].
#[derive(Debug, Clone, Serialize)]
pub struct NewRequest {
    /// Owning client.
    pub client_id: SubjectId,
    /// Initial status, always pending.
    pub status: RequestStatus,
    /// Waste categories.
    pub waste_types: Vec<WasteType>,
    /// Volume in cubic meters.
    pub volume: f64,
    /// Weight in kilograms.
    pub weight: Option<f64>,
    /// Photo references.
    pub photos: Vec<String>,
    /// Pickup address.
    pub location_address: String,
    /// Pickup latitude.
    pub location_lat: f64,
    /// Pickup longitude.
    pub location_lng: f64,
    /// Free-text description.
    pub description: Option<String>,
}

/// Offer by a collector to serve a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    /// Server-assigned identifier.
    pub id: ProposalId,
    /// Target request.
    pub request_id: RequestId,
    /// Proposing collector.
    pub collector_id: SubjectId,
    /// Offered price.
    pub price: f64,
    /// Proposed pickup window start.
    pub scheduled_start: DateTime<Utc>,
    /// Proposed pickup window end.
    pub scheduled_end: DateTime<Utc>,
    /// Current status.
    pub status: ProposalStatus,
    /// Creation timestamp assigned by the ledger.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Insert shape for [`Proposal`].
#[derive(Debug, Clone, Serialize)]
pub struct NewProposal {
    /// Target request.
    pub request_id: RequestId,
    /// Proposing collector.
    pub collector_id: SubjectId,
    /// Offered price.
    pub price: f64,
    /// Proposed pickup window start.
    pub scheduled_start: DateTime<Utc>,
    /// Proposed pickup window end.
    pub scheduled_end: DateTime<Utc>,
    /// Initial status, always pending.
    pub status: ProposalStatus,
}

/// Per-site settings stored next to a disposal site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositSettings {
    /// Site the settings belong to.
    pub deposit_id: SiteId,
    /// Whether the site takes payments.
    pub payment_enabled: bool,
}

/// Destination where collected waste is deposited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisposalSite {
    /// Server-assigned identifier.
    pub id: SiteId,
    /// Display name.
    pub name: String,
    /// Postal address.
    pub address: String,
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
    /// Categories the site accepts.
    pub accepted_waste_types: Vec<WasteType>,
    /// Embedded settings, present when the query asked for them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deposit_settings: Vec<DepositSettings>,
    /// Creation timestamp assigned by the ledger.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl DisposalSite {
    /// Site coordinates.
    #[must_use]
    pub fn position(&self) -> GeoPoint {
        GeoPoint {
            lat: self.lat,
            lng: self.lng,
        }
    }

    /// Whether the site accepts every listed category.
    pub fn accepts_all<'w>(&self, waste_types: impl IntoIterator<Item = &'w WasteType>) -> bool {
        waste_types
            .into_iter()
            .all(|waste| self.accepted_waste_types.contains(waste))
    }

    /// Whether any embedded settings row enables payment.
    #[must_use]
    pub fn payment_enabled(&self) -> bool {
        self.deposit_settings
            .iter()
            .any(|settings| settings.payment_enabled)
    }
}

/// Insert shape for [`DisposalSite`].
#[derive(Debug, Clone, Serialize)]
pub struct NewDisposalSite {
    /// Display name.
    pub name: String,
    /// Postal address.
    pub address: String,
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
    /// Categories the site accepts.
    pub accepted_waste_types: Vec<WasteType>,
}

/// Planned collection tour of one collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Server-assigned identifier.
    pub id: RouteId,
    /// Owning collector.
    pub collector_id: SubjectId,
    /// Where the load ends up.
    pub disposal_site_id: SiteId,
    /// Total distance in kilometers.
    pub distance: f64,
    /// Total duration in minutes.
    pub duration: i64,
    /// Planned start.
    pub start_time: DateTime<Utc>,
    /// Planned end.
    pub end_time: DateTime<Utc>,
    /// Current status.
    pub status: RouteStatus,
    /// Creation timestamp assigned by the ledger.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Insert shape for [`Route`].
#[derive(Debug, Clone, Serialize)]
pub struct NewRoute {
    /// Owning collector.
    pub collector_id: SubjectId,
    /// Selected disposal site.
    pub disposal_site_id: SiteId,
    /// Total distance in kilometers.
    pub distance: f64,
    /// Total duration in minutes.
    pub duration: i64,
    /// Planned start.
    pub start_time: DateTime<Utc>,
    /// Planned end.
    pub end_time: DateTime<Utc>,
    /// Initial status, always scheduled.
    pub status: RouteStatus,
}

/// One pickup within a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStop {
    /// Server-assigned identifier.
    pub id: StopId,
    /// Owning route.
    pub route_id: RouteId,
    /// Request served at this stop.
    pub request_id: RequestId,
    /// 1-based position within the route.
    pub stop_order: u32,
    /// Estimated arrival.
    pub estimated_arrival: DateTime<Utc>,
    /// Current status.
    pub status: StopStatus,
}

/// Insert shape for [`RouteStop`].
#[derive(Debug, Clone, Serialize)]
pub struct NewRouteStop {
    /// Owning route.
    pub route_id: RouteId,
    /// Request served at this stop.
    pub request_id: RequestId,
    /// 1-based position within the route.
    pub stop_order: u32,
    /// Estimated arrival.
    pub estimated_arrival: DateTime<Utc>,
    /// Initial status, always pending.
    pub status: StopStatus,
}

/// A route together with its stops in visiting order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteDetails {
    /// The route record.
    pub route: Route,
    /// Stops sorted by `stop_order`.
    pub stops: Vec<RouteStop>,
}
