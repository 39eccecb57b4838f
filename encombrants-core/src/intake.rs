//! Pickup request intake and cancellation.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::{EngineError, WriteRef};
use crate::gateway::{LedgerGateway, StatusPatch};
use crate::model::{
    AvailabilityWindow, Location, NewAvailabilityWindow, NewRequest, Request, RequestId,
    RequestStatus, SubjectId, WasteType,
};
use crate::ports::{Collection, Filter};

/// Time span offered by the client, before it is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowDraft {
    /// Window start.
    pub start: DateTime<Utc>,
    /// Window end, strictly after `start`.
    pub end: DateTime<Utc>,
}

/// Pickup request as submitted by a client.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDraft {
    /// Categories in the client's order.
    pub waste_types: Vec<WasteType>,
    /// Cubic meters.
    pub volume: f64,
    /// Kilograms.
    pub weight: Option<f64>,
    /// Photo references.
    pub photos: Vec<String>,
    /// Pickup place.
    pub location: Location,
    /// Free text.
    pub description: Option<String>,
    /// Offered pickup windows, possibly none.
    pub windows: Vec<WindowDraft>,
}

impl RequestDraft {
    /// Check the draft's domain rules.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] naming the first offending field.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.waste_types.is_empty() {
            return Err(EngineError::invalid(
                "wasteType",
                "At least one waste type is required",
            ));
        }
        if !self.volume.is_finite() || self.volume <= 0.0 {
            return Err(EngineError::invalid("volume", "Volume must be greater than 0"));
        }
        if self
            .weight
            .is_some_and(|weight| !weight.is_finite() || weight < 0.0)
        {
            return Err(EngineError::invalid("weight", "Weight must not be negative"));
        }
        validate_location(&self.location)?;
        if self.windows.iter().any(|window| window.end <= window.start) {
            return Err(EngineError::invalid(
                "availabilityWindows",
                "Availability windows must end after they start",
            ));
        }
        Ok(())
    }
}

/// Reject blank addresses and out-of-range coordinates.
///
/// # Errors
///
/// Returns [`EngineError::Validation`] naming the offending `location.*` field.
pub fn validate_location(location: &Location) -> Result<(), EngineError> {
    if location.address.trim().is_empty() {
        return Err(EngineError::invalid("location.address", "Address is required"));
    }
    if !(-90.0..=90.0).contains(&location.lat) {
        return Err(EngineError::invalid(
            "location.lat",
            "Latitude must be between -90 and 90",
        ));
    }
    if !(-180.0..=180.0).contains(&location.lng) {
        return Err(EngineError::invalid(
            "location.lng",
            "Longitude must be between -180 and 180",
        ));
    }
    Ok(())
}

/// Creates, reads and cancels pickup requests.
#[derive(Clone, Copy)]
pub struct RequestIntake<'a> {
    ledger: LedgerGateway<'a>,
}

impl<'a> RequestIntake<'a> {
    /// Intake writing through `ledger`.
    #[must_use]
    pub fn new(ledger: LedgerGateway<'a>) -> Self {
        Self { ledger }
    }

    /// Store a pending request for `client`, then its availability windows.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Validation`] when the draft breaks a domain rule.
    /// - [`EngineError::Upstream`] when the request cannot be stored.
    /// - [`EngineError::PartialFailure`] when the request landed but its
    ///   windows did not.
    pub async fn create(
        &self,
        client: &SubjectId,
        draft: RequestDraft,
    ) -> Result<Request, EngineError> {
        draft.validate()?;

        let record = NewRequest {
            client_id: client.clone(),
            status: RequestStatus::Pending,
            waste_types: draft.waste_types,
            volume: draft.volume,
            weight: draft.weight,
            photos: draft.photos,
            location_address: draft.location.address,
            location_lat: draft.location.lat,
            location_lng: draft.location.lng,
            description: draft.description,
        };
        let mut request: Request = self.ledger.create(Collection::Requests, &record).await?;
        info!(request_id = %request.id, %client, "request created");

        if draft.windows.is_empty() {
            return Ok(request);
        }
        let windows: Vec<NewAvailabilityWindow> = draft
            .windows
            .iter()
            .map(|window| NewAvailabilityWindow {
                request_id: request.id.clone(),
                start_time: window.start,
                end_time: window.end,
            })
            .collect();
        match self
            .ledger
            .create_many(Collection::AvailabilityWindows, &windows)
            .await
        {
            Ok(stored) => {
                request.availability_windows = stored;
                Ok(request)
            }
            Err(err) => {
                warn!(request_id = %request.id, error = %err, "request stored without its windows");
                Err(err.after_writes(
                    "create_request",
                    vec![WriteRef::new(Collection::Requests, &request.id)],
                    "create_availability_windows",
                ))
            }
        }
    }

    /// Requests visible to the subject, in ledger order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Upstream`] when the ledger fails.
    pub async fn list(&self) -> Result<Vec<Request>, EngineError> {
        self.ledger.query(Collection::Requests, &Filter::new()).await
    }

    /// One request with its availability windows.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for an unknown request and
    /// [`EngineError::Upstream`] when the ledger fails.
    pub async fn get(&self, request_id: &RequestId) -> Result<Request, EngineError> {
        let mut request: Request = self
            .ledger
            .find(Collection::Requests, "request", &request_id.0)
            .await?;
        let mut windows: Vec<AvailabilityWindow> = self
            .ledger
            .query(
                Collection::AvailabilityWindows,
                &Filter::by("request_id", request_id),
            )
            .await?;
        windows.sort_by_key(|window| window.start_time);
        request.availability_windows = windows;
        Ok(request)
    }

    /// Withdraw a request that is still pending.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] for an unknown request.
    /// - [`EngineError::Conflict`] when the request is no longer pending.
    /// - [`EngineError::Upstream`] when the ledger fails.
    pub async fn cancel(&self, request_id: &RequestId) -> Result<Request, EngineError> {
        let cancelled: Vec<Request> = self
            .ledger
            .update(
                Collection::Requests,
                &Filter::by("id", request_id).equal("status", RequestStatus::Pending),
                &StatusPatch {
                    status: RequestStatus::Cancelled,
                },
            )
            .await?;
        if let Some(request) = cancelled.into_iter().next() {
            info!(%request_id, "request cancelled");
            return Ok(request);
        }

        let current: Request = self
            .ledger
            .find(Collection::Requests, "request", &request_id.0)
            .await?;
        Err(EngineError::Conflict(format!(
            "Request {request_id} is {} and cannot be cancelled",
            current.status
        )))
    }
}
