//! Disposal site selection for a load of mixed waste.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::gateway::LedgerGateway;
use crate::model::{DisposalSite, GeoPoint, WasteType};
use crate::ports::{Collection, Filter};

/// How a site was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// The site accepts every category of the load.
    Compatible,
    /// No site accepts the whole load; the first site in ledger order was
    /// taken instead of reporting a miss.
    FallbackFirstSite,
}

/// Site chosen for a load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteSelection {
    /// Selected site.
    pub site: DisposalSite,
    /// Whether the selection is a real match or the fallback.
    pub kind: MatchKind,
}

/// Straight-line distance treating latitude and longitude as a flat plane.
///
/// Only used to rank candidates; travel metrics come from the routing service.
#[must_use]
pub fn planar_distance(from: GeoPoint, to: GeoPoint) -> f64 {
    (to.lat - from.lat).hypot(to.lng - from.lng)
}

/// Pick the closest site accepting all of `waste_types`, or fall back to the
/// first site when none does.
///
/// Ties keep the site listed first. Returns `None` only when `sites` is empty.
#[must_use]
pub fn select_site<'s>(
    sites: &'s [DisposalSite],
    waste_types: &BTreeSet<WasteType>,
    reference: GeoPoint,
) -> Option<(&'s DisposalSite, MatchKind)> {
    let closest = sites
        .iter()
        .filter(|site| site.accepts_all(waste_types))
        .min_by(|left, right| {
            planar_distance(reference, left.position())
                .total_cmp(&planar_distance(reference, right.position()))
        });

    match closest {
        Some(site) => Some((site, MatchKind::Compatible)),
        None => sites.first().map(|site| (site, MatchKind::FallbackFirstSite)),
    }
}

/// Loads disposal sites from the ledger and applies [`select_site`].
#[derive(Clone, Copy)]
pub struct SiteMatcher<'a> {
    ledger: LedgerGateway<'a>,
}

impl<'a> SiteMatcher<'a> {
    /// Matcher reading sites through `ledger`.
    #[must_use]
    pub fn new(ledger: LedgerGateway<'a>) -> Self {
        Self { ledger }
    }

    /// Select the site for a load collected last at `reference`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Upstream`] when the sites cannot be loaded.
    pub async fn select(
        &self,
        waste_types: &BTreeSet<WasteType>,
        reference: GeoPoint,
    ) -> Result<Option<SiteSelection>, EngineError> {
        let sites: Vec<DisposalSite> = self
            .ledger
            .query(Collection::DisposalSites, &Filter::new())
            .await?;

        let selection = select_site(&sites, waste_types, reference).map(|(site, kind)| {
            SiteSelection {
                site: site.clone(),
                kind,
            }
        });

        match &selection {
            Some(SiteSelection {
                site,
                kind: MatchKind::FallbackFirstSite,
            }) => warn!(
                site_id = %site.id,
                candidates = sites.len(),
                "no disposal site accepts the whole load, falling back to the first site"
            ),
            Some(SiteSelection { site, .. }) => debug!(site_id = %site.id, "disposal site matched"),
            None => warn!("no disposal sites registered"),
        }

        Ok(selection)
    }
}
