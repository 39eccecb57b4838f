//! Disposal site registration and listing.

use tracing::{info, warn};

use crate::error::{EngineError, WriteRef};
use crate::gateway::LedgerGateway;
use crate::intake::validate_location;
use crate::model::{DepositSettings, DisposalSite, Location, NewDisposalSite, WasteType};
use crate::ports::{Collection, Filter, Projection};

/// Disposal site as submitted by its operator.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteDraft {
    /// Display name.
    pub name: String,
    /// Address and coordinates.
    pub location: Location,
    /// Categories the site takes.
    pub accepted_waste_types: Vec<WasteType>,
    /// Store a settings row enabling payments.
    pub payment_enabled: bool,
}

/// Registers and lists disposal sites.
#[derive(Clone, Copy)]
pub struct SiteRegistry<'a> {
    ledger: LedgerGateway<'a>,
}

impl<'a> SiteRegistry<'a> {
    /// Registry writing through `ledger`.
    #[must_use]
    pub fn new(ledger: LedgerGateway<'a>) -> Self {
        Self { ledger }
    }

    /// Store a site and, when payments are enabled, its settings row.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Validation`] for a blank name, no accepted category or
    ///   an invalid location.
    /// - [`EngineError::Upstream`] when the site cannot be stored.
    /// - [`EngineError::PartialFailure`] when the site landed but its settings
    ///   did not.
    pub async fn register(&self, draft: SiteDraft) -> Result<DisposalSite, EngineError> {
        if draft.name.trim().is_empty() {
            return Err(EngineError::invalid("name", "Name is required"));
        }
        if draft.accepted_waste_types.is_empty() {
            return Err(EngineError::invalid(
                "acceptedWasteTypes",
                "At least one accepted waste type is required",
            ));
        }
        validate_location(&draft.location)?;

        let record = NewDisposalSite {
            name: draft.name,
            address: draft.location.address,
            lat: draft.location.lat,
            lng: draft.location.lng,
            accepted_waste_types: draft.accepted_waste_types,
        };
        let mut site: DisposalSite = self
            .ledger
            .create(Collection::DisposalSites, &record)
            .await?;
        info!(site_id = %site.id, name = %site.name, "disposal site registered");

        if !draft.payment_enabled {
            return Ok(site);
        }
        let settings = DepositSettings {
            deposit_id: site.id.clone(),
            payment_enabled: true,
        };
        match self
            .ledger
            .create::<_, DepositSettings>(Collection::DepositSettings, &settings)
            .await
        {
            Ok(stored) => {
                site.deposit_settings.push(stored);
                Ok(site)
            }
            Err(err) => {
                warn!(site_id = %site.id, error = %err, "site stored without its payment settings");
                Err(err.after_writes(
                    "register_deposit_site",
                    vec![WriteRef::new(Collection::DisposalSites, &site.id)],
                    "create_deposit_settings",
                ))
            }
        }
    }

    /// Every site with its settings embedded.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Upstream`] when the ledger fails.
    pub async fn list(&self) -> Result<Vec<DisposalSite>, EngineError> {
        self.ledger
            .query_with(
                Collection::DisposalSites,
                &Filter::new(),
                &Projection::embedding(&[Collection::DepositSettings]),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SiteId;
    use crate::ports::Credential;
    use crate::testing::MemoryLedger;

    fn draft(payment_enabled: bool) -> SiteDraft {
        SiteDraft {
            name: "Déchèterie de la Grange David".to_owned(),
            location: Location {
                address: "Rue de la Grange David, Tours".to_owned(),
                lat: 47.37,
                lng: 0.70,
            },
            accepted_waste_types: vec![WasteType::Furniture, WasteType::Rubble],
            payment_enabled,
        }
    }

    #[tokio::test]
    async fn payment_enabled_sites_get_a_settings_row() {
        let ledger = MemoryLedger::default();
        let credential = Credential::bearer("operator-token");
        let registry = SiteRegistry::new(LedgerGateway::new(&ledger, &credential));

        let site = registry.register(draft(true)).await.expect("registered");

        assert!(site.payment_enabled(), "settings attached");
        let listed = registry.list().await.expect("listed");
        assert_eq!(listed.len(), 1, "one site");
        assert!(
            listed.first().is_some_and(DisposalSite::payment_enabled),
            "settings embedded on listing"
        );
    }

    #[tokio::test]
    async fn sites_without_payment_write_once() {
        let ledger = MemoryLedger::default();
        let credential = Credential::bearer("t");

        let site = SiteRegistry::new(LedgerGateway::new(&ledger, &credential))
            .register(draft(false))
            .await
            .expect("registered");

        assert!(!site.payment_enabled(), "no settings");
        assert_eq!(ledger.writes(), 1, "only the site row");
        assert!(ledger.rows(Collection::DepositSettings).is_empty(), "no settings row");
    }

    #[tokio::test]
    async fn failed_settings_report_the_stored_site() {
        let ledger = MemoryLedger::default();
        ledger.fail_next_write(Collection::DepositSettings);
        let credential = Credential::bearer("t");

        let err = SiteRegistry::new(LedgerGateway::new(&ledger, &credential))
            .register(draft(true))
            .await
            .expect_err("settings fail");

        let EngineError::PartialFailure(partial) = err else {
            unreachable!("expected a partial failure");
        };
        assert_eq!(partial.failed_step, "create_deposit_settings", "failing step");
        assert_eq!(
            partial.committed,
            vec![WriteRef::new(Collection::DisposalSites, SiteId::from("disposal_sites-1"))],
            "site committed"
        );
    }

    #[tokio::test]
    async fn sites_need_a_name_and_categories() {
        let ledger = MemoryLedger::default();
        let credential = Credential::bearer("t");
        let registry = SiteRegistry::new(LedgerGateway::new(&ledger, &credential));

        let mut unnamed = draft(false);
        unnamed.name = "  ".to_owned();
        let mut no_types = draft(false);
        no_types.accepted_waste_types.clear();

        for (bad, field) in [(unnamed, "name"), (no_types, "acceptedWasteTypes")] {
            let err = registry.register(bad).await.expect_err("rejected");
            assert_eq!(err.fields(), [field], "{err}");
        }
        assert!(ledger.calls().is_empty(), "no ledger traffic");
    }
}
