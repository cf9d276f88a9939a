//! Rental and purchase lifecycle over the shared document.
//!
//! Creation flips the asset and appends the transaction inside one document
//! mutation, so the "at most one open transaction per asset" invariant holds
//! at the revision that commits: a second renter who raced the first sees
//! the asset already `Rented` when the mutation re-runs.

use crate::error::DomainError;
use crate::events::{Event, EventBus};
use crate::model::{
    AssetStatus, Listing, ModerationStatus, Transaction, TransactionStatus, UserProfile,
};
use crate::store::HubStore;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

pub struct RentalEngine {
    store: Arc<HubStore>,
    events: EventBus,
}

impl RentalEngine {
    pub fn new(store: Arc<HubStore>, events: EventBus) -> Self {
        Self { store, events }
    }

    pub async fn rent(
        &self,
        asset_id: Uuid,
        renter: &UserProfile,
        days: u32,
    ) -> Result<Transaction, DomainError> {
        if days == 0 {
            return Err(DomainError::Invalid(
                "a rental must run for at least one day".to_string(),
            ));
        }
        let now = Utc::now();
        let transaction_id = Uuid::new_v4();
        let transaction = self
            .store
            .mutate(|doc| {
                let asset = doc
                    .assets
                    .iter_mut()
                    .find(|a| a.id == asset_id)
                    .ok_or_else(|| DomainError::not_found("asset", asset_id))?;
                if asset.moderation != ModerationStatus::Approved
                    || asset.status != AssetStatus::Available
                {
                    return Err(DomainError::AssetUnavailable);
                }
                let Listing::Rent { daily_rate } = asset.listing else {
                    return Err(DomainError::AssetUnavailable);
                };
                asset.status = AssetStatus::Rented;
                let transaction = Transaction {
                    id: transaction_id,
                    asset_id,
                    asset_name: asset.name.clone(),
                    renter_id: renter.id,
                    renter_name: renter.name.clone(),
                    owner_id: asset.owner_id,
                    start_date: now,
                    end_date: Some(now + Duration::days(i64::from(days))),
                    total_cost: daily_rate * u64::from(days),
                    status: TransactionStatus::PendingApproval,
                    deposit_held: true,
                };
                doc.transactions.push(transaction.clone());
                Ok(transaction)
            })
            .await?;
        self.events.send(Event::RentalStarted {
            transaction: transaction.id,
            asset: asset_id,
        });
        Ok(transaction)
    }

    pub async fn purchase(
        &self,
        asset_id: Uuid,
        buyer: &UserProfile,
    ) -> Result<Transaction, DomainError> {
        let now = Utc::now();
        let transaction_id = Uuid::new_v4();
        let transaction = self
            .store
            .mutate(|doc| {
                let asset = doc
                    .assets
                    .iter_mut()
                    .find(|a| a.id == asset_id)
                    .ok_or_else(|| DomainError::not_found("asset", asset_id))?;
                if asset.moderation != ModerationStatus::Approved
                    || asset.status != AssetStatus::Available
                {
                    return Err(DomainError::AssetUnavailable);
                }
                let Listing::Sale { price } = asset.listing else {
                    return Err(DomainError::AssetUnavailable);
                };
                asset.status = AssetStatus::Sold;
                let transaction = Transaction {
                    id: transaction_id,
                    asset_id,
                    asset_name: asset.name.clone(),
                    renter_id: buyer.id,
                    renter_name: buyer.name.clone(),
                    owner_id: asset.owner_id,
                    start_date: now,
                    end_date: None,
                    total_cost: price,
                    status: TransactionStatus::PendingApproval,
                    deposit_held: true,
                };
                doc.transactions.push(transaction.clone());
                Ok(transaction)
            })
            .await?;
        self.events.send(Event::Purchased {
            transaction: transaction.id,
            asset: asset_id,
        });
        Ok(transaction)
    }

    /// Operator transitions. `Returned` is reachable from every prior status
    /// and always reverts the asset and releases the deposit; `Disputed` is
    /// reachable from any open status and has no exit other than return.
    pub async fn advance(
        &self,
        transaction_id: Uuid,
        to: TransactionStatus,
    ) -> Result<Transaction, DomainError> {
        let transaction = self
            .store
            .mutate(|doc| {
                let index = doc
                    .transactions
                    .iter()
                    .position(|t| t.id == transaction_id)
                    .ok_or_else(|| DomainError::not_found("transaction", transaction_id))?;
                let from = doc.transactions[index].status;
                let allowed = matches!(
                    (from, to),
                    (TransactionStatus::PendingApproval, TransactionStatus::InTransit)
                        | (TransactionStatus::InTransit, TransactionStatus::Active)
                ) || (to == TransactionStatus::Returned && from != TransactionStatus::Returned)
                    || (to == TransactionStatus::Disputed && from.is_open());
                if !allowed {
                    return Err(DomainError::InvalidTransition {
                        from: from.as_str(),
                        to: to.as_str(),
                    });
                }
                let transaction = &mut doc.transactions[index];
                transaction.status = to;
                if to == TransactionStatus::Returned {
                    transaction.deposit_held = false;
                    transaction.end_date.get_or_insert(Utc::now());
                    let asset_id = transaction.asset_id;
                    if let Some(asset) = doc.assets.iter_mut().find(|a| a.id == asset_id) {
                        asset.status = AssetStatus::Available;
                    }
                }
                Ok(doc.transactions[index].clone())
            })
            .await?;
        self.events.send(Event::TransactionAdvanced {
            transaction: transaction_id,
            status: to,
        });
        Ok(transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Asset, HubDocument};
    use crate::store::MemoryHost;

    fn renter() -> UserProfile {
        UserProfile {
            id: Uuid::new_v4(),
            name: "Tariro".to_string(),
            email: "t@x.com".to_string(),
            phone: String::new(),
            role: crate::model::Role::User,
            verified: true,
            approval: crate::model::ApprovalStatus::Approved,
        }
    }

    fn asset(listing: Listing, moderation: ModerationStatus) -> Asset {
        Asset {
            id: Uuid::new_v4(),
            name: "bike-1".to_string(),
            description: "city bike".to_string(),
            handling_notes: None,
            listing,
            images: vec![],
            ownership_video: None,
            status: AssetStatus::Available,
            moderation,
            rejection_reason: None,
            owner_id: Uuid::new_v4(),
            location: "Harare".to_string(),
        }
    }

    fn engine_with(assets: Vec<Asset>) -> (RentalEngine, Arc<HubStore>) {
        let doc = HubDocument {
            assets,
            ..Default::default()
        };
        let store = Arc::new(HubStore::new(Arc::new(MemoryHost::with_document(doc))));
        (RentalEngine::new(store.clone(), EventBus::new()), store)
    }

    #[tokio::test]
    async fn renting_prices_and_flips_the_asset() {
        let a = asset(Listing::Rent { daily_rate: 100 }, ModerationStatus::Approved);
        let asset_id = a.id;
        let (engine, store) = engine_with(vec![a]);

        let transaction = engine.rent(asset_id, &renter(), 3).await.unwrap();
        assert_eq!(transaction.total_cost, 300);
        assert_eq!(transaction.status, TransactionStatus::PendingApproval);
        assert!(transaction.deposit_held);
        assert_eq!(transaction.asset_name, "bike-1");
        assert!(transaction.end_date.is_some());

        let doc = store.read().await.unwrap();
        assert_eq!(doc.assets[0].status, AssetStatus::Rented);
        assert_eq!(doc.transactions.len(), 1);
    }

    #[tokio::test]
    async fn an_occupied_asset_cannot_be_rented_again() {
        let a = asset(Listing::Rent { daily_rate: 100 }, ModerationStatus::Approved);
        let asset_id = a.id;
        let (engine, store) = engine_with(vec![a]);

        engine.rent(asset_id, &renter(), 2).await.unwrap();
        let err = engine.rent(asset_id, &renter(), 2).await.unwrap_err();
        assert!(matches!(err, DomainError::AssetUnavailable));

        // No second transaction, and the asset state is untouched.
        let doc = store.read().await.unwrap();
        assert_eq!(doc.transactions.len(), 1);
        assert_eq!(doc.assets[0].status, AssetStatus::Rented);
    }

    #[tokio::test]
    async fn unapproved_listings_cannot_transact() {
        let a = asset(Listing::Rent { daily_rate: 100 }, ModerationStatus::Pending);
        let asset_id = a.id;
        let (engine, _) = engine_with(vec![a]);
        let err = engine.rent(asset_id, &renter(), 2).await.unwrap_err();
        assert!(matches!(err, DomainError::AssetUnavailable));
    }

    #[tokio::test]
    async fn zero_day_rentals_are_refused() {
        let a = asset(Listing::Rent { daily_rate: 100 }, ModerationStatus::Approved);
        let asset_id = a.id;
        let (engine, store) = engine_with(vec![a]);
        let err = engine.rent(asset_id, &renter(), 0).await.unwrap_err();
        assert!(matches!(err, DomainError::Invalid(_)));
        assert!(store.read().await.unwrap().transactions.is_empty());
    }

    #[tokio::test]
    async fn sale_listings_cannot_be_rented_and_vice_versa() {
        let sale = asset(Listing::Sale { price: 2500 }, ModerationStatus::Approved);
        let sale_id = sale.id;
        let rent = asset(Listing::Rent { daily_rate: 50 }, ModerationStatus::Approved);
        let rent_id = rent.id;
        let (engine, _) = engine_with(vec![sale, rent]);

        assert!(matches!(
            engine.rent(sale_id, &renter(), 1).await.unwrap_err(),
            DomainError::AssetUnavailable
        ));
        assert!(matches!(
            engine.purchase(rent_id, &renter()).await.unwrap_err(),
            DomainError::AssetUnavailable
        ));
    }

    #[tokio::test]
    async fn purchases_cost_the_sale_price_and_sell_the_asset() {
        let a = asset(Listing::Sale { price: 2500 }, ModerationStatus::Approved);
        let asset_id = a.id;
        let (engine, store) = engine_with(vec![a]);

        let transaction = engine.purchase(asset_id, &renter()).await.unwrap();
        assert_eq!(transaction.total_cost, 2500);
        assert!(transaction.end_date.is_none());
        assert_eq!(
            store.read().await.unwrap().assets[0].status,
            AssetStatus::Sold
        );
    }

    #[tokio::test]
    async fn the_operator_pipeline_runs_to_return() {
        let a = asset(Listing::Rent { daily_rate: 100 }, ModerationStatus::Approved);
        let asset_id = a.id;
        let (engine, store) = engine_with(vec![a]);
        let transaction = engine.rent(asset_id, &renter(), 3).await.unwrap();

        engine
            .advance(transaction.id, TransactionStatus::InTransit)
            .await
            .unwrap();
        engine
            .advance(transaction.id, TransactionStatus::Active)
            .await
            .unwrap();
        let returned = engine
            .advance(transaction.id, TransactionStatus::Returned)
            .await
            .unwrap();

        assert_eq!(returned.status, TransactionStatus::Returned);
        assert!(!returned.deposit_held);
        let doc = store.read().await.unwrap();
        assert_eq!(doc.assets[0].status, AssetStatus::Available);
    }

    #[tokio::test]
    async fn return_reverts_the_asset_from_any_prior_status() {
        for stop_at in [
            TransactionStatus::PendingApproval,
            TransactionStatus::InTransit,
            TransactionStatus::Active,
            TransactionStatus::Disputed,
        ] {
            let a = asset(Listing::Rent { daily_rate: 100 }, ModerationStatus::Approved);
            let asset_id = a.id;
            let (engine, store) = engine_with(vec![a]);
            let transaction = engine.rent(asset_id, &renter(), 3).await.unwrap();

            match stop_at {
                TransactionStatus::InTransit => {
                    engine
                        .advance(transaction.id, TransactionStatus::InTransit)
                        .await
                        .unwrap();
                }
                TransactionStatus::Active => {
                    engine
                        .advance(transaction.id, TransactionStatus::InTransit)
                        .await
                        .unwrap();
                    engine
                        .advance(transaction.id, TransactionStatus::Active)
                        .await
                        .unwrap();
                }
                TransactionStatus::Disputed => {
                    engine
                        .advance(transaction.id, TransactionStatus::Disputed)
                        .await
                        .unwrap();
                }
                _ => {}
            }

            let returned = engine
                .advance(transaction.id, TransactionStatus::Returned)
                .await
                .unwrap();
            assert!(!returned.deposit_held);
            assert_eq!(
                store.read().await.unwrap().assets[0].status,
                AssetStatus::Available,
                "return from {:?} must free the asset",
                stop_at
            );
        }
    }

    #[tokio::test]
    async fn skipping_pipeline_stages_is_refused() {
        let a = asset(Listing::Rent { daily_rate: 100 }, ModerationStatus::Approved);
        let asset_id = a.id;
        let (engine, _) = engine_with(vec![a]);
        let transaction = engine.rent(asset_id, &renter(), 1).await.unwrap();

        let err = engine
            .advance(transaction.id, TransactionStatus::Active)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn closed_transactions_cannot_be_disputed_or_returned_twice() {
        let a = asset(Listing::Rent { daily_rate: 100 }, ModerationStatus::Approved);
        let asset_id = a.id;
        let (engine, _) = engine_with(vec![a]);
        let transaction = engine.rent(asset_id, &renter(), 1).await.unwrap();
        engine
            .advance(transaction.id, TransactionStatus::Returned)
            .await
            .unwrap();

        assert!(matches!(
            engine
                .advance(transaction.id, TransactionStatus::Disputed)
                .await
                .unwrap_err(),
            DomainError::InvalidTransition { .. }
        ));
        assert!(matches!(
            engine
                .advance(transaction.id, TransactionStatus::Returned)
                .await
                .unwrap_err(),
            DomainError::InvalidTransition { .. }
        ));
    }

    #[tokio::test]
    async fn returning_a_rental_frees_the_asset_for_the_next_renter() {
        let a = asset(Listing::Rent { daily_rate: 100 }, ModerationStatus::Approved);
        let asset_id = a.id;
        let (engine, _) = engine_with(vec![a]);

        let first = engine.rent(asset_id, &renter(), 1).await.unwrap();
        engine
            .advance(first.id, TransactionStatus::Returned)
            .await
            .unwrap();
        let second = engine.rent(asset_id, &renter(), 2).await.unwrap();
        assert_eq!(second.total_cost, 200);
    }
}
