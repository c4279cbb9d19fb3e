//! Typed operations over the Tibber client

use super::client::TibberClient;
use super::queries;
use super::TibberError;
use crate::model::{null_as_default, Consumption, Home, Price, PriceInfo, Production, Resolution};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct Viewer<T> {
    viewer: T,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct HomeList<T> {
    #[serde(default, deserialize_with = "null_as_default")]
    homes: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct SingleHome<T> {
    #[serde(default)]
    home: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Nodes<T> {
    #[serde(default, deserialize_with = "null_as_default")]
    nodes: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ConsumptionHome {
    #[serde(default, deserialize_with = "null_as_default")]
    consumption: Nodes<Consumption>,
}

#[derive(Debug, Deserialize)]
struct ProductionHome {
    #[serde(default, deserialize_with = "null_as_default")]
    production: Nodes<Production>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceHome {
    id: String,
    #[serde(default)]
    current_subscription: Option<Subscription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Subscription {
    #[serde(default, deserialize_with = "null_as_default")]
    price_info: PriceInfo,
}

/// Home listing and capability checks
#[derive(Clone)]
pub struct HomeService {
    client: Arc<TibberClient>,
}

impl HomeService {
    pub fn new(client: Arc<TibberClient>) -> Self {
        Self { client }
    }

    /// Basic information for every home on the account
    pub async fn homes(&self) -> Result<Vec<Home>, TibberError> {
        let data: Viewer<HomeList<Home>> = self.client.query(queries::HOMES, None).await?;
        Ok(data.viewer.homes)
    }

    /// Full details for every home on the account
    pub async fn home_details(&self) -> Result<Vec<Home>, TibberError> {
        let data: Viewer<HomeList<Home>> = self.client.query(queries::HOME_DETAILS, None).await?;
        tracing::debug!(count = data.viewer.homes.len(), "Fetched home details");
        Ok(data.viewer.homes)
    }

    pub async fn homes_with_production(&self) -> Result<Vec<Home>, TibberError> {
        Ok(self
            .home_details()
            .await?
            .into_iter()
            .filter(Home::has_production)
            .collect())
    }

    /// Confirm the home exists and supports real-time measurements
    pub async fn verify_realtime(&self, home_id: &str) -> Result<Home, TibberError> {
        let home = self
            .home_details()
            .await?
            .into_iter()
            .find(|h| h.id == home_id)
            .ok_or_else(|| TibberError::HomeNotFound(home_id.to_string()))?;

        if !home.realtime_enabled() {
            return Err(TibberError::RealtimeDisabled(home_id.to_string()));
        }
        Ok(home)
    }
}

/// Consumption and production history
#[derive(Clone)]
pub struct EnergyService {
    client: Arc<TibberClient>,
}

impl EnergyService {
    pub fn new(client: Arc<TibberClient>) -> Self {
        Self { client }
    }

    pub async fn consumption(
        &self,
        home_id: &str,
        resolution: Resolution,
        last: u32,
    ) -> Result<Vec<Consumption>, TibberError> {
        let variables = json!({"homeId": home_id, "resolution": resolution, "last": last});
        let data: Viewer<SingleHome<ConsumptionHome>> =
            self.client.query(queries::CONSUMPTION, Some(variables)).await?;

        let home = data
            .viewer
            .home
            .ok_or_else(|| TibberError::HomeNotFound(home_id.to_string()))?;
        Ok(home.consumption.nodes)
    }

    pub async fn production(
        &self,
        home_id: &str,
        resolution: Resolution,
        last: u32,
    ) -> Result<Vec<Production>, TibberError> {
        let variables = json!({"homeId": home_id, "resolution": resolution, "last": last});
        let data: Viewer<SingleHome<ProductionHome>> =
            self.client.query(queries::PRODUCTION, Some(variables)).await?;

        let home = data
            .viewer
            .home
            .ok_or_else(|| TibberError::HomeNotFound(home_id.to_string()))?;
        Ok(home.production.nodes)
    }
}

/// Day-ahead prices
#[derive(Clone)]
pub struct PriceService {
    client: Arc<TibberClient>,
}

impl PriceService {
    pub fn new(client: Arc<TibberClient>) -> Self {
        Self { client }
    }

    /// Prices for one home. The underlying query lists every home on the
    /// account; the requested one is picked out.
    pub async fn prices(&self, home_id: &str) -> Result<PriceInfo, TibberError> {
        let data: Viewer<HomeList<PriceHome>> = self.client.query(queries::PRICES, None).await?;
        select_price_info(data.viewer.homes, home_id)
    }

    pub async fn current_price(&self, home_id: &str) -> Result<Price, TibberError> {
        let info = self.prices(home_id).await?;
        if !info.has_current() {
            return Err(TibberError::NoCurrentPrice(home_id.to_string()));
        }
        Ok(info.current)
    }

    pub async fn lowest_price(
        &self,
        home_id: &str,
        include_tomorrow: bool,
    ) -> Result<Option<Price>, TibberError> {
        let info = self.prices(home_id).await?;
        Ok(info.lowest(include_tomorrow).cloned())
    }
}

fn select_price_info(homes: Vec<PriceHome>, home_id: &str) -> Result<PriceInfo, TibberError> {
    let home = homes
        .into_iter()
        .find(|h| h.id == home_id)
        .ok_or_else(|| TibberError::HomeNotFound(home_id.to_string()))?;

    Ok(home
        .current_subscription
        .map(|s| s.price_info)
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tibber::client::tests::{serve_graphql, test_config};
    use serde_json::json;

    async fn client_for(response: serde_json::Value) -> Arc<TibberClient> {
        let url = serve_graphql(response).await;
        Arc::new(TibberClient::new(test_config(url)).unwrap())
    }

    fn homes_response() -> serde_json::Value {
        json!({"data": {"viewer": {"homes": [
            {
                "id": "home-1",
                "appNickname": "Huis",
                "meteringPointData": {"consumptionEan": "871", "productionEan": "872"},
                "features": {"realTimeConsumptionEnabled": true}
            },
            {
                "id": "home-2",
                "appNickname": "Flat",
                "meteringPointData": {"consumptionEan": "873", "productionEan": null},
                "features": {"realTimeConsumptionEnabled": false}
            }
        ]}}})
    }

    #[tokio::test]
    async fn test_homes_with_production() {
        let service = HomeService::new(client_for(homes_response()).await);
        let homes = service.homes_with_production().await.unwrap();
        assert_eq!(homes.len(), 1);
        assert_eq!(homes[0].id, "home-1");
    }

    #[tokio::test]
    async fn test_verify_realtime() {
        let service = HomeService::new(client_for(homes_response()).await);

        assert_eq!(service.verify_realtime("home-1").await.unwrap().id, "home-1");
        assert!(matches!(
            service.verify_realtime("home-2").await,
            Err(TibberError::RealtimeDisabled(_))
        ));
        assert!(matches!(
            service.verify_realtime("home-9").await,
            Err(TibberError::HomeNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_consumption_nodes() {
        let response = json!({"data": {"viewer": {"home": {"consumption": {"nodes": [
            {"from": "2024-03-01T00:00:00.000+01:00", "to": "2024-03-02T00:00:00.000+01:00",
             "cost": 2.1, "consumption": 7.0, "currency": "EUR"},
            {"from": "2024-03-02T00:00:00.000+01:00", "to": "2024-03-03T00:00:00.000+01:00",
             "cost": null, "consumption": null, "currency": "EUR"}
        ]}}}}});
        let service = EnergyService::new(client_for(response).await);

        let rows = service.consumption("home-1", Resolution::Daily, 7).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].consumption, 7.0);
        assert_eq!(rows[1].cost, 0.0);
    }

    #[test]
    fn test_single_home_without_home_key() {
        let data: Viewer<SingleHome<ConsumptionHome>> =
            serde_json::from_value(json!({"viewer": {}})).unwrap();
        assert!(data.viewer.home.is_none());

        let data: Viewer<SingleHome<ProductionHome>> = serde_json::from_value(
            json!({"viewer": {"home": {"production": {"nodes": [{"from": "a", "to": "b", "production": 1.5}]}}}}),
        )
        .unwrap();
        assert_eq!(data.viewer.home.unwrap().production.nodes[0].production, 1.5);
    }

    #[tokio::test]
    async fn test_missing_home_for_energy() {
        let response = json!({"data": {"viewer": {"home": null}}});
        let service = EnergyService::new(client_for(response).await);

        let err = service.production("nope", Resolution::Daily, 7).await.unwrap_err();
        assert!(matches!(err, TibberError::HomeNotFound(ref id) if id == "nope"));
    }

    #[tokio::test]
    async fn test_prices_select_requested_home() {
        let response = json!({"data": {"viewer": {"homes": [
            {"id": "home-1", "currentSubscription": {"priceInfo": {
                "current": {"total": 0.31, "startsAt": "2024-03-02T10:00:00.000+01:00", "currency": "EUR"},
                "today": [
                    {"total": 0.31, "startsAt": "2024-03-02T10:00:00.000+01:00", "currency": "EUR"},
                    {"total": 0.22, "startsAt": "2024-03-02T11:00:00.000+01:00", "currency": "EUR"}
                ],
                "tomorrow": []
            }}},
            {"id": "home-2", "currentSubscription": null}
        ]}}});
        let service = PriceService::new(client_for(response).await);

        let current = service.current_price("home-1").await.unwrap();
        assert_eq!(current.starts_at, "2024-03-02T10:00:00.000+01:00");

        let lowest = service.lowest_price("home-1", true).await.unwrap().unwrap();
        assert_eq!(lowest.starts_at, "2024-03-02T11:00:00.000+01:00");

        assert!(matches!(
            service.current_price("home-2").await,
            Err(TibberError::NoCurrentPrice(_))
        ));
        assert!(matches!(
            service.prices("home-3").await,
            Err(TibberError::HomeNotFound(_))
        ));
    }
}
