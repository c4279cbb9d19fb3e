//! GraphQL documents sent to the Tibber API

/// Basic home list
pub const HOMES: &str = r#"
query {
    viewer {
        homes {
            id
            timeZone
            type
            size
            numberOfResidents
            appNickname
        }
    }
}
"#;

/// Full home details including metering point data and features
pub const HOME_DETAILS: &str = r#"
query {
    viewer {
        homes {
            id
            timeZone
            type
            size
            numberOfResidents
            appNickname
            appAvatar
            mainFuseSize
            address {
                address1
                address2
                address3
                postalCode
                city
                country
                latitude
                longitude
            }
            meteringPointData {
                consumptionEan
                gridCompany
                gridAreaCode
                priceAreaCode
                productionEan
                energyTaxType
                vatType
                estimatedAnnualConsumption
            }
            features {
                realTimeConsumptionEnabled
            }
        }
    }
}
"#;

/// Consumption intervals. Variables: `homeId`, `resolution`, `last`.
pub const CONSUMPTION: &str = r#"
query ($homeId: ID!, $resolution: EnergyResolution!, $last: Int!) {
    viewer {
        home(id: $homeId) {
            consumption(resolution: $resolution, last: $last) {
                nodes {
                    from
                    to
                    cost
                    unitPrice
                    unitPriceVAT
                    consumption
                    consumptionUnit
                    currency
                }
            }
        }
    }
}
"#;

/// Production intervals. Variables: `homeId`, `resolution`, `last`.
pub const PRODUCTION: &str = r#"
query ($homeId: ID!, $resolution: EnergyResolution!, $last: Int!) {
    viewer {
        home(id: $homeId) {
            production(resolution: $resolution, last: $last) {
                nodes {
                    from
                    to
                    profit
                    unitPrice
                    unitPriceVAT
                    production
                    productionUnit
                    currency
                }
            }
        }
    }
}
"#;

/// Current, today's and tomorrow's prices for every home
pub const PRICES: &str = r#"
query {
    viewer {
        homes {
            id
            currentSubscription {
                priceInfo {
                    current { total energy tax startsAt level currency }
                    today { total energy tax startsAt level currency }
                    tomorrow { total energy tax startsAt level currency }
                }
            }
        }
    }
}
"#;

/// Real-time measurement subscription. Variables: `homeId`.
pub const LIVE_MEASUREMENT: &str = r#"
subscription ($homeId: ID!) {
    liveMeasurement(homeId: $homeId) {
        timestamp
        power
        powerProduction
        minPower
        averagePower
        maxPower
        maxPowerProduction
        accumulatedConsumption
        accumulatedProduction
        lastMeterConsumption
        lastMeterProduction
        currentL1
        currentL2
        currentL3
        voltagePhase1
        voltagePhase2
        voltagePhase3
    }
}
"#;
