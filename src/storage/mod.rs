//! Energy Store
//!
//! SQLite persistence for everything the collector gathers:
//!
//! - **homes**: Home details as last reported by Tibber
//! - **consumption / production**: Interval rows keyed by start time
//! - **prices**: Hourly price history plus the latest `PriceInfo` per home
//! - **real_time_measurements**: Live samples, pruned by retention
//!
//! # Example
//!
//! ```rust,no_run
//! use wattboard::storage::EnergyStore;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = EnergyStore::open("./energy_data.db")?;
//!
//!     for home in store.homes()? {
//!         let rows = store.consumption(&home.id, 7)?;
//!         println!("{}: {} days of consumption", home.id, rows.len());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use store::{EnergyStore, StoreStats};
