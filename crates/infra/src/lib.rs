//! Infrastructure layer: persistence adapters, configuration, and the stock
//! service that external callers use.

pub mod clock;
pub mod config;
pub mod damage;
pub mod error;
pub mod service;
pub mod store;
pub mod warnings;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, StockConfig};
pub use damage::{DamageReceipt, DamageRecorder};
pub use error::{StockError, StockResult};
pub use service::{DamageLineInput, QuantityInput, StockService};
pub use store::{BatchStore, DamageLedger, InMemoryStockStore, IngredientCatalog, PostgresStockStore};
pub use warnings::WarningAggregator;
