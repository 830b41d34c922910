pub mod eligibility;
pub mod executor;
pub mod lifecycle;
pub mod oanda;
pub mod pocket;
pub mod sync;

pub use eligibility::{EligibleSet, PayoutEntry};
pub use executor::BrokerExecutor;
pub use lifecycle::{CycleOutcome, Engine, EngineHandle, EngineParts};
pub use oanda::OandaClient;
pub use pocket::PocketOptionClient;
pub use sync::CandleSync;
