//! Execution-side components of the replay engine: taker matching, the maker
//! queue simulator, order lifecycle management, the latency scheduler, and
//! the rules/fee/risk layer.

pub mod fees;
pub mod maker;
pub mod matching;
pub mod orders;
pub mod pending;
pub mod risk;
pub mod rules;

pub use fees::{FeeModel, FeeResult};
pub use maker::{MakerParams, MakerQueueSim, RestingOrder};
pub use matching::MatchingEngine;
pub use orders::{CancelOutcome, OrderManager, OrderMetrics, ReplaceOutcome};
pub use pending::{PendingAction, PendingQueue};
pub use risk::RiskEngine;
pub use rules::RulesEngine;
