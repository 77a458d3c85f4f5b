pub mod cohort;
pub mod report;
pub mod symbols;
pub mod wallet;

pub use cohort::{CohortAnalyzer, CohortScan, HolderStanding};
pub use symbols::SymbolCache;
pub use wallet::WalletAnalyzer;
