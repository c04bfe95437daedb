pub mod builders;
pub mod mocks;
pub mod setup;

// Re-export main utilities for use by test files
#[allow(unused_imports)]
pub use builders::{EntryBuilder, SessionBuilder};
#[allow(unused_imports)]
pub use mocks::{FailureMode, FlakyStatsRepository};
#[allow(unused_imports)]
pub use setup::{TestSetup, TestSetupBuilder};
