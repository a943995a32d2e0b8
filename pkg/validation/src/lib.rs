//! Read-only verification of a provisioned workshop.

pub mod error;
pub mod harness;
pub mod probe;
pub mod report;

pub use error::{Result, ValidationError};
pub use harness::{ValidationScope, validate};
pub use report::{CheckResult, CheckStatus, TestReport};
