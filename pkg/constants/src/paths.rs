//! Filesystem path constants.

/// Default config file path for `workshopctl`.
pub const DEFAULT_CONFIG: &str = "/etc/workshop/config.yaml";

/// Default path of the JSON artifact written by `--validate`.
pub const DEFAULT_VALIDATION_REPORT: &str = "workshop-validation.json";
