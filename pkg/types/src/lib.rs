pub mod batch;
pub mod config;
pub mod identity;
pub mod namespace;
pub mod quantity;
pub mod quota;
pub mod rbac;
pub mod snapshot;
pub mod validate;
pub mod workspace;
