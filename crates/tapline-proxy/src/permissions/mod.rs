//! Minimal-permission inference.
//!
//! After a recording stops, bearer-authenticated requests are grouped by API
//! surface and permission type, looked up in a ranked scope catalog, and
//! reduced to the smallest set of scopes the greedy heuristic finds. Scopes
//! presented but not needed are reported as excess.

mod catalog;
mod credential;
mod plugin;
mod solver;
mod types;

pub use catalog::{
    CatalogError, CatalogRequest, CatalogSource, FileCatalogSource, HttpCatalogSource,
    PermissionCatalogLoader, DEFAULT_CATALOG_TIMEOUT,
};
pub use credential::{bearer_token, decode_credential, CredentialError, PresentedCredential};
pub use plugin::{
    CatalogConfig, MinimalPermissionsConfig, MinimalPermissionsPlugin, PERMISSIONS_PLUGIN_NAME,
    REPORT_KEY,
};
pub use solver::{choose_scopes, MinimalPermissionSolver, ObservedGroup, Observations};
pub use types::{
    CatalogFetchError, CatalogResponse, CatalogResult, MinimalScopeSolution, PermissionCatalog,
    PermissionReport, PermissionType,
};
