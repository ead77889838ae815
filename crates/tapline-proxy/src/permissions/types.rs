//! Permission data model: scope types, the ranked catalog and solver output.

use crate::matching::OperationKey;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionType {
    /// Scopes granted to a user-delegated credential (`scp` claim)
    Delegated,
    /// Roles granted to the application itself (`roles` claim)
    Application,
}

impl PermissionType {
    pub const ALL: [PermissionType; 2] = [PermissionType::Delegated, PermissionType::Application];

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionType::Delegated => "delegated",
            PermissionType::Application => "application",
        }
    }
}

impl fmt::Display for PermissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire shape returned by catalog sources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogResponse {
    #[serde(default)]
    pub results: Vec<CatalogResult>,
    #[serde(default)]
    pub errors: Vec<CatalogFetchError>,
}

/// One ranked entry: `operation` is `"METHOD /tokenized/path"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogResult {
    pub operation: String,
    pub scope: String,
}

/// A request the catalog source could not resolve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogFetchError {
    pub url: String,
    pub message: String,
}

type CatalogKey = (String, PermissionType, OperationKey);

/// Operation → scopes ranked least to most privileged, per API surface and
/// permission type. The same path on two hosts never shares an entry.
#[derive(Debug, Clone, Default)]
pub struct PermissionCatalog {
    entries: HashMap<CatalogKey, Vec<String>>,
}

impl PermissionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a source response answering lookups for `api_surface`.
    /// Results for the same operation keep response order; unparseable
    /// operations are skipped.
    pub fn from_response(
        api_surface: &str,
        permission_type: PermissionType,
        response: &CatalogResponse,
    ) -> Self {
        let mut catalog = Self::new();
        for result in &response.results {
            match result.operation.parse::<OperationKey>() {
                Ok(key) => catalog.push(api_surface, permission_type, key, &result.scope),
                Err(e) => debug!("Skipping catalog entry: {e}"),
            }
        }
        catalog
    }

    fn push(
        &mut self,
        api_surface: &str,
        permission_type: PermissionType,
        key: OperationKey,
        scope: &str,
    ) {
        let scopes = self
            .entries
            .entry((api_surface.to_string(), permission_type, key))
            .or_default();
        if !scopes.iter().any(|s| s == scope) {
            scopes.push(scope.to_string());
        }
    }

    pub fn insert(
        &mut self,
        api_surface: &str,
        permission_type: PermissionType,
        key: OperationKey,
        ranked_scopes: Vec<String>,
    ) {
        self.entries
            .insert((api_surface.to_string(), permission_type, key), ranked_scopes);
    }

    pub fn get(
        &self,
        api_surface: &str,
        permission_type: PermissionType,
        key: &OperationKey,
    ) -> Option<&[String]> {
        self.entries
            .get(&(api_surface.to_string(), permission_type, key.clone()))
            .map(Vec::as_slice)
    }

    pub fn contains(
        &self,
        api_surface: &str,
        permission_type: PermissionType,
        key: &OperationKey,
    ) -> bool {
        self.get(api_surface, permission_type, key).is_some()
    }

    /// Entries from `other` replace entries for the same key.
    pub fn merge(&mut self, other: PermissionCatalog) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of the solver for one API surface and permission type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinimalScopeSolution {
    /// `scheme://host[:port]`
    pub api_surface: String,
    pub permission_type: PermissionType,
    pub operations: BTreeSet<OperationKey>,
    pub presented_scopes: BTreeSet<String>,
    pub minimal_scopes: BTreeSet<String>,
    pub excess_scopes: BTreeSet<String>,
    pub unmatched_operations: BTreeSet<OperationKey>,
    pub uses_minimal_permissions: bool,
}

/// Everything the permission analysis found in one recording.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionReport {
    pub solutions: Vec<MinimalScopeSolution>,
    /// Requests that carried no usable bearer credential
    pub requests_without_token: usize,
}

impl PermissionReport {
    pub fn uses_minimal_permissions(&self) -> bool {
        self.solutions.iter().all(|s| s.uses_minimal_permissions)
    }

    pub fn solution(
        &self,
        api_surface: &str,
        permission_type: PermissionType,
    ) -> Option<&MinimalScopeSolution> {
        self.solutions
            .iter()
            .find(|s| s.api_surface == api_surface && s.permission_type == permission_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_from_response_keeps_rank_order() {
        let response: CatalogResponse = serde_json::from_str(
            r#"{
                "results": [
                    {"operation": "GET /v1.0/users/{id}", "scope": "User.ReadBasic.All"},
                    {"operation": "GET /v1.0/users/{id}", "scope": "User.Read.All"},
                    {"operation": "GET /v1.0/users/{id}", "scope": "User.ReadBasic.All"},
                    {"operation": "garbage", "scope": "X"}
                ],
                "errors": [{"url": "/v1.0/nope", "message": "not found"}]
            }"#,
        )
        .unwrap();
        let catalog =
            PermissionCatalog::from_response("https://api.test", PermissionType::Delegated, &response);
        let key = OperationKey::new("GET", "/v1.0/users/42");
        assert_eq!(
            catalog
                .get("https://api.test", PermissionType::Delegated, &key)
                .unwrap(),
            &["User.ReadBasic.All".to_string(), "User.Read.All".to_string()]
        );
        assert!(!catalog.contains("https://api.test", PermissionType::Application, &key));
        assert!(!catalog.contains("https://other.test", PermissionType::Delegated, &key));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let report = PermissionReport {
            solutions: vec![MinimalScopeSolution {
                api_surface: "https://api.test".into(),
                permission_type: PermissionType::Application,
                operations: [OperationKey::new("GET", "/me")].into(),
                presented_scopes: ["A".to_string()].into(),
                minimal_scopes: ["A".to_string()].into(),
                excess_scopes: BTreeSet::new(),
                unmatched_operations: BTreeSet::new(),
                uses_minimal_permissions: true,
            }],
            requests_without_token: 0,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["solutions"][0]["permissionType"], "application");
        assert_eq!(json["solutions"][0]["operations"][0], "GET /me");
        assert_eq!(json["solutions"][0]["usesMinimalPermissions"], true);
    }
}
