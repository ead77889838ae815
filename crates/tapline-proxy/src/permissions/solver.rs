//! Minimal scope inference over a recorded session.

use super::credential::{bearer_token, decode_credential, PresentedCredential};
use super::types::{MinimalScopeSolution, PermissionCatalog, PermissionReport, PermissionType};
use crate::batch::{is_batch_url, BatchExpander};
use crate::matching::{api_origin, OperationKey};
use crate::recording::{MessageType, RecordedLogEntry};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Operations and presented scopes seen for one API surface and permission type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedGroup {
    pub operations: BTreeSet<OperationKey>,
    pub presented_scopes: BTreeSet<String>,
}

/// Authenticated traffic of a session, grouped for solving.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observations {
    pub groups: BTreeMap<(String, PermissionType), ObservedGroup>,
    pub requests_without_token: usize,
}

impl Observations {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

pub struct MinimalPermissionSolver;

impl MinimalPermissionSolver {
    /// Collect bearer-authenticated requests from the log. `OPTIONS` requests
    /// are ignored and batch requests count as their sub-operations.
    pub fn observe(logs: &[RecordedLogEntry]) -> Observations {
        let mut observations = Observations::default();

        for entry in logs {
            if entry.category != MessageType::InterceptedRequest {
                continue;
            }
            let Some(snapshot) = &entry.exchange else {
                continue;
            };
            let request = &snapshot.request;
            if request.method.eq_ignore_ascii_case("OPTIONS") {
                continue;
            }
            let Some(token) = bearer_token(&request.headers) else {
                observations.requests_without_token += 1;
                continue;
            };
            let credential = decode_credential(token).unwrap_or_else(|e| {
                debug!(url = %request.url, "Unreadable credential: {e}");
                PresentedCredential {
                    permission_type: PermissionType::Delegated,
                    scopes: BTreeSet::new(),
                }
            });

            let operations: Vec<(String, String)> = if is_batch_url(&request.url) {
                BatchExpander::expand(&request.url, &request.body)
                    .into_iter()
                    .map(|op| (op.method, op.url))
                    .collect()
            } else {
                vec![(request.method.clone(), request.url.clone())]
            };

            for (method, url) in operations {
                let Some(surface) = api_origin(&url) else {
                    continue;
                };
                let group = observations
                    .groups
                    .entry((surface, credential.permission_type))
                    .or_default();
                group.operations.insert(OperationKey::from_url(&method, &url));
                group
                    .presented_scopes
                    .extend(credential.scopes.iter().cloned());
            }
        }
        observations
    }

    /// Solve every group against `catalog`.
    pub fn solve(observations: &Observations, catalog: &PermissionCatalog) -> PermissionReport {
        PermissionReport {
            solutions: observations
                .groups
                .iter()
                .map(|((surface, permission_type), group)| {
                    Self::solve_group(surface, *permission_type, group, catalog)
                })
                .collect(),
            requests_without_token: observations.requests_without_token,
        }
    }

    pub fn solve_group(
        api_surface: &str,
        permission_type: PermissionType,
        group: &ObservedGroup,
        catalog: &PermissionCatalog,
    ) -> MinimalScopeSolution {
        let mut ranked = BTreeMap::new();
        let mut unmatched = BTreeSet::new();
        for key in &group.operations {
            match catalog.get(api_surface, permission_type, key) {
                Some(scopes) if !scopes.is_empty() => {
                    ranked.insert(key.clone(), scopes);
                }
                _ => {
                    unmatched.insert(key.clone());
                }
            }
        }

        let minimal: BTreeSet<String> = choose_scopes(&ranked).into_values().collect();
        let excess: BTreeSet<String> = group
            .presented_scopes
            .difference(&minimal)
            .cloned()
            .collect();

        MinimalScopeSolution {
            api_surface: api_surface.to_string(),
            permission_type,
            operations: group.operations.clone(),
            presented_scopes: group.presented_scopes.clone(),
            minimal_scopes: minimal,
            uses_minimal_permissions: excess.is_empty(),
            excess_scopes: excess,
            unmatched_operations: unmatched,
        }
    }
}

/// Pick one scope per operation, preferring scopes shared by many operations.
///
/// Each operation starts on its least privileged scope. A scope chosen for one
/// operation is then pushed onto every other operation that accepts it when it
/// is shared by more operations than that operation's current choice, or by as
/// many and ranks lower for it. Repeats until nothing changes. Greedy: the
/// result is a cover, not necessarily the smallest one.
pub fn choose_scopes(ranked: &BTreeMap<OperationKey, &[String]>) -> BTreeMap<OperationKey, String> {
    let mut shared: HashMap<&str, usize> = HashMap::new();
    for scopes in ranked.values() {
        for scope in scopes.iter().collect::<BTreeSet<_>>() {
            *shared.entry(scope.as_str()).or_default() += 1;
        }
    }
    let share = |scope: &str| shared.get(scope).copied().unwrap_or(0);
    let rank = |scopes: &[String], scope: &str| scopes.iter().position(|s| s == scope);

    let mut chosen: BTreeMap<OperationKey, String> = ranked
        .iter()
        .filter_map(|(op, scopes)| scopes.first().map(|s| (op.clone(), s.clone())))
        .collect();

    loop {
        let mut changed = false;
        let ops: Vec<OperationKey> = chosen.keys().cloned().collect();
        for a in &ops {
            let Some(scope) = chosen.get(a).cloned() else {
                continue;
            };
            for b in &ops {
                if a == b {
                    continue;
                }
                let Some(b_scopes) = ranked.get(b).copied() else {
                    continue;
                };
                let Some(new_rank) = rank(b_scopes, scope.as_str()) else {
                    continue;
                };
                let Some(current) = chosen.get(b) else {
                    continue;
                };
                if *current == scope {
                    continue;
                }
                let current_rank = rank(b_scopes, current.as_str()).unwrap_or(usize::MAX);
                let (new_share, current_share) = (share(scope.as_str()), share(current.as_str()));
                let promote = new_share > current_share
                    || (new_share == current_share && new_rank < current_rank);
                if promote {
                    chosen.insert(b.clone(), scope.clone());
                    changed = true;
                }
            }
        }
        if !changed {
            return chosen;
        }
    }
}
