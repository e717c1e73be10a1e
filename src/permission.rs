// permission.rs
// On-chain permission oracle seam
//
// The chain answers one question for the connection flow: may `grantee`
// connect to `grantor`? The oracle is consumed, not produced, by this core:
// a negative and an erroring answer are treated identically (connection not
// permitted), and enforcement stays a UI-level gate in front of the connect
// flow, not a transport-layer one.
//
// `PermissionTable` is the in-memory implementation, mirroring the contract
// interface: grant / revoke / query / enumerate.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::info;

/// Errors raised by permission mutations
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PermissionError {
    /// Grantor and grantee must be distinct addresses
    #[error("Invalid address: grantor and grantee are the same")]
    InvalidAddress,

    /// Revoking a permission that was never granted
    #[error("Permission not found: {grantor} -> {grantee}")]
    PermissionNotFound { grantor: String, grantee: String },
}

/// Answers "may grantee connect to grantor?"
#[async_trait]
pub trait PermissionOracle: Send + Sync {
    /// A query error means "not determinable"; callers treat it the same as
    /// a negative answer.
    async fn has_permission(&self, grantor: &str, grantee: &str) -> Result<bool, String>;
}

/// In-memory grant table: grantor address -> granted addresses
#[derive(Debug, Default)]
pub struct PermissionTable {
    grants: Mutex<HashMap<String, Vec<String>>>,
}

impl PermissionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `grantee` permission to connect to `grantor`. Granting an
    /// already-granted address is an idempotent success.
    pub async fn grant_permission(
        &self,
        grantor: &str,
        grantee: &str,
    ) -> Result<(), PermissionError> {
        if grantor == grantee {
            return Err(PermissionError::InvalidAddress);
        }

        let mut grants = self.grants.lock().await;
        let grantees = grants.entry(grantor.to_string()).or_default();
        if grantees.iter().any(|g| g == grantee) {
            return Ok(());
        }
        grantees.push(grantee.to_string());
        info!("Permission granted: {} -> {}", grantor, grantee);
        Ok(())
    }

    /// Revoke a previously granted permission.
    pub async fn delete_permission(
        &self,
        grantor: &str,
        grantee: &str,
    ) -> Result<(), PermissionError> {
        if grantor == grantee {
            return Err(PermissionError::InvalidAddress);
        }

        let mut grants = self.grants.lock().await;
        let Some(grantees) = grants.get_mut(grantor) else {
            return Err(PermissionError::PermissionNotFound {
                grantor: grantor.to_string(),
                grantee: grantee.to_string(),
            });
        };

        let before = grantees.len();
        grantees.retain(|g| g != grantee);
        if grantees.len() == before {
            return Err(PermissionError::PermissionNotFound {
                grantor: grantor.to_string(),
                grantee: grantee.to_string(),
            });
        }
        info!("Permission revoked: {} -> {}", grantor, grantee);
        Ok(())
    }

    /// All addresses the grantor has granted permission to.
    pub async fn get_all_grantees(&self, grantor: &str) -> Vec<String> {
        self.grants
            .lock()
            .await
            .get(grantor)
            .cloned()
            .unwrap_or_default()
    }

    /// All addresses that have granted permission to the grantee.
    pub async fn get_all_grantors(&self, grantee: &str) -> Vec<String> {
        self.grants
            .lock()
            .await
            .iter()
            .filter(|(_, grantees)| grantees.iter().any(|g| g == grantee))
            .map(|(grantor, _)| grantor.clone())
            .collect()
    }

    /// Drop every grant made by the grantor.
    pub async fn clear_all_permissions(&self, grantor: &str) {
        self.grants.lock().await.remove(grantor);
        info!("All permissions cleared for: {}", grantor);
    }
}

#[async_trait]
impl PermissionOracle for PermissionTable {
    async fn has_permission(&self, grantor: &str, grantee: &str) -> Result<bool, String> {
        if grantor == grantee {
            return Ok(false);
        }
        let grants = self.grants.lock().await;
        Ok(grants
            .get(grantor)
            .map(|grantees| grantees.iter().any(|g| g == grantee))
            .unwrap_or(false))
    }
}

/// Collapse the oracle's answer to the single bit the connect flow needs:
/// a negative or erroring answer both mean "not permitted".
pub async fn connection_permitted(
    oracle: &dyn PermissionOracle,
    grantor: &str,
    grantee: &str,
) -> bool {
    oracle
        .has_permission(grantor, grantee)
        .await
        .unwrap_or(false)
}
