//! License catalog and assignment commands

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use super::{LicenseCommands, ServiceContext};
use crate::cache::{CacheKey, CacheScope};
use crate::error::DirectoryResult;
use crate::session::DirectoryCommand;
use crate::types::{LicenseSku, UserLicense};
use crate::validation::{validate_id, validate_upn};

#[derive(Debug, Clone)]
pub struct LicenseService {
    context: Arc<ServiceContext>,
}

impl LicenseService {
    pub fn new(context: Arc<ServiceContext>) -> Self {
        Self { context }
    }

    /// Assignment changes both the user's licenses and the catalog's consumed units
    fn scopes(upn: &str) -> [CacheScope; 2] {
        [CacheScope::user(upn), CacheScope::LicenseCatalog]
    }
}

#[async_trait]
impl LicenseCommands for LicenseService {
    async fn list_catalog(&self) -> DirectoryResult<Vec<LicenseSku>> {
        let catalog = self
            .context
            .read_collection(&CacheKey::license_catalog(), &DirectoryCommand::ListLicenseCatalog)
            .await?;
        Ok(catalog.unwrap_or_default())
    }

    async fn list_user_licenses(&self, upn: &str) -> DirectoryResult<Option<Vec<UserLicense>>> {
        let upn = validate_upn(upn)?;
        self.context
            .read_collection(
                &CacheKey::user_licenses(&upn),
                &DirectoryCommand::ListUserLicenses { upn },
            )
            .await
    }

    async fn assign_license(&self, upn: &str, sku_id: &str) -> DirectoryResult<bool> {
        let upn = validate_upn(upn)?;
        let sku_id = validate_id("sku_id", sku_id)?;

        let assigned = self
            .context
            .mutate(
                &DirectoryCommand::AssignLicense {
                    upn: upn.clone(),
                    sku_id: sku_id.clone(),
                },
                &Self::scopes(&upn),
            )
            .await?;
        info!(upn = %upn, sku_id = %sku_id, found = assigned, "License assigned");
        Ok(assigned)
    }

    async fn remove_license(&self, upn: &str, sku_id: &str) -> DirectoryResult<bool> {
        let upn = validate_upn(upn)?;
        let sku_id = validate_id("sku_id", sku_id)?;

        self.context.forget(&CacheKey::user_licenses(&upn));
        let held = self
            .list_user_licenses(&upn)
            .await?
            .is_some_and(|licenses| licenses.iter().any(|l| l.sku_id == sku_id));
        if !held {
            debug!(upn = %upn, sku_id = %sku_id, "License not assigned, nothing to remove");
            return Ok(false);
        }

        let removed = self
            .context
            .mutate(
                &DirectoryCommand::RemoveLicense {
                    upn: upn.clone(),
                    sku_id: sku_id.clone(),
                },
                &Self::scopes(&upn),
            )
            .await?;
        info!(upn = %upn, sku_id = %sku_id, removed = removed, "License removed");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DirectoryError;
    use crate::services::test_support::harness;

    #[tokio::test]
    async fn test_assignment_invalidates_catalog_and_user_licenses() {
        let h = harness().await;
        h.directory.seed_user("ada@school.edu", "Ada");
        h.directory.seed_sku("sku-a1", "STANDARDWOFFPACK_STUDENT");
        let licenses = LicenseService::new(h.context.clone());

        assert_eq!(licenses.list_catalog().await.unwrap()[0].consumed_units, 0);
        assert!(licenses.list_user_licenses("ada@school.edu").await.unwrap().unwrap().is_empty());

        assert!(licenses.assign_license("ada@school.edu", "sku-a1").await.unwrap());

        assert_eq!(licenses.list_catalog().await.unwrap()[0].consumed_units, 1);
        let held = licenses.list_user_licenses("ada@school.edu").await.unwrap().unwrap();
        assert_eq!(held[0].sku_id, "sku-a1");
        assert_eq!(held[0].sku_part_number.as_deref(), Some("STANDARDWOFFPACK_STUDENT"));
        assert_eq!(h.directory.call_count("list_license_catalog"), 2);
    }

    #[tokio::test]
    async fn test_remove_unassigned_license_is_noop() {
        let h = harness().await;
        h.directory.seed_user("ada@school.edu", "Ada");
        h.directory.seed_sku("sku-a1", "STANDARDWOFFPACK_STUDENT");
        let licenses = LicenseService::new(h.context.clone());

        assert!(!licenses.remove_license("ada@school.edu", "sku-a1").await.unwrap());
        assert!(!licenses.remove_license("ghost@school.edu", "sku-a1").await.unwrap());
        assert_eq!(h.directory.call_count("remove_license"), 0);

        h.directory.seed_license("ada@school.edu", "sku-a1");
        assert!(licenses.remove_license("ada@school.edu", "sku-a1").await.unwrap());
        assert!(h.directory.licenses_of("ada@school.edu").is_empty());
    }

    #[tokio::test]
    async fn test_unknown_sku_is_permanent_failure() {
        let h = harness().await;
        h.directory.seed_user("ada@school.edu", "Ada");
        let licenses = LicenseService::new(h.context.clone());

        let err = licenses.assign_license("ada@school.edu", "sku-zz").await.unwrap_err();
        assert!(matches!(err, DirectoryError::Permanent { .. }));
        assert_eq!(h.directory.call_count("assign_license"), 1);

        let err = licenses.assign_license("ada@school.edu", "sku zz").await.unwrap_err();
        assert!(matches!(err, DirectoryError::Validation { .. }));
    }
}
