// crates/tenant-gate-core/src/runtime/membership.rs
// ============================================================================
// Module: Tenant Gate Membership Service
// Description: Membership mutations guarded by the last-owner invariant.
// Purpose: Keep at least one owner per tenant at all times.
// Dependencies: thiserror, tracing, crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Removing or demoting the only owner of a tenant is rejected, whether the
//! demotion comes from `change_role` or from re-adding the owner. Successful
//! mutations drop the tenant's cached decisions so role changes take effect
//! on the next request.
//!
//! The owner count is read before the write without a lock; two concurrent
//! demotions of the last two owners can both pass the check.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::core::Role;
use crate::core::TenantId;
use crate::core::TenantUser;
use crate::core::UserId;
use crate::core::tenant_cache_prefix;
use crate::interfaces::ControlPlaneStore;
use crate::interfaces::StoreError;
use crate::runtime::cache::ReadThroughCache;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Membership mutation errors.
#[derive(Debug, Error)]
pub enum MembershipError {
    /// User is not a member of the tenant.
    #[error("user {user_id} is not a member of tenant {tenant_id}")]
    NotMember {
        /// Tenant identifier.
        tenant_id: TenantId,
        /// User identifier.
        user_id: UserId,
    },
    /// Change would leave the tenant without an owner.
    #[error("tenant {0} must keep at least one owner")]
    LastOwner(TenantId),
    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Service
// ============================================================================

/// Membership mutations with invariant checks.
#[derive(Clone)]
pub struct MembershipService {
    /// Relational store.
    store: Arc<dyn ControlPlaneStore>,
    /// Decision cache to invalidate after changes.
    cache: Option<ReadThroughCache>,
}

impl MembershipService {
    /// Creates a membership service.
    #[must_use]
    pub fn new(store: Arc<dyn ControlPlaneStore>, cache: Option<ReadThroughCache>) -> Self {
        Self {
            store,
            cache,
        }
    }

    /// Adds a member, or replaces an existing member's role.
    ///
    /// Replacing the role of the only owner with a lower one is rejected the
    /// same way [`Self::change_role`] rejects it.
    ///
    /// # Errors
    ///
    /// Returns [`MembershipError::LastOwner`] when the call would demote the
    /// only owner and [`MembershipError::Store`] when a store call fails.
    pub async fn add_member(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        role: Role,
    ) -> Result<TenantUser, MembershipError> {
        if let Some(existing) = self.store.get_membership(tenant_id, user_id).await?
            && existing.role == Role::Owner
            && role != Role::Owner
        {
            self.ensure_other_owner(tenant_id).await?;
        }
        let membership = TenantUser {
            tenant_id: tenant_id.clone(),
            user_id: user_id.clone(),
            role,
        };
        self.store.upsert_membership(&membership).await?;
        info!(tenant_id = %tenant_id, user_id = %user_id, role = role.as_str(), "member added");
        self.invalidate(tenant_id).await;
        Ok(membership)
    }

    /// Removes a member.
    ///
    /// # Errors
    ///
    /// Returns [`MembershipError::NotMember`] when no row exists and
    /// [`MembershipError::LastOwner`] when the member is the only owner.
    pub async fn remove_member(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
    ) -> Result<(), MembershipError> {
        let current = self.require_member(tenant_id, user_id).await?;
        if current.role == Role::Owner {
            self.ensure_other_owner(tenant_id).await?;
        }
        self.store.delete_membership(tenant_id, user_id).await?;
        info!(tenant_id = %tenant_id, user_id = %user_id, "member removed");
        self.invalidate(tenant_id).await;
        Ok(())
    }

    /// Changes a member's role.
    ///
    /// # Errors
    ///
    /// Returns [`MembershipError::NotMember`] when no row exists and
    /// [`MembershipError::LastOwner`] when demoting the only owner.
    pub async fn change_role(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        role: Role,
    ) -> Result<TenantUser, MembershipError> {
        let mut membership = self.require_member(tenant_id, user_id).await?;
        if membership.role == Role::Owner && role != Role::Owner {
            self.ensure_other_owner(tenant_id).await?;
        }
        membership.role = role;
        self.store.upsert_membership(&membership).await?;
        info!(tenant_id = %tenant_id, user_id = %user_id, role = role.as_str(), "member role changed");
        self.invalidate(tenant_id).await;
        Ok(membership)
    }

    /// Loads the membership row or fails with [`MembershipError::NotMember`].
    async fn require_member(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
    ) -> Result<TenantUser, MembershipError> {
        self.store.get_membership(tenant_id, user_id).await?.ok_or_else(|| {
            MembershipError::NotMember {
                tenant_id: tenant_id.clone(),
                user_id: user_id.clone(),
            }
        })
    }

    /// Fails unless the tenant has more than one owner.
    async fn ensure_other_owner(&self, tenant_id: &TenantId) -> Result<(), MembershipError> {
        if self.store.count_tenant_owners(tenant_id).await? <= 1 {
            return Err(MembershipError::LastOwner(tenant_id.clone()));
        }
        Ok(())
    }

    /// Drops cached decisions for the tenant.
    async fn invalidate(&self, tenant_id: &TenantId) {
        if let Some(cache) = &self.cache {
            cache.invalidate_prefix(&tenant_cache_prefix(tenant_id)).await;
        }
    }
}
