use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller role as resolved by the (external) identity layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    /// Scheduler / internal automation.
    System,
    Provider,
    Worker,
    Customer,
}

/// Opaque resolved identity handed in by the session layer. The engine never
/// authenticates; it only scopes: super_admin and system callers are
/// tenant-unscoped, everyone else is pinned to their own tenant id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerContext {
    pub user_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub role: Role,
}

impl CallerContext {
    pub fn new(user_id: Uuid, tenant_id: Option<Uuid>, role: Role) -> Self {
        Self { user_id, tenant_id, role }
    }

    /// Scheduler context: unrestricted tenant scope, no human operator.
    pub fn system() -> Self {
        Self {
            user_id: Uuid::nil(),
            tenant_id: None,
            role: Role::System,
        }
    }

    pub fn is_unscoped(&self) -> bool {
        matches!(self.role, Role::SuperAdmin | Role::System)
    }

    /// May this caller act on resources owned by `tenant_id`?
    pub fn can_access_tenant(&self, tenant_id: Uuid) -> bool {
        self.is_unscoped() || self.tenant_id == Some(tenant_id)
    }

    /// Either side of a lease (supplier tenant or leasing restaurant) may
    /// read it and take customer-side actions on it.
    pub fn is_party_to(&self, provider_id: Uuid, restaurant_id: Uuid) -> bool {
        self.is_unscoped() || self.tenant_id == Some(provider_id) || self.tenant_id == Some(restaurant_id)
    }

    /// Operator id to stamp on audit entries. System callers stamp nothing.
    pub fn operator_id(&self) -> Option<Uuid> {
        if self.role == Role::System {
            None
        } else {
            Some(self.user_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unscoped_roles() {
        let admin = CallerContext::new(Uuid::new_v4(), None, Role::SuperAdmin);
        let system = CallerContext::system();
        let provider = CallerContext::new(Uuid::new_v4(), Some(Uuid::new_v4()), Role::Provider);

        let tenant = Uuid::new_v4();
        assert!(admin.can_access_tenant(tenant));
        assert!(system.can_access_tenant(tenant));
        assert!(!provider.can_access_tenant(tenant));
        assert!(provider.can_access_tenant(provider.tenant_id.unwrap()));
    }

    #[test]
    fn test_system_caller_stamps_no_operator() {
        assert!(CallerContext::system().operator_id().is_none());
        let worker = CallerContext::new(Uuid::new_v4(), Some(Uuid::new_v4()), Role::Worker);
        assert_eq!(worker.operator_id(), Some(worker.user_id));
    }
}
