use std::collections::HashSet;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::TransportOrder;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const COMPANY_ID_HEADER: &str = "x-company-id";
pub const ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Driver,
    Dispatcher,
    Admin,
}

impl Role {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "driver" => Some(Role::Driver),
            "dispatcher" => Some(Role::Dispatcher),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// The authenticated caller, as resolved by the upstream session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub company_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: Uuid, company_id: Uuid, role: Role) -> Self {
        Self {
            user_id,
            company_id,
            role,
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| -> Result<String, AppError> {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| AppError::Unauthorized(format!("missing {name} header")))
        };

        let user_id = Uuid::parse_str(&header(USER_ID_HEADER)?)
            .map_err(|_| AppError::Unauthorized(format!("malformed {USER_ID_HEADER} header")))?;
        let company_id = Uuid::parse_str(&header(COMPANY_ID_HEADER)?)
            .map_err(|_| AppError::Unauthorized(format!("malformed {COMPANY_ID_HEADER} header")))?;
        let role = Role::parse(&header(ROLE_HEADER)?)
            .ok_or_else(|| AppError::Unauthorized(format!("unknown role in {ROLE_HEADER}")))?;

        Ok(Actor::new(user_id, company_id, role))
    }
}

/// Decides what an actor may touch. System administrators are configured explicitly.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    system_admins: HashSet<Uuid>,
}

impl AccessPolicy {
    pub fn new(system_admins: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            system_admins: system_admins.into_iter().collect(),
        }
    }

    pub fn is_system_admin(&self, actor: &Actor) -> bool {
        self.system_admins.contains(&actor.user_id)
    }

    pub fn ensure_company(&self, actor: &Actor, company_id: Uuid) -> Result<(), AppError> {
        if actor.company_id == company_id || self.is_system_admin(actor) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "no access to company {company_id}"
            )))
        }
    }

    /// Dispatchers and admins of the company.
    pub fn ensure_staff(&self, actor: &Actor, company_id: Uuid) -> Result<(), AppError> {
        self.ensure_company(actor, company_id)?;
        if self.is_system_admin(actor) || matches!(actor.role, Role::Dispatcher | Role::Admin) {
            Ok(())
        } else {
            Err(AppError::Forbidden("dispatcher or admin role required".to_string()))
        }
    }

    pub fn ensure_admin(&self, actor: &Actor, company_id: Uuid) -> Result<(), AppError> {
        self.ensure_company(actor, company_id)?;
        if self.is_system_admin(actor) || actor.role == Role::Admin {
            Ok(())
        } else {
            Err(AppError::Forbidden("admin role required".to_string()))
        }
    }

    /// The assigned driver, or staff of the order's company.
    pub fn ensure_order_operator(
        &self,
        actor: &Actor,
        order: &TransportOrder,
    ) -> Result<(), AppError> {
        self.ensure_company(actor, order.company_id)?;
        if actor.role != Role::Driver || self.is_system_admin(actor) {
            return Ok(());
        }
        if order.is_assigned_to(actor.user_id) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "order {} is not assigned to you",
                order.id
            )))
        }
    }

    /// Drivers see their own orders; staff see the whole company.
    pub fn can_view_order(&self, actor: &Actor, order: &TransportOrder) -> bool {
        self.ensure_order_operator(actor, order).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{AccessPolicy, Actor, Role};

    #[test]
    fn other_company_is_forbidden() {
        let policy = AccessPolicy::default();
        let actor = Actor::new(Uuid::new_v4(), Uuid::new_v4(), Role::Admin);
        assert!(policy.ensure_admin(&actor, Uuid::new_v4()).is_err());
    }

    #[test]
    fn system_admin_crosses_companies() {
        let admin_id = Uuid::new_v4();
        let policy = AccessPolicy::new([admin_id]);
        let actor = Actor::new(admin_id, Uuid::new_v4(), Role::Driver);
        assert!(policy.ensure_admin(&actor, Uuid::new_v4()).is_ok());
    }

    #[test]
    fn driver_is_not_staff() {
        let company = Uuid::new_v4();
        let policy = AccessPolicy::default();
        let actor = Actor::new(Uuid::new_v4(), company, Role::Driver);
        assert!(policy.ensure_staff(&actor, company).is_err());
        assert!(policy.ensure_company(&actor, company).is_ok());
    }
}
