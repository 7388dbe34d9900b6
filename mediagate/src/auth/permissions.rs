use crate::{
    errors::Error,
    types::{Operation, Permission, Principal, Resource, UserId},
    AppState,
};
use axum::{extract::FromRequestParts, http::request::Parts};
use std::marker::PhantomData;

pub mod resource {
    use crate::types::Resource;

    // Resource types
    #[derive(Default)]
    pub struct Jobs;

    #[derive(Default)]
    pub struct Credits;

    // Convert type-level markers to enum values using Into
    impl From<Jobs> for Resource {
        fn from(_: Jobs) -> Resource {
            Resource::Jobs
        }
    }
    impl From<Credits> for Resource {
        fn from(_: Credits) -> Resource {
            Resource::Credits
        }
    }
}

pub mod operation {
    use crate::types::Operation;

    // Operation types
    #[derive(Default)]
    pub struct CreateAll;

    #[derive(Default)]
    pub struct CreateOwn;

    #[derive(Default)]
    pub struct ReadOwn;

    #[derive(Default)]
    pub struct UpdateAll;

    impl From<CreateAll> for Operation {
        fn from(_: CreateAll) -> Operation {
            Operation::CreateAll
        }
    }
    impl From<CreateOwn> for Operation {
        fn from(_: CreateOwn) -> Operation {
            Operation::CreateOwn
        }
    }
    impl From<ReadOwn> for Operation {
        fn from(_: ReadOwn) -> Operation {
            Operation::ReadOwn
        }
    }
    impl From<UpdateAll> for Operation {
        fn from(_: UpdateAll) -> Operation {
            Operation::UpdateAll
        }
    }
}

pub struct RequiresPermission<R, O>
where
    R: Into<Resource> + Default,
    O: Into<Operation> + Default,
{
    pub principal: Principal,
    _marker: PhantomData<(R, O)>,
}

impl<R, O> FromRequestParts<AppState> for RequiresPermission<R, O>
where
    R: Into<Resource> + Default,
    O: Into<Operation> + Default,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let principal = Principal::from_request_parts(parts, state).await?;

        // Convert the types to enum values using Default + Into
        let resource = R::default().into();
        let operation = O::default().into();

        if has_permission(&principal, resource, operation) {
            Ok(RequiresPermission {
                principal,
                _marker: PhantomData,
            })
        } else {
            Err(insufficient_permissions(resource, operation))
        }
    }
}

// Implement Deref so RequiresPermission<R, O> behaves like Principal
impl<R, O> std::ops::Deref for RequiresPermission<R, O>
where
    R: Into<Resource> + Default,
    O: Into<Operation> + Default,
{
    type Target = Principal;

    fn deref(&self) -> &Self::Target {
        &self.principal
    }
}

fn insufficient_permissions(resource: Resource, operation: Operation) -> Error {
    Error::InsufficientPermissions {
        required: Permission::Allow(resource, operation),
        action: operation,
        resource: format!("{resource:?}"),
    }
}

/// Check if a principal may perform an operation on a resource.
///
/// End users only ever act on their own jobs and balance. The payment provider can top up any
/// balance and the worker fleet can update any job; neither can read user data.
pub fn has_permission(principal: &Principal, resource: Resource, operation: Operation) -> bool {
    match principal {
        Principal::User(_) => matches!(
            (resource, operation),
            (Resource::Jobs, Operation::CreateOwn) | (Resource::Jobs, Operation::ReadOwn) | (Resource::Credits, Operation::ReadOwn)
        ),
        Principal::PaymentProvider => matches!((resource, operation), (Resource::Credits, Operation::CreateAll)),
        Principal::Worker => matches!((resource, operation), (Resource::Jobs, Operation::UpdateAll)),
    }
}

/// The user a principal acts for under an `*Own` permission
pub fn acting_user(principal: &Principal, resource: Resource, operation: Operation) -> Result<UserId, Error> {
    match principal.user_id() {
        Some(user_id) if has_permission(principal, resource, operation) => Ok(user_id),
        _ => Err(insufficient_permissions(resource, operation)),
    }
}

/// Whether a principal may read a resource belonging to `target_user_id`: it must hold the
/// ReadOwn permission and be that user.
pub fn can_read_own_resource(principal: &Principal, resource: Resource, target_user_id: UserId) -> bool {
    principal.user_id() == Some(target_user_id) && has_permission(principal, resource, Operation::ReadOwn)
}
