//! Authentication state trait and macro.

use crate::jwt::TokenIssuer;

/// Trait for state types that can validate access tokens.
pub trait HasAuthBackend {
    fn jwt(&self) -> &TokenIssuer;
}

/// Macro to implement `HasAuthBackend` for state structs with the standard field.
///
/// The struct must have a `jwt: Arc<TokenIssuer>` field.
///
/// # Example
/// ```ignore
/// use crate::impl_has_auth_backend;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub jwt: Arc<TokenIssuer>,
///     // ... other fields
/// }
///
/// impl_has_auth_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthBackend for $state_type {
            fn jwt(&self) -> &$crate::jwt::TokenIssuer {
                &self.jwt
            }
        }
    };
}
