use std::future::Future;

use crate::{
    attributes::{AttributeKind, AttributeSchema},
    db_types::{NewRegistration, ReferenceId, Registration, RegistrationStatus},
    scope::ScopeFilter,
    traits::StorageError,
};

/// Access to beneficiary registrations and their per-program attribute data.
///
/// Lookups by reference id take an explicit [`ScopeFilter`]; a registration outside the caller's
/// scope is reported as absent, not as forbidden. Methods are declared with `Send` futures so
/// queue workers can call them from spawned tasks; implementations write `async fn`.
pub trait RegistrationManagement: Clone {
    /// Fetch a registration by its stable reference id, restricted to the given scope.
    fn fetch_registration(
        &self,
        reference_id: &ReferenceId,
        scope: &ScopeFilter,
    ) -> impl Future<Output = Result<Option<Registration>, StorageError>> + Send;

    fn fetch_registration_by_id(
        &self,
        id: i64,
    ) -> impl Future<Output = Result<Option<Registration>, StorageError>> + Send;

    /// Insert a new registration. Idempotent on the reference id: returns the existing row and
    /// `false` when the beneficiary is already registered.
    fn insert_registration(
        &self,
        registration: NewRegistration,
    ) -> impl Future<Output = Result<(Registration, bool), StorageError>> + Send;

    fn update_registration_status(
        &self,
        reference_id: &ReferenceId,
        status: RegistrationStatus,
    ) -> impl Future<Output = Result<Registration, StorageError>> + Send;

    /// The declared attribute schema for a program. Programs with no declared attributes get an
    /// empty schema.
    fn fetch_attribute_schema(
        &self,
        program_id: i64,
    ) -> impl Future<Output = Result<AttributeSchema, StorageError>> + Send;

    fn declare_attribute(
        &self,
        program_id: i64,
        key: &str,
        kind: AttributeKind,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Raw (key, value) attribute rows for a registration. Validate through
    /// [`crate::attributes::AttributeBag::from_rows`] before use.
    fn fetch_registration_attributes(
        &self,
        registration_id: i64,
    ) -> impl Future<Output = Result<Vec<(String, String)>, StorageError>> + Send;

    fn upsert_registration_attribute(
        &self,
        registration_id: i64,
        key: &str,
        value: &str,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;
}
