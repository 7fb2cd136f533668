//! Role lookup against the `users` collection.

use handy_core::documents::set_record;
use handy_core::{
    Collection, DocumentError, DocumentStore, Identity, Role, RoleField, SessionSettings,
    Timestamp, UserRecord,
};
use tracing::{debug, info, warn};

/// Where a resolved role came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleSource {
    /// Read from the user's document.
    Stored,
    /// Missing document, or a missing or unrecognized `role` field.
    Defaulted,
    /// A default profile was written for the user.
    Provisioned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleLookup {
    pub role: Role,
    pub source: RoleSource,
}

impl RoleLookup {
    fn defaulted() -> Self {
        Self {
            role: Role::Client,
            source: RoleSource::Defaulted,
        }
    }
}

/// Look up the role of `identity`.
///
/// Only a transport-level failure of the read is an error. Everything else
/// resolves, failing open to `Client`. With provisioning on, a missing user
/// document is created as a client profile stamped with `now`; a failed
/// write is logged and still resolves `Client`.
pub async fn lookup_role(
    documents: &dyn DocumentStore,
    identity: &Identity,
    settings: &SessionSettings,
    now: Timestamp,
) -> Result<RoleLookup, DocumentError> {
    let uid = identity.uid.as_str();
    let document = documents.get(Collection::Users, uid).await?;

    let Some(document) = document else {
        if !settings.provision_missing_profile {
            debug!(uid = %uid, "No user document, defaulting to client");
            return Ok(RoleLookup::defaulted());
        }
        return Ok(provision(documents, identity, now).await);
    };

    let field = RoleField::classify(document.field("role"));
    let source = match &field {
        RoleField::Valid(_) => RoleSource::Stored,
        RoleField::Missing => {
            debug!(uid = %uid, "User document has no role, defaulting to client");
            RoleSource::Defaulted
        }
        RoleField::Invalid(raw) => {
            warn!(uid = %uid, value = %raw, "Unrecognized role, defaulting to client");
            RoleSource::Defaulted
        }
    };
    Ok(RoleLookup {
        role: field.effective(),
        source,
    })
}

async fn provision(documents: &dyn DocumentStore, identity: &Identity, now: Timestamp) -> RoleLookup {
    let uid = identity.uid.as_str();
    let profile = UserRecord {
        created_at: Some(now.timestamp_millis()),
        ..UserRecord::provisional(
            uid,
            identity.email.as_deref(),
            identity.display_name.as_deref(),
        )
    };

    match set_record(documents, uid, &profile, true).await {
        Ok(()) => {
            info!(uid = %uid, "Provisioned client profile");
            RoleLookup {
                role: profile.effective_role(),
                source: RoleSource::Provisioned,
            }
        }
        Err(e) => {
            warn!(uid = %uid, error = %e, "Profile provisioning failed, defaulting to client");
            RoleLookup::defaulted()
        }
    }
}
