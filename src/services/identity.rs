// src/services/identity.rs
//! Identity reconciliation: verify an assertion, then find-or-create the
//! matching user profile in one atomic store write.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::token_verifier::{TokenVerifier, VerifiedClaims};
use super::user_store::{ProfileUpsert, UserProfile, UserStore};
use crate::common::{generate_user_id, safe_email_log, Failure};

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub profile: UserProfile,
    /// True when this call created the profile, false on refresh.
    pub created: bool,
}

pub struct IdentityReconciler {
    verifier: Arc<TokenVerifier>,
    store: Arc<dyn UserStore>,
}

impl IdentityReconciler {
    pub fn new(verifier: Arc<TokenVerifier>, store: Arc<dyn UserStore>) -> Self {
        Self { verifier, store }
    }

    pub async fn reconcile(&self, assertion: &str) -> Result<Reconciliation, Failure> {
        self.reconcile_at(assertion, Utc::now()).await
    }

    /// Same as `reconcile` with an explicit login time.
    pub async fn reconcile_at(
        &self,
        assertion: &str,
        now: DateTime<Utc>,
    ) -> Result<Reconciliation, Failure> {
        let claims = self.verifier.verify(assertion).await?;
        let upsert = profile_upsert(claims, now);

        // One retry on persistence failure. The retry reuses the same values,
        // so a first attempt that actually committed is simply refreshed.
        let profile = match self.store.upsert(&upsert).await {
            Ok(profile) => profile,
            Err(first) => {
                warn!(
                    error = %first,
                    subject = %upsert.subject,
                    "User upsert failed, retrying once"
                );
                self.store.upsert(&upsert).await.map_err(|e| {
                    error!(
                        error = %e,
                        subject = %upsert.subject,
                        "User upsert failed after retry"
                    );
                    match e {
                        Failure::PersistenceFailure(_) => e,
                        other => Failure::PersistenceFailure(other.to_string()),
                    }
                })?
            }
        };

        let created = profile.was_created_by(&upsert);
        info!(
            user_id = %profile.id,
            email = %safe_email_log(&profile.email),
            created = created,
            "Identity reconciled"
        );

        Ok(Reconciliation { profile, created })
    }
}

fn profile_upsert(claims: VerifiedClaims, now: DateTime<Utc>) -> ProfileUpsert {
    ProfileUpsert {
        id: generate_user_id(),
        subject: claims.subject,
        email: claims.email,
        full_name: claims.full_name,
        given_name: claims.given_name,
        family_name: claims.family_name,
        picture_url: claims.picture_url,
        locale: claims.locale,
        seen_at: now,
    }
}
