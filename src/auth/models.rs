//! Authentication data models

use serde::{Deserialize, Serialize};

use crate::services::UserProfile;

/// Session JWT claims. `sub` is the store id, never the issuer subject.
#[derive(Serialize, Deserialize, Debug)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

/// Google ID token payload for sign-in
#[derive(Deserialize)]
pub struct GoogleIdTokenPayload {
    pub id_token: String,
}

/// Successful sign-in response
#[derive(Serialize, Debug)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
    /// True when this sign-in created the account
    pub created: bool,
}

#[derive(Serialize, Debug)]
pub struct MeResponse {
    pub user: UserProfile,
}
