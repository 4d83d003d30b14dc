//! Password Service
//!
//! Argon2id hashing for the password grant and the reset commit, plus the
//! length policy applied to new passwords.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params, Version,
};
use std::sync::{Arc, OnceLock};
use zeroize::Zeroizing;

use crate::config::PasswordConfig;
use crate::error::{AuthError, AuthResult};

/// Password service for hashing and verification
#[derive(Clone)]
pub struct PasswordService {
    config: PasswordConfig,
    /// Hashed once with the live parameters, verified against when a login has no stored hash
    dummy_hash: Arc<OnceLock<Option<String>>>,
}

impl PasswordService {
    pub fn new(config: PasswordConfig) -> Self {
        Self {
            config,
            dummy_hash: Arc::new(OnceLock::new()),
        }
    }

    fn peppered(&self, password: &str) -> Zeroizing<String> {
        match self.config.pepper {
            Some(ref pepper) => Zeroizing::new(format!("{}{}", password, pepper)),
            None => Zeroizing::new(password.to_string()),
        }
    }

    /// Hash a password using Argon2id.
    ///
    /// The strength policy is checked first; a rejected password is never hashed.
    pub fn hash_password(&self, password: &str) -> AuthResult<String> {
        self.validate_password_strength(password)?;
        self.hash_unchecked(password)
    }

    fn hash_unchecked(&self, password: &str) -> AuthResult<String> {
        let password_with_pepper = self.peppered(password);
        let salt = SaltString::generate(&mut OsRng);

        let params = Params::new(
            self.config.memory_cost,
            self.config.time_cost,
            self.config.parallelism,
            Some(self.config.hash_length as usize),
        )
        .map_err(|e| AuthError::Config(format!("Invalid Argon2 params: {}", e)))?;

        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params);

        let hash = argon2
            .hash_password(password_with_pepper.as_bytes(), &salt)
            .map_err(|_| AuthError::PasswordHashingFailed)?;

        Ok(hash.to_string())
    }

    /// Verify a password against a stored hash.
    ///
    /// `Ok(false)` is a wrong password; `Err` means the stored hash is unusable.
    pub fn verify_password(&self, password: &str, hash: &str) -> AuthResult<bool> {
        let password_with_pepper = self.peppered(password);

        let parsed_hash = PasswordHash::new(hash)?;

        // Parameters are read from the PHC string
        match Argon2::default().verify_password(password_with_pepper.as_bytes(), &parsed_hash) {
            Ok(_) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(_) => Err(AuthError::PasswordVerificationFailed),
        }
    }

    /// Run a full verification against a throwaway hash and discard the result.
    ///
    /// Unknown users and users without a password cost the same as a wrong password.
    pub fn verify_dummy(&self, password: &str) {
        let hash = self
            .dummy_hash
            .get_or_init(|| self.hash_unchecked("warden-no-such-user").ok());
        if let Some(hash) = hash {
            let _ = self.verify_password(password, hash);
        }
    }

    /// Apply the length policy
    pub fn validate_password_strength(&self, password: &str) -> AuthResult<()> {
        let length = password.chars().count();

        if length < self.config.min_password_length {
            return Err(AuthError::WeakPassword(format!(
                "Password must be at least {} characters",
                self.config.min_password_length
            )));
        }

        if length > self.config.max_password_length {
            return Err(AuthError::WeakPassword(format!(
                "Password must be at most {} characters",
                self.config.max_password_length
            )));
        }

        Ok(())
    }
}
