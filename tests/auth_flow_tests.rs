/// Tests for authentication building blocks
///
/// Note: These are unit tests that verify the logic is correct.
/// Integration tests would require a running server.

#[cfg(test)]
mod tests {
    // Test verification code generation
    #[test]
    fn test_verification_code_format() {
        use rand::Rng;
        let mut rng = rand::thread_rng();

        for _ in 0..100 {
            let code = rng.gen_range(100_000..1_000_000).to_string();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            // The range starts at 100000, so codes never carry a leading zero
            assert_ne!(code.chars().next(), Some('0'));
        }
    }

    #[test]
    fn test_verification_codes_vary() {
        use rand::Rng;
        use std::collections::HashSet;

        let mut rng = rand::thread_rng();
        let mut codes = HashSet::new();
        for _ in 0..100 {
            codes.insert(rng.gen_range(100_000..1_000_000));
        }

        // Six digits can collide, but a hundred draws from 900k values
        // should still land far apart
        assert!(codes.len() > 90);
    }

    #[test]
    fn test_authorization_header_parsing() {
        let auth_header = "Bearer abc123token";
        let token = auth_header.strip_prefix("Bearer ");
        assert_eq!(token, Some("abc123token"));

        let invalid_header = "abc123token";
        let token = invalid_header.strip_prefix("Bearer ");
        assert_eq!(token, None);
    }

    #[test]
    fn test_password_hash_round_trip() {
        use argon2::{
            password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
            Argon2,
        };

        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(b"correct horse battery staple", &salt)
            .expect("hashing succeeds")
            .to_string();

        let parsed = PasswordHash::new(&hash).expect("hash parses");
        assert!(Argon2::default()
            .verify_password(b"correct horse battery staple", &parsed)
            .is_ok());
        assert!(Argon2::default()
            .verify_password(b"wrong password", &parsed)
            .is_err());
    }

    #[test]
    fn test_salts_make_hashes_differ() {
        use argon2::{
            password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
            Argon2,
        };

        let a = Argon2::default()
            .hash_password(b"secret", &SaltString::generate(&mut OsRng))
            .expect("hashing succeeds")
            .to_string();
        let b = Argon2::default()
            .hash_password(b"secret", &SaltString::generate(&mut OsRng))
            .expect("hashing succeeds")
            .to_string();

        assert_ne!(a, b);
    }

    #[test]
    fn test_revocation_key_is_stable_hex() {
        use sha2::{Digest, Sha256};

        // The blacklist keys tokens by SHA-256 so raw JWTs never reach
        // the cache; the digest must be deterministic
        let token = "eyJhbGciOiJIUzI1NiJ9.payload.signature";
        let a = hex::encode(Sha256::digest(token.as_bytes()));
        let b = hex::encode(Sha256::digest(token.as_bytes()));

        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));

        let other = hex::encode(Sha256::digest(b"another token"));
        assert_ne!(a, other);
    }
}
