use rand::{Rng, distributions::Alphanumeric, thread_rng};
use sha2::{Digest, Sha256};

const SALT_LEN: usize = 16;
const TOKEN_LEN: usize = 48;

pub fn generate_salt() -> String {
    random_string(SALT_LEN)
}

pub fn generate_token() -> String {
    random_string(TOKEN_LEN)
}

fn random_string(len: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

pub fn verify_password(password: &str, salt: &str, expected_hash: &str) -> bool {
    hash_password(password, salt) == expected_hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_is_deterministic_per_salt() {
        let salt = "fixed-salt";
        let hash = hash_password("secret", salt);
        assert_eq!(hash, hash_password("secret", salt));
        assert_ne!(hash, hash_password("secret", "other-salt"));
        assert_ne!(hash, hash_password("Secret", salt));
    }

    #[test]
    fn verification_round_trips() {
        let salt = generate_salt();
        let hash = hash_password("secret", &salt);
        assert!(verify_password("secret", &salt, &hash));
        assert!(!verify_password("wrong", &salt, &hash));
    }

    #[test]
    fn tokens_are_long_and_unique() {
        let token = generate_token();
        assert_eq!(token.len(), 48);
        assert_ne!(token, generate_token());
    }
}
