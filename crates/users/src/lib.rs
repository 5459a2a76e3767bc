use anyhow::{anyhow, Result};
use chrono::Utc;

use models::{Role, User};

/// Only institutional addresses may hold accounts.
pub const EMAIL_DOMAIN: &str = "@almacen.cr";

pub const TEMP_PASSWORD_LEN: usize = 8;

const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!@#$%&*";

/// Generates an 8-character temporary password with at least one uppercase
/// letter, one lowercase letter, one digit and one symbol, drawn from the
/// OS CSPRNG.
pub fn generate_temp_password() -> String {
    use password_hash::rand_core::{OsRng, RngCore};

    fn pick(set: &[u8], rng: &mut OsRng) -> u8 {
        set[rng.next_u32() as usize % set.len()]
    }

    let mut rng = OsRng;
    let mut chars = Vec::with_capacity(TEMP_PASSWORD_LEN);

    // One of each class, then fill up from the full alphabet
    chars.push(pick(UPPERCASE, &mut rng));
    chars.push(pick(LOWERCASE, &mut rng));
    chars.push(pick(DIGITS, &mut rng));
    chars.push(pick(SYMBOLS, &mut rng));

    let all = [UPPERCASE, LOWERCASE, DIGITS, SYMBOLS].concat();
    while chars.len() < TEMP_PASSWORD_LEN {
        chars.push(pick(&all, &mut rng));
    }

    // Fisher-Yates, so the class-guaranteed characters are not positional
    for i in (1..chars.len()).rev() {
        let j = rng.next_u32() as usize % (i + 1);
        chars.swap(i, j);
    }

    chars.into_iter().map(char::from).collect()
}

/// Hash a plain password with argon2id.
pub fn hash_password(password: &str) -> Result<String> {
    use argon2::Argon2;
    use password_hash::rand_core::OsRng;
    use password_hash::{PasswordHasher, SaltString};

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| anyhow!("hashing password: {}", e))
}

/// Verify a password against an argon2id hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    use argon2::Argon2;
    use password_hash::{PasswordHash, PasswordVerifier};

    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Accepts only `local@almacen.cr` addresses.
pub fn validate_email(email: &str) -> bool {
    let pattern = format!(r"^[^\s@]+{}$", regex::escape(EMAIL_DOMAIN));
    match regex::Regex::new(&pattern) {
        Ok(re) => re.is_match(email),
        Err(_) => false,
    }
}

/// Returns the list of rules a chosen password fails, empty when acceptable.
pub fn validate_password_strength(password: &str) -> Vec<String> {
    let mut violations = Vec::new();

    if password.len() < 8 {
        violations.push("at least 8 characters".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        violations.push("at least one uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        violations.push("at least one lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        violations.push("at least one digit".to_string());
    }
    if !password.chars().any(|c| "!@#$%^&*(),.?\":{}|<>".contains(c)) {
        violations.push("at least one special symbol".to_string());
    }

    violations
}

/// A freshly created account plus the one-time temporary password to hand to
/// the person. The password is never stored in clear.
#[derive(Debug)]
pub struct CreatedUser {
    pub user: User,
    pub temp_password: String,
}

/// Builds a new active account with a generated temporary password and the
/// must-change flag set.
pub fn create_user(
    name: impl Into<String>,
    email: impl Into<String>,
    role: Role,
    created_by: Option<String>,
) -> Result<CreatedUser> {
    let email = email.into();
    if !validate_email(&email) {
        return Err(anyhow!("email must use the {} domain", EMAIL_DOMAIN));
    }

    let temp_password = generate_temp_password();
    let password_hash = hash_password(&temp_password)?;
    let now = Utc::now().to_rfc3339();

    let user = User {
        id: uuid::Uuid::new_v4().to_string().replace('-', ""),
        created_at: now.clone(),
        updated_at: now,
        name: name.into(),
        email,
        role,
        active: true,
        password_hash,
        temp_password: true,
        must_change_password: true,
        last_password_change: None,
        created_by,
        last_login: None,
    };

    Ok(CreatedUser {
        user,
        temp_password,
    })
}

/// Replaces the password with a fresh temporary one and re-arms the
/// must-change flag. Returns the new clear-text password for one-time display.
pub fn reset_password(user: &mut User) -> Result<String> {
    let temp_password = generate_temp_password();
    user.password_hash = hash_password(&temp_password)?;
    user.temp_password = true;
    user.must_change_password = true;
    user.updated_at = Utc::now().to_rfc3339();
    Ok(temp_password)
}

/// Installs a user-chosen password. Strength is expected to be validated by
/// the caller beforehand; this only hashes and clears the onboarding flags.
pub fn change_password(user: &mut User, new_password: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    user.password_hash = hash_password(new_password)?;
    user.temp_password = false;
    user.must_change_password = false;
    user.last_password_change = Some(now.clone());
    user.updated_at = now;
    Ok(())
}

/// Login check: the account must be active and the password must match.
pub fn authenticate(user: &User, password: &str) -> bool {
    user.active && verify_password(password, &user.password_hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_password_shape() {
        let password = generate_temp_password();

        assert_eq!(password.len(), TEMP_PASSWORD_LEN);
        assert!(password.chars().any(|c| c.is_ascii_uppercase()));
        assert!(password.chars().any(|c| c.is_ascii_lowercase()));
        assert!(password.chars().any(|c| c.is_ascii_digit()));
        assert!(password.chars().any(|c| "!@#$%&*".contains(c)));
    }

    #[test]
    fn test_temp_passwords_differ() {
        assert_ne!(generate_temp_password(), generate_temp_password());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("maria@almacen.cr"));
        assert!(!validate_email("maria@gmail.com"));
        assert!(!validate_email("@almacen.cr"));
        assert!(!validate_email("two words@almacen.cr"));
        assert!(!validate_email("maria@almacen.cr.evil.com"));
    }

    #[test]
    fn test_password_strength_rules() {
        assert!(validate_password_strength("Abc123!x").is_empty());

        let violations = validate_password_strength("abc");
        assert!(violations.iter().any(|v| v.contains("8 characters")));
        assert!(violations.iter().any(|v| v.contains("uppercase")));
        assert!(violations.iter().any(|v| v.contains("digit")));
        assert!(violations.iter().any(|v| v.contains("symbol")));

        assert_eq!(
            validate_password_strength("ABCDEF12!"),
            vec!["at least one lowercase letter".to_string()]
        );
    }

    #[test]
    fn test_hash_and_verify_round_trip() {
        let hash = hash_password("Secreto1!").unwrap();
        assert!(verify_password("Secreto1!", &hash));
        assert!(!verify_password("Secreto2!", &hash));
        assert!(!verify_password("Secreto1!", "not-a-hash"));
    }

    #[test]
    fn test_create_user_sets_onboarding_flags() {
        let created = create_user("María", "maria@almacen.cr", Role::User, None).unwrap();

        assert!(created.user.active);
        assert!(created.user.temp_password);
        assert!(created.user.must_change_password);
        assert!(!created.user.id.is_empty());
        assert!(verify_password(&created.temp_password, &created.user.password_hash));
    }

    #[test]
    fn test_create_user_rejects_foreign_domain() {
        assert!(create_user("X", "x@gmail.com", Role::User, None).is_err());
    }

    #[test]
    fn test_reset_password_rearms_flags() {
        let created = create_user("Ana", "ana@almacen.cr", Role::Admin, None).unwrap();
        let mut user = created.user;
        change_password(&mut user, "Propia123!").unwrap();
        assert!(!user.must_change_password);

        let new_temp = reset_password(&mut user).unwrap();
        assert!(user.temp_password);
        assert!(user.must_change_password);
        assert!(verify_password(&new_temp, &user.password_hash));
        assert!(!verify_password("Propia123!", &user.password_hash));
    }

    #[test]
    fn test_authenticate_requires_active_account() {
        let created = create_user("Luis", "luis@almacen.cr", Role::User, None).unwrap();
        let mut user = created.user;

        assert!(authenticate(&user, &created.temp_password));
        user.active = false;
        assert!(!authenticate(&user, &created.temp_password));
    }
}
