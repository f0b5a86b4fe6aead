//! Accounts and session tokens.
//!
//! Passwords are stored as `pbkdf2:<iterations>:<hex salt>:<hex hash>` using PBKDF2-HMAC-SHA256.
//! Sessions are HS256 JWTs signed with `security.jwt_secret`.

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use time::{Duration, OffsetDateTime};

use mnemo_storage::models::NewUser;

use crate::{AgentService, Error, Result};

const HASH_SCHEME: &str = "pbkdf2";
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;
const INVALID_CREDENTIALS: &str = "Invalid email or password.";

#[derive(Clone, Debug, Deserialize)]
pub struct SignupRequest {
	pub email: String,
	pub password: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct SignupResponse {
	pub message: String,
	pub user_id: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LoginRequest {
	pub email: String,
	pub password: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct LoginResponse {
	pub token: String,
}

/// Identity carried by a verified token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Session {
	pub user_id: i64,
	pub is_admin: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
	sub: String,
	user_id: i64,
	is_admin: bool,
	iat: i64,
	exp: i64,
}

impl AgentService {
	pub async fn signup(&self, req: SignupRequest) -> Result<SignupResponse> {
		let email = normalize_email(&req.email);

		if email.is_empty() {
			return Err(Error::InvalidRequest { message: "email must be non-empty.".to_string() });
		}
		if req.password.is_empty() {
			return Err(Error::InvalidRequest {
				message: "password must be non-empty.".to_string(),
			});
		}

		let password_hash = hash_password(&req.password, self.cfg.security.password_iterations);
		let user = self.stores.users.create_user(NewUser { email, password_hash }).await?;

		tracing::info!(user_id = user.user_id, "User registered.");

		Ok(SignupResponse { message: "User created successfully.".to_string(), user_id: user.user_id })
	}

	pub async fn login(&self, req: LoginRequest) -> Result<LoginResponse> {
		let email = normalize_email(&req.email);
		let Some(user) = self.stores.users.find_user_by_email(&email).await? else {
			return Err(Error::Unauthorized { message: INVALID_CREDENTIALS.to_string() });
		};

		if !verify_password(&req.password, &user.password_hash) {
			return Err(Error::Unauthorized { message: INVALID_CREDENTIALS.to_string() });
		}

		let token = issue_token(
			&self.cfg.security.jwt_secret,
			self.cfg.security.token_ttl_days,
			&user.email,
			Session { user_id: user.user_id, is_admin: user.is_admin },
			OffsetDateTime::now_utc(),
		)?;

		Ok(LoginResponse { token })
	}

	pub fn verify_session(&self, token: &str) -> Result<Session> {
		verify_token(&self.cfg.security.jwt_secret, token)
	}
}

pub fn hash_password(password: &str, iterations: u32) -> String {
	let mut salt = [0_u8; SALT_LEN];

	rand::thread_rng().fill_bytes(&mut salt);

	let hash = derive(password, &salt, iterations);

	format!("{HASH_SCHEME}:{iterations}:{}:{}", hex::encode(salt), hex::encode(hash))
}

/// Malformed stored hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
	let mut parts = stored.split(':');
	let (Some(scheme), Some(iterations), Some(salt), Some(expected), None) =
		(parts.next(), parts.next(), parts.next(), parts.next(), parts.next())
	else {
		return false;
	};

	if scheme != HASH_SCHEME {
		return false;
	}

	let Ok(iterations) = iterations.parse::<u32>() else { return false };
	let Ok(salt) = hex::decode(salt) else { return false };

	if iterations == 0 {
		return false;
	}

	let actual = hex::encode(derive(password, &salt, iterations));

	constant_time_eq(actual.as_bytes(), expected.as_bytes())
}

pub fn issue_token(
	secret: &str,
	ttl_days: i64,
	email: &str,
	session: Session,
	now: OffsetDateTime,
) -> Result<String> {
	let exp = Duration::DAY
		.checked_mul(i32::try_from(ttl_days.max(1)).unwrap_or(i32::MAX))
		.and_then(|ttl| now.checked_add(ttl))
		.ok_or_else(|| Error::Storage {
			message: "Token expiry is out of range for security.token_ttl_days.".to_string(),
		})?;
	let claims = Claims {
		sub: email.to_string(),
		user_id: session.user_id,
		is_admin: session.is_admin,
		iat: now.unix_timestamp(),
		exp: exp.unix_timestamp(),
	};

	jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
		.map_err(|err| Error::Storage { message: format!("Failed to sign token: {err}") })
}

pub fn verify_token(secret: &str, token: &str) -> Result<Session> {
	let token = token.trim();

	if token.is_empty() {
		return Err(Error::Unauthorized { message: "Missing token.".to_string() });
	}

	let data = jsonwebtoken::decode::<Claims>(
		token,
		&DecodingKey::from_secret(secret.as_bytes()),
		&Validation::default(),
	)
	.map_err(|_| Error::Unauthorized { message: "Invalid or expired token.".to_string() })?;

	Ok(Session { user_id: data.claims.user_id, is_admin: data.claims.is_admin })
}

fn normalize_email(raw: &str) -> String {
	raw.trim().to_lowercase()
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; HASH_LEN] {
	let mut out = [0_u8; HASH_LEN];

	pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);

	out
}

fn constant_time_eq(lhs: &[u8], rhs: &[u8]) -> bool {
	if lhs.len() != rhs.len() {
		return false;
	}

	lhs.iter().zip(rhs.iter()).fold(0_u8, |diff, (l, r)| diff | (l ^ r)) == 0
}
