
use serde::{Deserialize, Serialize};

/// Sentinel for "consumption is zero, stock never depletes".
pub const NO_DEPLETION_MONTHS: i64 = 999;

/// Months of stock left at the current consumption rate, rounded up so a
/// partial month still counts as a month that needs attention.
///
/// This is the only implementation of the rule; manual entry, editing and
/// bulk import all go through it.
pub fn months_remaining(stock_on_hand: f64, monthly_consumption: f64) -> i64 {
	if monthly_consumption == 0.0 {
		return NO_DEPLETION_MONTHS;
	}
	(stock_on_hand / monthly_consumption).ceil() as i64
}

/// One inventory item. `(code, identification_code)` is the uniqueness key;
/// `code` alone is not guaranteed unique.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
	pub code: String,
	pub description: String,
	#[serde(default)]
	pub budget_line: String,
	#[serde(default)]
	pub unit: String,
	#[serde(default)]
	pub warehouse: String,
	#[serde(default)]
	pub stock_on_hand: f64,
	#[serde(default)]
	pub monthly_consumption: f64,
	#[serde(default)]
	pub months_remaining: i64,
	#[serde(default)]
	pub classification_code: String,
	#[serde(default)]
	pub identification_code: String,
	#[serde(default)]
	pub procedure_number: String,
	#[serde(default)]
	pub procedure_type: String,
	#[serde(default)]
	pub image_path: String,
	#[serde(default)]
	pub category: String,
	#[serde(default)]
	pub supplier: String,
}

impl Product {
	/// The deduplication key shared by manual entry, editing and import.
	pub fn composite_key(&self) -> String {
		format!("{}|{}", self.code, self.identification_code)
	}

	/// Recomputes the derived months estimate from the current stock and
	/// consumption values. Callers must never accept a client-supplied value
	/// for `months_remaining`.
	pub fn recompute_months_remaining(&mut self) {
		self.months_remaining = months_remaining(self.stock_on_hand, self.monthly_consumption);
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	Admin,
	User,
}

/// A staff account. Passwords are stored as argon2id hashes only; the
/// `temp_password`/`must_change_password` pair drives onboarding.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
	pub id: String,
	pub created_at: String,
	pub updated_at: String,
	pub name: String,
	pub email: String,
	pub role: Role,
	pub active: bool,
	pub password_hash: String,
	pub temp_password: bool,
	pub must_change_password: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_password_change: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub created_by: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_login: Option<String>,
}

/// The whole persisted document (`database.json`).
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Database {
	#[serde(default)]
	pub products: Vec<Product>,
	#[serde(default)]
	pub users: Vec<User>,
}
