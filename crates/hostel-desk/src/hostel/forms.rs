//! Request payloads and their shape checks. Handlers validate these before
//! any account, room, or allocation logic sees the values.

use serde::Deserialize;
use validator::{Validate, ValidationErrors};

use super::domain::Role;

fn default_signup_role() -> Role {
    Role::Student
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SignupForm {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6))]
    pub password: String,
    #[validate(must_match(other = "password"))]
    pub confirm: String,
    #[serde(default = "default_signup_role")]
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginForm {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RoomForm {
    #[validate(length(min = 1, max = 50))]
    pub room_no: String,
    #[validate(range(min = 1))]
    pub capacity: u32,
    #[validate(length(max = 50))]
    #[serde(default)]
    pub block: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AllocateForm {
    #[validate(email)]
    pub student_email: String,
    #[validate(length(min = 1, max = 50))]
    pub room_no: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ComplaintForm {
    #[validate(length(min = 1, max = 200))]
    pub subject: String,
    #[validate(length(min = 1, max = 2000))]
    pub message: String,
}

/// Field names that failed, sorted, for compact error messages.
pub fn failed_fields(errors: &ValidationErrors) -> Vec<String> {
    let mut fields: Vec<String> = errors
        .field_errors()
        .keys()
        .map(|field| field.to_string())
        .collect();
    fields.sort();
    fields
}
