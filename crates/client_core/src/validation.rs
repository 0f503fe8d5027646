//! Field-level validation for the login, signup and task-title forms.
//!
//! Validation is synchronous and produces a [`FieldErrors`] map. A [`Form`]
//! validates everything on a submit attempt and, once an attempt has failed,
//! revalidates each field as it changes.

use std::{collections::BTreeMap, fmt, sync::OnceLock};

use regex::Regex;

pub const INVALID_EMAIL: &str = "Invalid email address";
pub const PASSWORD_REQUIRED: &str = "Password is required";
pub const PASSWORD_TOO_SHORT: &str = "Password must be at least 8 characters";
pub const PASSWORD_NEEDS_LOWERCASE: &str = "Password must include a lowercase letter";
pub const PASSWORD_NEEDS_UPPERCASE: &str = "Password must include an uppercase letter";
pub const PASSWORD_NEEDS_DIGIT: &str = "Password must include a number";
pub const PASSWORD_NEEDS_SYMBOL: &str = "Password must include a symbol";
pub const PASSWORDS_DO_NOT_MATCH: &str = "Passwords do not match";
pub const TITLE_REQUIRED: &str = "Task title is required";

const SIGNUP_PASSWORD_MIN_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Email,
    Password,
    ConfirmPassword,
    Title,
}

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Field::Email => "email",
            Field::Password => "password",
            Field::ConfirmPassword => "confirm_password",
            Field::Title => "title",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Field name to human-readable message. Empty means valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<Field, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: Field, message: impl Into<String>) {
        self.0.insert(field, message.into());
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn contains(&self, field: Field) -> bool {
        self.0.contains_key(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        self.0.iter().map(|(field, message)| (*field, message.as_str()))
    }

    /// Replaces this map's entry for `field` with whatever `fresh` holds for it.
    fn refresh_field(&mut self, field: Field, fresh: &FieldErrors) {
        match fresh.get(field) {
            Some(message) => self.insert(field, message),
            None => {
                self.0.remove(&field);
            }
        }
    }

    fn clear(&mut self) {
        self.0.clear();
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in self.iter() {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_'+\-.]*[A-Za-z0-9_+\-]@([A-Za-z0-9][A-Za-z0-9\-]*\.)+[A-Za-z]{2,}$")
            .expect("email pattern compiles")
    })
}

pub fn is_valid_email(email: &str) -> bool {
    !email.starts_with('.') && !email.contains("..") && email_pattern().is_match(email)
}

pub fn validate_email(email: &str) -> Option<&'static str> {
    (!is_valid_email(email)).then_some(INVALID_EMAIL)
}

pub fn validate_login_password(password: &str) -> Option<&'static str> {
    password.is_empty().then_some(PASSWORD_REQUIRED)
}

/// Returns the first failing composition rule, in the order the rules are
/// shown to the user.
pub fn validate_signup_password(password: &str) -> Option<&'static str> {
    if password.chars().count() < SIGNUP_PASSWORD_MIN_LEN {
        return Some(PASSWORD_TOO_SHORT);
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Some(PASSWORD_NEEDS_LOWERCASE);
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Some(PASSWORD_NEEDS_UPPERCASE);
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Some(PASSWORD_NEEDS_DIGIT);
    }
    if !password.chars().any(|c| !c.is_ascii_alphanumeric()) {
        return Some(PASSWORD_NEEDS_SYMBOL);
    }
    None
}

pub fn validate_confirm_password(password: &str, confirm: &str) -> Option<&'static str> {
    (password != confirm).then_some(PASSWORDS_DO_NOT_MATCH)
}

pub fn validate_task_title(title: &str) -> Option<&'static str> {
    title.trim().is_empty().then_some(TITLE_REQUIRED)
}

/// A set of input buffers that can validate itself.
pub trait Draft: Clone + Default {
    fn validate(&self) -> FieldErrors;

    /// Writes `value` into `field`. Returns `false` if the draft has no such
    /// field.
    fn set(&mut self, field: Field, value: String) -> bool;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginDraft {
    pub email: String,
    pub password: String,
}

impl Draft for LoginDraft {
    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if let Some(message) = validate_email(&self.email) {
            errors.insert(Field::Email, message);
        }
        if let Some(message) = validate_login_password(&self.password) {
            errors.insert(Field::Password, message);
        }
        errors
    }

    fn set(&mut self, field: Field, value: String) -> bool {
        match field {
            Field::Email => self.email = value,
            Field::Password => self.password = value,
            _ => return false,
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignupDraft {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl Draft for SignupDraft {
    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if let Some(message) = validate_email(&self.email) {
            errors.insert(Field::Email, message);
        }
        if let Some(message) = validate_signup_password(&self.password) {
            errors.insert(Field::Password, message);
        }
        if let Some(message) = validate_confirm_password(&self.password, &self.confirm_password)
        {
            errors.insert(Field::ConfirmPassword, message);
        }
        errors
    }

    fn set(&mut self, field: Field, value: String) -> bool {
        match field {
            Field::Email => self.email = value,
            Field::Password => self.password = value,
            Field::ConfirmPassword => self.confirm_password = value,
            Field::Title => return false,
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TitleDraft {
    pub title: String,
}

impl TitleDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }
}

impl Draft for TitleDraft {
    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if let Some(message) = validate_task_title(&self.title) {
            errors.insert(Field::Title, message);
        }
        errors
    }

    fn set(&mut self, field: Field, value: String) -> bool {
        if field != Field::Title {
            return false;
        }
        self.title = value;
        true
    }
}

/// A draft plus its visible errors.
///
/// Nothing is validated until the first submit attempt. After an attempt,
/// every change revalidates the changed field only.
#[derive(Debug, Clone, Default)]
pub struct Form<D: Draft> {
    draft: D,
    errors: FieldErrors,
    attempted: bool,
}

impl<D: Draft> Form<D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_draft(draft: D) -> Self {
        Self {
            draft,
            errors: FieldErrors::new(),
            attempted: false,
        }
    }

    pub fn draft(&self) -> &D {
        &self.draft
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn was_attempted(&self) -> bool {
        self.attempted
    }

    pub fn set_field(&mut self, field: Field, value: impl Into<String>) -> bool {
        if !self.draft.set(field, value.into()) {
            return false;
        }
        if self.attempted {
            let fresh = self.draft.validate();
            self.errors.refresh_field(field, &fresh);
        }
        true
    }

    /// Validates the whole draft. On success returns a snapshot of it.
    pub fn submit(&mut self) -> Result<D, FieldErrors> {
        self.attempted = true;
        self.errors = self.draft.validate();
        if self.errors.is_empty() {
            Ok(self.draft.clone())
        } else {
            Err(self.errors.clone())
        }
    }

    pub fn reset(&mut self) {
        self.draft = D::default();
        self.errors.clear();
        self.attempted = false;
    }
}

#[cfg(test)]
#[path = "tests/validation_tests.rs"]
mod tests;
