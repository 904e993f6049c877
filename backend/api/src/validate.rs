//! Request validation with per-field error collection.
//!
//! Handlers run every check before failing, so a response names all the
//! offending fields at once rather than the first one found.

use std::collections::BTreeMap;

use crate::errors::AppError;

/// Categories a project may be filed under.
pub const SUPPORTED_CATEGORIES: &[&str] = &[
    "technology",
    "art",
    "music",
    "games",
    "film & video",
    "publishing & writing",
    "design",
    "food & craft",
    "social good",
    "miscellaneous",
];

/// Longest accepted refund reason, in bytes.
pub const MAX_REASON_BYTES: usize = 500;

/// Furthest a project deadline may sit in the future, in seconds (four
/// months of 30 days).
pub const MAX_DEADLINE_HORIZON_SECS: i64 = 4 * 30 * 24 * 60 * 60;

/// Smallest reward tier threshold, in minor currency units.
pub const MIN_REWARD_AMOUNT: i64 = 10_000;

#[derive(Debug, Default)]
pub struct Validator {
    errors: BTreeMap<String, String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` under `field` when `ok` is false.  The first message
    /// per field wins.
    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add(field, message);
        }
    }

    pub fn add(&mut self, field: &str, message: &str) {
        self.errors
            .entry(field.to_string())
            .or_insert_with(|| message.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Consume the validator, failing with the collected field map when any
    /// check recorded an error.
    pub fn finish(self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.errors))
        }
    }
}

// ─────────────────────────────────────────────────────────
// Shared field rules
// ─────────────────────────────────────────────────────────

pub fn check_title(v: &mut Validator, title: &str) {
    v.check(!title.trim().is_empty(), "title", "must be provided");
    v.check(
        title.len() <= 100,
        "title",
        "must not be more than 100 bytes long",
    );
}

pub fn check_description(v: &mut Validator, description: &str) {
    v.check(!description.trim().is_empty(), "description", "must be provided");
    v.check(
        description.split_whitespace().count() <= 2000,
        "description",
        "must not be more than 2000 words long",
    );
}

pub fn check_deadline(v: &mut Validator, deadline: i64, now: i64) {
    v.check(deadline > now, "deadline", "must be in the future");
    v.check(
        deadline <= now + MAX_DEADLINE_HORIZON_SECS,
        "deadline",
        "must not be more than 4 months from now",
    );
}

pub fn check_categories(v: &mut Validator, categories: &[String]) {
    v.check(!categories.is_empty(), "categories", "must contain at least 1 category");
    v.check(
        categories.len() <= 5,
        "categories",
        "must not contain more than 5 categories",
    );

    let mut seen = std::collections::BTreeSet::new();
    for category in categories {
        if !SUPPORTED_CATEGORIES.contains(&category.as_str()) {
            v.add("categories", "must only contain supported categories");
            break;
        }
        if !seen.insert(category.as_str()) {
            v.add("categories", "must not contain duplicate categories");
            break;
        }
    }
}

pub fn check_reason(v: &mut Validator, reason: &str) {
    v.check(!reason.trim().is_empty(), "reason", "must be provided");
    v.check(
        reason.len() <= MAX_REASON_BYTES,
        "reason",
        "must not be more than 500 bytes long",
    );
}

pub fn check_email(v: &mut Validator, email: &str) {
    v.check(!email.trim().is_empty(), "email", "must be provided");
    v.check(
        email.contains('@') && !email.starts_with('@') && !email.ends_with('@'),
        "email",
        "must be a valid email address",
    );
}

pub fn check_username(v: &mut Validator, username: &str) {
    v.check(!username.trim().is_empty(), "username", "must be provided");
    v.check(
        username.len() <= 500,
        "username",
        "must not be more than 500 bytes long",
    );
}

/// Vote weights are each 0.0..=1.0 in steps of 0.1, and an all-zero vote
/// counts as no decision at all.
pub fn check_vote_weights(v: &mut Validator, weights: &[f64]) {
    v.check(
        weights.iter().any(|&w| w != 0.0),
        "decision",
        "must be provided",
    );
    for &w in weights {
        if !(0.0..=1.0).contains(&w) {
            v.add("vote", "weights must be between 0 and 1");
            break;
        }
        let scaled = w * 10.0;
        if (scaled - scaled.round()).abs() > 1e-9 {
            v.add("vote", "weights must be multiples of 0.1");
            break;
        }
    }
}

pub fn check_note(v: &mut Validator, note: &str) {
    v.check(
        (10..=500).contains(&note.len()),
        "note",
        "must be between 10 and 500 characters long",
    );
}

pub fn check_dispute_description(v: &mut Validator, description: &str) {
    v.check(!description.is_empty(), "description", "must be provided");
    v.check(
        (10..=500).contains(&description.len()),
        "description",
        "must be between 10 and 500 characters long",
    );
}

/// Rules for one reward in a bulk-replace batch; `n` is the 1-based position
/// so the message names the offending reward.
pub fn check_reward(v: &mut Validator, reward: &crate::store::rewards::NewReward, n: usize, now: i64) {
    v.check(
        !reward.title.trim().is_empty(),
        "title",
        &format!("reward {n}: title must be provided"),
    );
    v.check(
        reward.title.len() <= 100,
        "title",
        &format!("reward {n}: title must not be more than 100 bytes long"),
    );
    v.check(
        reward.amount >= MIN_REWARD_AMOUNT,
        "amount",
        &format!("reward {n}: amount must be at least {MIN_REWARD_AMOUNT}"),
    );
    match reward.estimated_delivery {
        None => v.add(
            "estimated_delivery",
            &format!("reward {n}: estimated delivery must be provided"),
        ),
        Some(when) => v.check(
            when > now,
            "estimated_delivery",
            &format!("reward {n}: estimated delivery must be in the future"),
        ),
    }
    v.check(
        !reward.includes.is_empty(),
        "includes",
        &format!("reward {n}: includes must be provided"),
    );
    for (i, include) in reward.includes.iter().enumerate() {
        if include.len() > 300 {
            v.add(
                "includes",
                &format!("reward {n}: include {i} must not be more than 300 bytes long"),
            );
            break;
        }
    }
}

/// Expert profile rules: fields come from the supported category list, the
/// level moves in 0.1 steps.
pub fn check_expert_profile(
    v: &mut Validator,
    expertise_fields: &[String],
    expertise_level: f64,
    qualification: &str,
) {
    v.check(
        !expertise_fields.is_empty() && expertise_fields.len() <= 5,
        "expertise_fields",
        "must contain at least 1 and no more than 5 items",
    );
    let mut seen = std::collections::BTreeSet::new();
    for field in expertise_fields {
        if !SUPPORTED_CATEGORIES.contains(&field.as_str()) {
            v.add("expertise_fields", "must only contain supported categories");
            break;
        }
        if !seen.insert(field.as_str()) {
            v.add("expertise_fields", "must not contain duplicate items");
            break;
        }
    }
    v.check(
        !qualification.trim().is_empty(),
        "qualification",
        "must be provided",
    );
    let scaled = expertise_level * 10.0;
    v.check(
        (0.0..=1.0).contains(&expertise_level) && (scaled - scaled.round()).abs() < 1e-9,
        "expertise_level",
        "must be between 0 and 1 in steps of 0.1",
    );
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
