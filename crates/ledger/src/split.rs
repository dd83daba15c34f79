//! Split calculation.
//!
//! Turns an expense amount, its payers and a [`SplitDetail`] into the final
//! per-user [`Share`]s. The functions here are pure: no store access, no
//! clock.
//!
//! Rounding is done in minor units. Every strategy except `exact` resolves
//! shares whose sum is **exactly** the expense amount:
//!
//! - `equal`: the first participant absorbs `amount - n * (amount / n)`;
//! - `percentage` and `shares`: prior shares are floored and the last entry
//!   (in input order) receives `amount - sum(prior shares)`.
//!
//! The positional tie-break is a convention; changing it changes the amounts
//! real users settle.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{LedgerError, Money, ResultLedger};

/// Guards `floor` against values like `2999.9999999` that are really `3000`.
const FLOOR_EPSILON: f64 = 1e-9;

/// Tolerance when checking that percentages sum to 100.
const PERCENT_TOLERANCE: f64 = 0.01;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitKind {
    Equal,
    Exact,
    Percentage,
    Shares,
}

impl SplitKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equal => "equal",
            Self::Exact => "exact",
            Self::Percentage => "percentage",
            Self::Shares => "shares",
        }
    }
}

impl TryFrom<&str> for SplitKind {
    type Error = LedgerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "equal" => Ok(Self::Equal),
            "exact" => Ok(Self::Exact),
            "percentage" => Ok(Self::Percentage),
            "shares" => Ok(Self::Shares),
            other => Err(LedgerError::Validation(format!(
                "invalid split type: {other}"
            ))),
        }
    }
}

/// A payer contribution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payer {
    pub user_id: String,
    pub amount: Money,
}

impl Payer {
    pub fn new(user_id: impl Into<String>, amount: Money) -> Self {
        Self {
            user_id: user_id.into(),
            amount,
        }
    }
}

/// A participant's resolved monetary responsibility for one expense.
///
/// Also used as the raw input of an `exact` split, where the amount is taken
/// verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub user_id: String,
    pub amount: Money,
}

impl Share {
    pub fn new(user_id: impl Into<String>, amount: Money) -> Self {
        Self {
            user_id: user_id.into(),
            amount,
        }
    }
}

/// Raw input of a `percentage` (0-100] or `shares` (weight > 0) split.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplitWeight {
    pub user_id: String,
    pub value: f64,
}

impl SplitWeight {
    pub fn new(user_id: impl Into<String>, value: f64) -> Self {
        Self {
            user_id: user_id.into(),
            value,
        }
    }
}

/// How an expense is divided. The set of strategies is closed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SplitDetail {
    /// Payers and the listed participants share the amount evenly.
    Equal { participants: Vec<String> },
    Exact { amounts: Vec<Share> },
    Percentage { percentages: Vec<SplitWeight> },
    Shares { weights: Vec<SplitWeight> },
}

impl SplitDetail {
    #[must_use]
    pub fn kind(&self) -> SplitKind {
        match self {
            Self::Equal { .. } => SplitKind::Equal,
            Self::Exact { .. } => SplitKind::Exact,
            Self::Percentage { .. } => SplitKind::Percentage,
            Self::Shares { .. } => SplitKind::Shares,
        }
    }

    /// Every user id mentioned by the split, in input order.
    pub fn user_ids(&self) -> Vec<&str> {
        match self {
            Self::Equal { participants } => participants.iter().map(String::as_str).collect(),
            Self::Exact { amounts } => amounts.iter().map(|s| s.user_id.as_str()).collect(),
            Self::Percentage { percentages: values } | Self::Shares { weights: values } => {
                values.iter().map(|w| w.user_id.as_str()).collect()
            }
        }
    }
}

/// Checks the preconditions shared by every split strategy.
pub fn validate_payers(amount: Money, payers: &[Payer]) -> ResultLedger<()> {
    if !amount.is_positive() {
        return Err(LedgerError::Validation(
            "amount must be positive".to_string(),
        ));
    }
    if payers.is_empty() {
        return Err(LedgerError::Validation(
            "at least one payer must be specified".to_string(),
        ));
    }

    let mut total_paid = Money::ZERO;
    for payer in payers {
        if payer.user_id.trim().is_empty() {
            return Err(LedgerError::Validation(
                "payer user id must not be empty".to_string(),
            ));
        }
        if !payer.amount.is_positive() {
            return Err(LedgerError::Validation(format!(
                "invalid amount for user {}",
                payer.user_id
            )));
        }
        total_paid = total_paid
            .checked_add(payer.amount)
            .ok_or_else(|| LedgerError::Validation("amount too large".to_string()))?;
    }

    if !total_paid.within_tolerance(amount) {
        return Err(LedgerError::Validation(format!(
            "total paid amount {total_paid} does not match expense amount {amount}"
        )));
    }
    Ok(())
}

/// Resolves the per-user shares of an expense.
///
/// Fails with [`LedgerError::Validation`] when the payers or the split
/// detail are malformed.
pub fn calculate_shares(
    amount: Money,
    payers: &[Payer],
    split: &SplitDetail,
) -> ResultLedger<Vec<Share>> {
    validate_payers(amount, payers)?;
    if split.user_ids().iter().any(|id| id.trim().is_empty()) {
        return Err(LedgerError::Validation(
            "split user id must not be empty".to_string(),
        ));
    }

    match split {
        SplitDetail::Equal { participants } => resolve_equal(amount, payers, participants),
        SplitDetail::Exact { amounts } => resolve_exact(amount, amounts),
        SplitDetail::Percentage { percentages } => resolve_percentage(amount, percentages),
        SplitDetail::Shares { weights } => resolve_weighted(amount, weights),
    }
}

fn resolve_equal(
    amount: Money,
    payers: &[Payer],
    participants: &[String],
) -> ResultLedger<Vec<Share>> {
    let mut seen = HashSet::new();
    let ordered: Vec<&str> = payers
        .iter()
        .map(|p| p.user_id.as_str())
        .chain(participants.iter().map(String::as_str))
        .filter(|id| seen.insert(*id))
        .collect();

    if ordered.is_empty() {
        return Err(LedgerError::Validation(
            "no participants found for equal split".to_string(),
        ));
    }

    let n = ordered.len() as i64;
    let each = amount.minor() / n;
    let remainder = amount.minor() - each * n;

    Ok(ordered
        .into_iter()
        .enumerate()
        .map(|(index, user_id)| {
            let minor = if index == 0 { each + remainder } else { each };
            Share::new(user_id, Money::new(minor))
        })
        .collect())
}

fn resolve_exact(amount: Money, amounts: &[Share]) -> ResultLedger<Vec<Share>> {
    if amounts.is_empty() {
        return Err(LedgerError::Validation(
            "exact split requires split details with specific amounts".to_string(),
        ));
    }
    ensure_unique(amounts.iter().map(|s| s.user_id.as_str()))?;

    let mut total = Money::ZERO;
    for share in amounts {
        if !share.amount.is_positive() {
            return Err(LedgerError::Validation(format!(
                "invalid amount {} for user {} in exact split",
                share.amount, share.user_id
            )));
        }
        total = total
            .checked_add(share.amount)
            .ok_or_else(|| LedgerError::Validation("amount too large".to_string()))?;
    }

    if !total.within_tolerance(amount) {
        return Err(LedgerError::Validation(format!(
            "total specified amounts {total} do not match expense amount {amount}"
        )));
    }

    Ok(amounts.to_vec())
}

fn resolve_percentage(amount: Money, percentages: &[SplitWeight]) -> ResultLedger<Vec<Share>> {
    if percentages.is_empty() {
        return Err(LedgerError::Validation(
            "percentage split requires split details with percentages".to_string(),
        ));
    }
    ensure_unique(percentages.iter().map(|w| w.user_id.as_str()))?;

    let mut total = 0.0;
    for entry in percentages {
        if !(entry.value > 0.0 && entry.value <= 100.0) {
            return Err(LedgerError::Validation(format!(
                "invalid percentage {} for user {}",
                entry.value, entry.user_id
            )));
        }
        total += entry.value;
    }

    if (total - 100.0).abs() > PERCENT_TOLERANCE {
        return Err(LedgerError::Validation(format!(
            "total percentage {total:.2} does not equal 100"
        )));
    }

    // Scaled by the accepted total so the last entry cannot go negative.
    Ok(proportional(amount, percentages, total))
}

fn resolve_weighted(amount: Money, weights: &[SplitWeight]) -> ResultLedger<Vec<Share>> {
    if weights.is_empty() {
        return Err(LedgerError::Validation(
            "share-based split requires split details with share counts".to_string(),
        ));
    }
    ensure_unique(weights.iter().map(|w| w.user_id.as_str()))?;

    let mut total = 0.0;
    for entry in weights {
        if !(entry.value > 0.0 && entry.value.is_finite()) {
            return Err(LedgerError::Validation(format!(
                "invalid share count {} for user {}",
                entry.value, entry.user_id
            )));
        }
        total += entry.value;
    }

    if total <= 0.0 || !total.is_finite() {
        return Err(LedgerError::Validation(
            "total shares cannot be zero".to_string(),
        ));
    }

    Ok(proportional(amount, weights, total))
}

/// Floors each `value / denominator` portion of `amount`; the last entry
/// takes whatever is left so the shares add up to `amount`.
fn proportional(amount: Money, entries: &[SplitWeight], denominator: f64) -> Vec<Share> {
    let last = entries.len() - 1;
    let mut allocated = Money::ZERO;

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let share = if index == last {
                amount - allocated
            } else {
                let raw = amount.minor() as f64 * entry.value / denominator;
                Money::new((raw + FLOOR_EPSILON).floor() as i64)
            };
            allocated += share;
            Share::new(entry.user_id.clone(), share)
        })
        .collect()
}

fn ensure_unique<'a>(ids: impl Iterator<Item = &'a str>) -> ResultLedger<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(LedgerError::Validation(format!(
                "user {id} appears more than once in the split"
            )));
        }
    }
    Ok(())
}
