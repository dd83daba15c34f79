//! Command structs for ledger write operations.
//!
//! These types group the parameters of expense and settlement writes, keeping
//! call sites readable and avoiding long argument lists.

use uuid::Uuid;

use crate::{Currency, Money, Payer, SettlementMethod, SplitDetail};

/// Record a new expense.
#[derive(Clone, Debug)]
pub struct NewExpense {
    pub creator_id: String,
    pub title: String,
    pub amount: Money,
    pub currency: Currency,
    pub group_id: Option<Uuid>,
    pub payers: Vec<Payer>,
    pub split: SplitDetail,
}

impl NewExpense {
    /// A personal expense paid in full by its creator.
    #[must_use]
    pub fn new(
        creator_id: impl Into<String>,
        title: impl Into<String>,
        amount: Money,
        currency: Currency,
        split: SplitDetail,
    ) -> Self {
        let creator_id = creator_id.into();
        Self {
            payers: vec![Payer::new(creator_id.clone(), amount)],
            creator_id,
            title: title.into(),
            amount,
            currency,
            group_id: None,
            split,
        }
    }

    #[must_use]
    pub fn group_id(mut self, group_id: Uuid) -> Self {
        self.group_id = Some(group_id);
        self
    }

    /// Replace the default payer (the creator) with an explicit list.
    #[must_use]
    pub fn payers(mut self, payers: Vec<Payer>) -> Self {
        self.payers = payers;
        self
    }
}

/// Edit an existing expense. Fields left `None` keep their stored value.
///
/// Changing the amount or the payers requires a new split, since the raw
/// split input of the stored expense is not retained.
#[derive(Clone, Debug, Default)]
pub struct ExpenseEdit {
    pub title: Option<String>,
    pub amount: Option<Money>,
    pub payers: Option<Vec<Payer>>,
    pub split: Option<SplitDetail>,
}

impl ExpenseEdit {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount);
        self
    }

    #[must_use]
    pub fn payers(mut self, payers: Vec<Payer>) -> Self {
        self.payers = Some(payers);
        self
    }

    #[must_use]
    pub fn split(mut self, split: SplitDetail) -> Self {
        self.split = Some(split);
        self
    }

    pub(crate) fn changes_ledger(&self) -> bool {
        self.amount.is_some() || self.payers.is_some() || self.split.is_some()
    }
}

/// Create a pending settlement.
#[derive(Clone, Debug)]
pub struct NewSettlement {
    pub from_user_id: String,
    pub to_user_id: String,
    pub amount: Money,
    pub currency: Currency,
    pub group_id: Option<Uuid>,
    pub method: SettlementMethod,
    pub description: Option<String>,
}

impl NewSettlement {
    #[must_use]
    pub fn new(
        from_user_id: impl Into<String>,
        to_user_id: impl Into<String>,
        amount: Money,
        currency: Currency,
    ) -> Self {
        Self {
            from_user_id: from_user_id.into(),
            to_user_id: to_user_id.into(),
            amount,
            currency,
            group_id: None,
            method: SettlementMethod::default(),
            description: None,
        }
    }

    #[must_use]
    pub fn group_id(mut self, group_id: Uuid) -> Self {
        self.group_id = Some(group_id);
        self
    }

    #[must_use]
    pub fn method(mut self, method: SettlementMethod) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
