pub use balance_history::{BalanceChangeType, BalanceHistory};
pub use balances::Balance;
pub use commands::{ExpenseEdit, NewExpense, NewSettlement};
pub use currency::Currency;
pub use error::LedgerError;
pub use expenses::{Expense, net_deltas};
pub use group_members::{GroupMember, MemberRole};
pub use groups::Group;
pub use money::Money;
pub use ops::{BalanceSummary, Ledger, LedgerBuilder, Reconciliation, store};
pub use scope::Scope;
pub use settlements::{Settlement, SettlementMethod, SettlementStatus};
pub use split::{Payer, Share, SplitDetail, SplitKind, SplitWeight, calculate_shares};
pub use users::User;

mod balance_history;
mod balances;
mod commands;
mod currency;
mod error;
mod expense_entries;
mod expenses;
mod group_members;
mod groups;
mod money;
mod ops;
mod scope;
mod settlements;
pub mod split;
mod users;
mod util;

type ResultLedger<T> = Result<T, LedgerError>;
