//! Balance aggregation.
//!
//! Reduces expenses into per-member net balances: the payer is credited the
//! full amount, every beneficiary is debited its share.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{EngineError, Expense, MoneyCents, ResultEngine};

/// Net balance per member. Members at exactly zero are not present.
pub type MemberBalances = BTreeMap<String, MoneyCents>;

/// Whether an expense snapshot enters or leaves the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceDirection {
    Add,
    Remove,
}

impl From<bool> for BalanceDirection {
    /// Maps an `is_addition` flag.
    fn from(is_addition: bool) -> Self {
        if is_addition { Self::Add } else { Self::Remove }
    }
}

/// Computes balances from scratch over a whole ledger.
pub fn aggregate<'a>(
    expenses: impl IntoIterator<Item = &'a Expense>,
) -> ResultEngine<MemberBalances> {
    let mut balances = MemberBalances::new();
    for expense in expenses {
        apply_expense(&mut balances, expense, BalanceDirection::Add)?;
    }
    Ok(balances)
}

/// Applies (or reverts) one expense on top of existing balances.
///
/// An edit is `Remove` of the old snapshot followed by `Add` of the new one.
/// Fails with [`EngineError::InvalidAmount`] if a balance would overflow, in
/// which case `balances` is left as it was.
pub fn apply_expense(
    balances: &mut MemberBalances,
    expense: &Expense,
    direction: BalanceDirection,
) -> ResultEngine<()> {
    let moves = std::iter::once((&expense.payer_id, expense.amount, true)).chain(
        expense
            .beneficiaries
            .iter()
            .map(|b| (&b.member_id, b.share, false)),
    );

    let mut staged: BTreeMap<&String, MoneyCents> = BTreeMap::new();
    for (member, amount, credit) in moves {
        let current = match staged.get(member) {
            Some(balance) => *balance,
            None => balances.get(member).copied().unwrap_or_default(),
        };
        let next = if credit == (direction == BalanceDirection::Add) {
            current.checked_add(amount)
        } else {
            current.checked_sub(amount)
        }
        .ok_or_else(|| {
            EngineError::InvalidAmount(format!(
                "balance of {member} overflows applying expense {}",
                expense.id
            ))
        })?;
        staged.insert(member, next);
    }

    for (member, balance) in staged {
        if balance.is_zero() {
            balances.remove(member);
        } else {
            balances.insert(member.clone(), balance);
        }
    }
    Ok(())
}

/// Members whose balance differs between `old` and `new`, with the new value
/// ([`MoneyCents::ZERO`] when the member dropped out).
pub fn balance_delta(old: &MemberBalances, new: &MemberBalances) -> Vec<(String, MoneyCents)> {
    let mut delta: Vec<(String, MoneyCents)> = new
        .iter()
        .filter(|(member, balance)| old.get(*member) != Some(*balance))
        .map(|(member, balance)| (member.clone(), *balance))
        .collect();
    delta.extend(
        old.keys()
            .filter(|member| !new.contains_key(*member))
            .map(|member| (member.clone(), MoneyCents::ZERO)),
    );
    delta
}
