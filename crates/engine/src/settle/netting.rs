//! Greedy debt netting.
//!
//! Debtors are walked from the most indebted; each one pays the largest
//! remaining creditor until either side is exhausted. Ties on the balance are
//! broken by member id, so the output is fully deterministic. The result has
//! at most `members - 1` transfers, which is not always the theoretical
//! minimum.

use serde::{Deserialize, Serialize};

use crate::{EngineError, MoneyCents, ResultEngine};

use super::MemberBalances;

/// A directed payment that settles part of the group balances.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Transfer {
    pub debtor_id: String,
    pub creditor_id: String,
    pub amount: MoneyCents,
}

impl Transfer {
    pub fn new(
        debtor_id: impl Into<String>,
        creditor_id: impl Into<String>,
        amount: MoneyCents,
    ) -> Self {
        Self {
            debtor_id: debtor_id.into(),
            creditor_id: creditor_id.into(),
            amount,
        }
    }
}

/// Converts net balances into transfers that bring every balance to zero.
///
/// Fails with [`EngineError::UnbalancedLedger`] when the balances do not sum
/// to zero.
pub fn net_balances(balances: &MemberBalances) -> ResultEngine<Vec<Transfer>> {
    let total = MoneyCents::checked_sum(balances.values().copied()).ok_or_else(|| {
        EngineError::UnbalancedLedger("balances total overflows".to_string())
    })?;
    if !total.is_zero() {
        return Err(EngineError::UnbalancedLedger(format!(
            "balances sum to {total}"
        )));
    }

    // Debt is tracked as a positive amount still to pay.
    let mut debtors: Vec<(&str, MoneyCents)> = balances
        .iter()
        .filter(|(_, balance)| balance.is_negative())
        .map(|(member, balance)| {
            balance
                .checked_neg()
                .map(|owed| (member.as_str(), owed))
                .ok_or_else(|| {
                    EngineError::UnbalancedLedger(format!("debt of {member} overflows"))
                })
        })
        .collect::<ResultEngine<_>>()?;
    let mut creditors: Vec<(&str, MoneyCents)> = balances
        .iter()
        .filter(|(_, balance)| balance.is_positive())
        .map(|(member, balance)| (member.as_str(), *balance))
        .collect();

    debtors.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    creditors.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let mut transfers = Vec::with_capacity(debtors.len() + creditors.len());
    let mut creditor_idx = 0;
    for (debtor, mut owed) in debtors {
        while owed.is_positive() {
            let Some((creditor, credit)) = creditors.get_mut(creditor_idx) else {
                break;
            };
            let amount = owed.min(*credit);
            transfers.push(Transfer::new(debtor, *creditor, amount));
            owed -= amount;
            *credit -= amount;
            if credit.is_zero() {
                creditor_idx += 1;
            }
        }
    }

    Ok(transfers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balances(values: &[(&str, i64)]) -> MemberBalances {
        values
            .iter()
            .map(|(member, cents)| (member.to_string(), MoneyCents::new(*cents)))
            .collect()
    }

    fn transfers(values: &[(&str, &str, i64)]) -> Vec<Transfer> {
        values
            .iter()
            .map(|(debtor, creditor, cents)| Transfer::new(*debtor, *creditor, MoneyCents::new(*cents)))
            .collect()
    }

    fn assert_zeroes(input: &MemberBalances, output: &[Transfer]) {
        let mut remaining = input.clone();
        for transfer in output {
            assert!(transfer.amount.is_positive());
            *remaining.entry(transfer.debtor_id.clone()).or_default() += transfer.amount;
            *remaining.entry(transfer.creditor_id.clone()).or_default() -= transfer.amount;
        }
        assert!(remaining.values().all(|balance| balance.is_zero()));
    }

    #[test]
    fn single_creditor_is_paid_by_everyone() {
        let input = balances(&[("alice", 60_00), ("bob", -30_00), ("carol", -30_00)]);
        let output = net_balances(&input).unwrap();
        assert_eq!(
            output,
            transfers(&[("bob", "alice", 30_00), ("carol", "alice", 30_00)])
        );
        assert_zeroes(&input, &output);
    }

    #[test]
    fn largest_debtor_pays_largest_creditor_first() {
        let input = balances(&[
            ("alice", 50_00),
            ("bob", 20_00),
            ("carol", -60_00),
            ("dave", -10_00),
        ]);
        let output = net_balances(&input).unwrap();
        assert_eq!(
            output,
            transfers(&[
                ("carol", "alice", 50_00),
                ("carol", "bob", 10_00),
                ("dave", "bob", 10_00),
            ])
        );
        assert_zeroes(&input, &output);
    }

    #[test]
    fn ties_are_broken_by_member_id() {
        let input = balances(&[
            ("zoe", 10_00),
            ("adam", 10_00),
            ("mia", -10_00),
            ("bea", -10_00),
        ]);
        let output = net_balances(&input).unwrap();
        assert_eq!(
            output,
            transfers(&[("bea", "adam", 10_00), ("mia", "zoe", 10_00)])
        );
    }

    #[test]
    fn at_most_members_minus_one_transfers() {
        let input = balances(&[
            ("a", 33_34),
            ("b", 12_00),
            ("c", -7_77),
            ("d", -20_00),
            ("e", -17_57),
        ]);
        let output = net_balances(&input).unwrap();
        assert!(output.len() <= input.len() - 1);
        assert_zeroes(&input, &output);
    }

    #[test]
    fn balanced_or_empty_input_yields_nothing() {
        assert!(net_balances(&MemberBalances::new()).unwrap().is_empty());
        assert!(net_balances(&balances(&[("alice", 0)])).unwrap().is_empty());
    }

    #[test]
    fn unbalanced_input_is_rejected() {
        let input = balances(&[("alice", 10_00), ("bob", -9_99)]);
        assert_eq!(
            net_balances(&input),
            Err(EngineError::UnbalancedLedger("balances sum to 0.01".to_string()))
        );
    }

    #[test]
    fn overflowing_totals_are_rejected() {
        let input = balances(&[("alice", i64::MAX), ("bob", i64::MAX), ("carol", -2)]);
        assert_eq!(
            net_balances(&input),
            Err(EngineError::UnbalancedLedger(
                "balances total overflows".to_string()
            ))
        );
    }
}
