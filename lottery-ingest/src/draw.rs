//! Winner computation over a ledger snapshot.

use crate::bet::{AgencyId, Bet};

/// Winning number used when none is configured.
pub const DEFAULT_WINNING_NUMBER: i64 = 7574;

/// Deterministic rule deciding whether a bet won the draw.
pub trait WinningPredicate: Send + Sync + 'static {
    fn is_winner(&self, bet: &Bet) -> bool;
}

impl<F> WinningPredicate for F
where
    F: Fn(&Bet) -> bool + Send + Sync + 'static,
{
    fn is_winner(&self, bet: &Bet) -> bool {
        self(bet)
    }
}

/// A bet wins when it played the published number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WinningNumber(pub i64);

impl Default for WinningNumber {
    fn default() -> Self {
        Self(DEFAULT_WINNING_NUMBER)
    }
}

impl WinningPredicate for WinningNumber {
    fn is_winner(&self, bet: &Bet) -> bool {
        bet.number == self.0
    }
}

/// Winning bets for one ledger snapshot. Never cached; rebuild per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawResult {
    winners: Vec<Bet>,
}

impl DrawResult {
    pub fn from_ledger<P>(snapshot: Vec<Bet>, predicate: &P) -> Self
    where
        P: WinningPredicate + ?Sized,
    {
        let winners = snapshot
            .into_iter()
            .filter(|bet| predicate.is_winner(bet))
            .collect();
        Self { winners }
    }

    pub fn winners(&self) -> &[Bet] {
        &self.winners
    }

    pub fn winners_from_agency(&self, agency: AgencyId) -> impl Iterator<Item = &Bet> + '_ {
        self.winners.iter().filter(move |bet| bet.agency == agency)
    }

    /// Documents of the agency's winners, in ledger order.
    pub fn winner_documents(&self, agency: AgencyId) -> Vec<String> {
        self.winners_from_agency(agency)
            .map(|bet| bet.document.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bet(agency: AgencyId, document: &str, number: i64) -> Bet {
        Bet {
            agency,
            first_name: "Ana".into(),
            last_name: "Diaz".into(),
            document: document.into(),
            birthdate: "2000-01-01".into(),
            number,
        }
    }

    fn ledger() -> Vec<Bet> {
        vec![
            bet(1, "A", 7),
            bet(2, "B", 7),
            bet(1, "C", 8),
            bet(1, "D", 7),
        ]
    }

    #[test]
    fn filters_winners_by_agency() {
        let result = DrawResult::from_ledger(ledger(), &WinningNumber(7));
        assert_eq!(result.winners().len(), 3);
        assert_eq!(result.winner_documents(1), ["A", "D"]);
        assert_eq!(result.winner_documents(2), ["B"]);
        assert!(result.winner_documents(3).is_empty());
    }

    #[test]
    fn recomputation_is_deterministic() {
        let first = DrawResult::from_ledger(ledger(), &WinningNumber(7));
        let second = DrawResult::from_ledger(ledger(), &WinningNumber(7));
        assert_eq!(first, second);
    }

    #[test]
    fn closures_work_as_predicates() {
        let even = |bet: &Bet| bet.number % 2 == 0;
        let result = DrawResult::from_ledger(ledger(), &even);
        assert_eq!(result.winner_documents(1), ["C"]);
    }

    #[test]
    fn default_number_matches_published_value() {
        assert!(WinningNumber::default().is_winner(&bet(1, "A", DEFAULT_WINNING_NUMBER)));
        assert!(!WinningNumber::default().is_winner(&bet(1, "A", 7)));
    }
}
