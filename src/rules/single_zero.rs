//! Built-in single-zero (European) layout.
//!
//! Labels: `straight-N`, `split-A-B`, `trio-0-1-2`, `trio-0-2-3`,
//! `street-R`, `corner-N` (N = top-left pocket), `basket`, `six-line-R`,
//! `dozen-K`, `column-C`, `red`, `black`, `odd`, `even`, `low`, `high`.
//! Payouts are net odds. Zero loses every outside bet.

use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};

use super::BetRule;
use crate::types::{BetType, Outcome};

pub const RED_NUMBERS: [u8; 18] = [
    1, 3, 5, 7, 9, 12, 14, 16, 18, 19, 21, 23, 25, 27, 30, 32, 34, 36,
];

pub fn is_red(n: u8) -> bool {
    RED_NUMBERS.contains(&n)
}

pub fn is_black(n: u8) -> bool {
    n != 0 && n <= Outcome::MAX && !is_red(n)
}

/// Every bet type on the single-zero layout.
pub fn rules() -> BTreeMap<BetType, BetRule> {
    let mut rules = BTreeMap::new();
    let mut add = |label: String, pockets: Vec<u8>, payout: u32| {
        rules.insert(
            BetType(label),
            BetRule {
                coverage: pockets.into_iter().map(Outcome).collect::<BTreeSet<_>>(),
                payout: Decimal::from(payout),
            },
        );
    };

    // Inside bets
    for n in 0..=Outcome::MAX {
        add(format!("straight-{n}"), vec![n], 35);
    }
    for n in 1..=Outcome::MAX {
        if n % 3 != 0 {
            add(format!("split-{}-{}", n, n + 1), vec![n, n + 1], 17);
        }
        if n <= 33 {
            add(format!("split-{}-{}", n, n + 3), vec![n, n + 3], 17);
        }
    }
    for n in 1..=3 {
        add(format!("split-0-{n}"), vec![0, n], 17);
    }
    add("trio-0-1-2".to_string(), vec![0, 1, 2], 11);
    add("trio-0-2-3".to_string(), vec![0, 2, 3], 11);
    for row in 1..=12u8 {
        let first = row * 3 - 2;
        add(format!("street-{row}"), (first..=first + 2).collect(), 11);
    }
    for n in 1..=32u8 {
        if n % 3 != 0 {
            add(format!("corner-{n}"), vec![n, n + 1, n + 3, n + 4], 8);
        }
    }
    add("basket".to_string(), vec![0, 1, 2, 3], 8);
    for row in 1..=11u8 {
        let first = row * 3 - 2;
        add(format!("six-line-{row}"), (first..=first + 5).collect(), 5);
    }

    // Outside bets
    for k in 1..=3u8 {
        let first = k * 12 - 11;
        add(format!("dozen-{k}"), (first..=first + 11).collect(), 2);
    }
    for c in 1..=3u8 {
        add(
            format!("column-{c}"),
            (1..=Outcome::MAX).filter(|n| n % 3 == c % 3).collect(),
            2,
        );
    }
    add("red".to_string(), RED_NUMBERS.to_vec(), 1);
    add("black".to_string(), (1..=Outcome::MAX).filter(|&n| is_black(n)).collect(), 1);
    add("odd".to_string(), (1..=Outcome::MAX).filter(|n| n % 2 == 1).collect(), 1);
    add("even".to_string(), (1..=Outcome::MAX).filter(|n| n % 2 == 0).collect(), 1);
    add("low".to_string(), (1..=18).collect(), 1);
    add("high".to_string(), (19..=Outcome::MAX).collect(), 1);

    rules
}
